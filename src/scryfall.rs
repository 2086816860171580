//! Scryfall API client for card prices
//!
//! Looks cards up by set code and collector number and reads the USD price
//! for the card's finish. Uses async reqwest; one request per lookup, no
//! retries, no caching.

use crate::error::{Result, SyncError};
use crate::models::Card;
use crate::pipeline::PriceSource;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

/// Default Scryfall API root
pub const SCRYFALL_API_URL: &str = "https://api.scryfall.com";

const USER_AGENT: &str = "D2D-Automations-PriceSync/1.0";

/// Scryfall card response (only the fields the price lookup needs)
#[derive(Debug, Deserialize)]
pub struct ScryfallCard {
    pub name: String,
    pub set: String,
    pub collector_number: String,
    #[serde(default)]
    pub prices: ScryfallPrices,
}

/// Prices as Scryfall reports them: decimal strings, `null` when unknown
#[derive(Debug, Deserialize, Default)]
pub struct ScryfallPrices {
    pub usd: Option<String>,
    pub usd_foil: Option<String>,
    pub eur: Option<String>,
    pub eur_foil: Option<String>,
}

impl ScryfallPrices {
    /// Raw USD price for the requested finish
    pub fn usd_for(&self, foil: bool) -> Option<&str> {
        if foil {
            self.usd_foil.as_deref()
        } else {
            self.usd.as_deref()
        }
    }
}

/// Async Scryfall client
#[derive(Debug, Clone)]
pub struct ScryfallClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for ScryfallClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScryfallClient {
    /// Client against the public Scryfall API
    pub fn new() -> Self {
        Self::with_base_url(SCRYFALL_API_URL)
    }

    /// Client against another API root (mock servers, mirrors)
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn card_url(&self, set_code: &str, collector_number: &str) -> String {
        format!(
            "{}/cards/{}/{}",
            self.base_url,
            urlencoding::encode(&set_code.to_lowercase()),
            urlencoding::encode(collector_number)
        )
    }

    /// Fetch a card by set code and collector number
    pub async fn fetch_card(&self, set_code: &str, collector_number: &str) -> Result<ScryfallCard> {
        let url = self.card_url(set_code, collector_number);
        log::debug!("Fetching card from Scryfall: {}", url);

        let response = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SyncError::CardNotFound {
                set_code: set_code.to_string(),
                collector_number: collector_number.to_string(),
            });
        }
        if !status.is_success() {
            return Err(SyncError::HttpStatus(status));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

impl PriceSource for ScryfallClient {
    async fn fetch_price(&self, card: &Card) -> Result<Decimal> {
        let scryfall_card = self
            .fetch_card(&card.set_code, &card.collector_number)
            .await?;

        let raw = scryfall_card
            .prices
            .usd_for(card.foil)
            .ok_or_else(|| SyncError::PriceUnavailable {
                set_code: card.set_code.clone(),
                collector_number: card.collector_number.clone(),
                foil: card.foil,
            })?;

        Decimal::from_str(raw).map_err(|_| SyncError::InvalidPrice(raw.to_string()))
    }
}

#[cfg(test)]
#[path = "scryfall_tests.rs"]
mod tests;
