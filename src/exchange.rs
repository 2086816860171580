//! Exchange rate client
//!
//! Reads one conversion rate from an exchangerate-api style endpoint:
//!
//! ```json
//! { "result": "success", "base_code": "USD", "conversion_rates": { "BRL": 5.43, ... } }
//! ```
//!
//! The keyless open endpoint names the map `rates`; both are accepted.
//! The endpoint URL (including any API key) comes from configuration.

use crate::error::{Result, SyncError};
use crate::pipeline::ExchangeSource;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

/// Keyless USD rates endpoint
pub const OPEN_EXCHANGE_URL: &str = "https://open.er-api.com/v6/latest/USD";

const USER_AGENT: &str = "D2D-Automations-PriceSync/1.0";

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    #[serde(default, alias = "rates")]
    conversion_rates: HashMap<String, Decimal>,
}

/// Fetches the rate from the source currency into `currency`
#[derive(Debug, Clone)]
pub struct ExchangeClient {
    client: reqwest::Client,
    url: String,
    currency: String,
}

impl ExchangeClient {
    pub fn new(url: &str, currency: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            currency: currency.to_uppercase(),
        }
    }

    /// Target currency code, e.g. "BRL"
    pub fn currency(&self) -> &str {
        &self.currency
    }
}

impl ExchangeSource for ExchangeClient {
    async fn fetch_rate(&self) -> Result<Decimal> {
        log::debug!("Fetching {} exchange rate", self.currency);

        let response = self
            .client
            .get(&self.url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SyncError::HttpStatus(response.status()));
        }

        let body = response.text().await?;
        let exchange: ExchangeResponse = serde_json::from_str(&body)?;

        exchange
            .conversion_rates
            .get(&self.currency)
            .copied()
            .ok_or_else(|| SyncError::MissingRate(self.currency.clone()))
    }
}
