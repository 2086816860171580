//! Collection data types shared by the store, the clients and the pipeline

use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// A card in the tracked collection, as read for price reconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub id: i64,
    pub name: String,
    /// Scryfall set code, e.g. "lea"
    pub set_code: String,
    pub collector_number: String,
    pub foil: bool,
    /// Price of the most recent snapshot, `None` if the card was never priced
    pub last_price: Option<Decimal>,
}

impl Card {
    /// Last known price, zero when the card has no snapshot yet
    pub fn previous_price(&self) -> Decimal {
        self.last_price.unwrap_or(Decimal::ZERO)
    }
}

/// A card to be added to the collection
#[derive(Debug, Clone, PartialEq)]
pub struct NewCard {
    pub name: String,
    pub set_code: String,
    pub collector_number: String,
    pub foil: bool,
}

/// One priced observation of a card
///
/// Snapshots are append-only; a card's current price is its newest snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSnapshot {
    pub card_id: i64,
    /// Price carried over from the previous snapshot (zero if none)
    pub old_price: Decimal,
    /// Newly fetched price, converted to the target currency
    pub last_price: Decimal,
    /// `last_price - old_price`
    pub price_change: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl PriceSnapshot {
    /// Build the snapshot for a freshly fetched source-currency price
    ///
    /// Fails with `InvalidPrice` when the converted price or the change
    /// does not fit in a `Decimal`.
    pub fn observe(
        card: &Card,
        fetched_price: Decimal,
        exchange_rate: Decimal,
        observed_at: DateTime<Utc>,
    ) -> Result<Self> {
        let old_price = card.previous_price();
        let last_price = fetched_price.checked_mul(exchange_rate).ok_or_else(|| {
            SyncError::InvalidPrice(format!("{} x {} overflows", fetched_price, exchange_rate))
        })?;
        let price_change = last_price.checked_sub(old_price).ok_or_else(|| {
            SyncError::InvalidPrice(format!("{} - {} overflows", last_price, old_price))
        })?;

        Ok(Self {
            card_id: card.id,
            old_price,
            last_price,
            price_change,
            observed_at,
        })
    }
}

/// Summary figures for the whole collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionStats {
    pub total_cards: i64,
    pub foil_cards: i64,
    pub unique_sets: i64,
    /// Sum of every card's current price
    pub total_value: Decimal,
}
