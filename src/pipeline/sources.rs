//! Collaborators the reconciliation pipeline depends on
//!
//! Implemented by the Scryfall and exchange clients and the SQLite store;
//! tests substitute in-memory doubles.

use crate::error::Result;
use crate::models::{Card, PriceSnapshot};
use rust_decimal::Decimal;
use std::future::Future;

/// Market price lookup for a single card, in the source currency
pub trait PriceSource {
    /// Fails with `CardNotFound` / `PriceUnavailable` for the two catalog
    /// misses, any other variant for transport or decoding problems.
    fn fetch_price(&self, card: &Card) -> impl Future<Output = Result<Decimal>> + Send;
}

/// Current conversion rate from the source currency to the target currency
pub trait ExchangeSource {
    fn fetch_rate(&self) -> impl Future<Output = Result<Decimal>> + Send;
}

/// Paginated card reads and batched snapshot writes
pub trait CardStore {
    /// Up to `limit` cards starting at `offset`, in a stable order.
    /// An empty page means there is nothing left to read.
    fn fetch_cards_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Card>>> + Send;

    /// Write every snapshot or none of them
    fn persist_snapshots(
        &self,
        snapshots: &[PriceSnapshot],
    ) -> impl Future<Output = Result<()>> + Send;
}
