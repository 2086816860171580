//! Price Sync - MTG collection price reconciliation
//!
//! Walks the card collection page by page, looks up each card's current USD
//! price on Scryfall, converts it with one exchange rate per run and appends
//! a price snapshot for every card that could be priced.

pub mod config;
pub mod database;
pub mod error;
pub mod exchange;
pub mod import;
pub mod models;
pub mod pipeline;
pub mod scryfall;

pub use config::PipelineConfig;
pub use database::SqliteStore;
pub use error::{Result, SyncError};
pub use exchange::ExchangeClient;
pub use import::{import_cards, ImportSummary};
pub use models::{Card, CollectionStats, NewCard, PriceSnapshot};
pub use pipeline::{
    CardStore, ExchangeSource, Pipeline, PriceSource, RateLimiter, RunSummary, StopReason,
};
pub use scryfall::ScryfallClient;
