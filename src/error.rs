//! Error types for price_sync

use thiserror::Error;

/// Unified error type for price_sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP request failed (network error, timeout, etc.)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Failed to parse JSON response
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// HTTP error status code
    #[error("HTTP error: {0}")]
    HttpStatus(reqwest::StatusCode),
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Scryfall has no card for this set / collector number
    #[error("Card not found on Scryfall: {set_code}/{collector_number}")]
    CardNotFound {
        set_code: String,
        collector_number: String,
    },
    /// Scryfall knows the card but has no price for the requested finish
    #[error("No {} price on Scryfall for {set_code}/{collector_number}", finish_label(.foil))]
    PriceUnavailable {
        set_code: String,
        collector_number: String,
        foil: bool,
    },
    /// Price string could not be read as a decimal
    #[error("Invalid price value: {0}")]
    InvalidPrice(String),
    /// Exchange response did not contain the requested currency
    #[error("Exchange rate for {0} missing from response")]
    MissingRate(String),
    /// The run deadline passed before the operation finished
    #[error("Deadline exceeded")]
    DeadlineExceeded,
    /// Blocking database task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    /// Database connection mutex was poisoned by a panicking holder
    #[error("Database connection lock poisoned")]
    LockPoisoned,
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn finish_label(foil: &bool) -> &'static str {
    if *foil {
        "foil"
    } else {
        "non-foil"
    }
}

impl SyncError {
    /// True when the run deadline cut this operation short
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, SyncError::DeadlineExceeded)
    }
}

/// Result alias for price_sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
