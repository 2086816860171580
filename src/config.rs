//! Pipeline configuration
//!
//! Built once by the job entry point and handed to the pipeline at construction.

use crate::error::{Result, SyncError};
use rust_decimal::Decimal;

/// Cards per page read from the store, also the write-batch size
pub const DEFAULT_COMMIT_SIZE: usize = 1000;

/// Fallback USD conversion rate when the exchange service is unavailable
pub const DEFAULT_EXCHANGE_RATE: Decimal = Decimal::from_parts(480, 0, 0, false, 2);

/// Scryfall asks clients to stay at or below 10 requests per second
pub const DEFAULT_MAX_REQUESTS_PER_SECOND: u32 = 10;

/// Highest ceiling that still leaves a non-zero spacing between requests
pub const MAX_REQUESTS_PER_SECOND_LIMIT: u32 = 1_000_000_000;

/// Settings for one reconciliation run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub commit_size: usize,
    pub default_exchange_rate: Decimal,
    pub max_requests_per_second: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            commit_size: DEFAULT_COMMIT_SIZE,
            default_exchange_rate: DEFAULT_EXCHANGE_RATE,
            max_requests_per_second: DEFAULT_MAX_REQUESTS_PER_SECOND,
        }
    }
}

impl PipelineConfig {
    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.commit_size == 0 {
            return Err(SyncError::Config(
                "commit size must be greater than zero".to_string(),
            ));
        }
        if self.max_requests_per_second == 0 {
            return Err(SyncError::Config(
                "max requests per second must be greater than zero".to_string(),
            ));
        }
        if self.max_requests_per_second > MAX_REQUESTS_PER_SECOND_LIMIT {
            return Err(SyncError::Config(format!(
                "max requests per second must be at most {}, got {}",
                MAX_REQUESTS_PER_SECOND_LIMIT, self.max_requests_per_second
            )));
        }
        if self.default_exchange_rate <= Decimal::ZERO {
            return Err(SyncError::Config(format!(
                "default exchange rate must be positive, got {}",
                self.default_exchange_rate
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_exchange_rate.to_string(), "4.80");
        assert_eq!(config.commit_size, 1000);
        assert_eq!(config.max_requests_per_second, 10);
    }

    #[test]
    fn zero_commit_size_is_rejected() {
        let config = PipelineConfig {
            commit_size: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn zero_request_ceiling_is_rejected() {
        let config = PipelineConfig {
            max_requests_per_second: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn request_ceiling_above_nanosecond_spacing_is_rejected() {
        let config = PipelineConfig {
            max_requests_per_second: 2_000_000_000,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));

        let config = PipelineConfig {
            max_requests_per_second: MAX_REQUESTS_PER_SECOND_LIMIT,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn non_positive_default_rate_is_rejected() {
        let config = PipelineConfig {
            default_exchange_rate: Decimal::ZERO,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }
}
