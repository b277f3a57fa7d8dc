//! Chain configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Chain configuration parameters.
///
/// Every field has a default; a partial JSON document only overrides the
/// fields it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Slot length in milliseconds.
    pub block_time_ms: u64,
    /// Maximum size of the active validator set.
    pub validator_count: usize,
    /// Minimum stake for a validator to be active.
    pub min_stake: u64,
    /// Transactions older than this are evicted from the mempool.
    pub mempool_ttl_ms: u64,
    /// Period of the mempool eviction timer.
    pub eviction_interval_ms: u64,
    /// Maximum transactions drawn into one block.
    pub max_txs_per_block: usize,
    /// Maximum number of pending transactions.
    pub mempool_max_size: usize,
    /// Maximum transaction payload size in bytes.
    pub max_payload_size: usize,
    /// Capacity of the chain event broadcast channel.
    pub event_channel_capacity: usize,
    /// Require a block's producer to be the scheduled producer of its
    /// slot, not merely a member of the active set.
    pub strict_slot_leader: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            block_time_ms: 3_000,
            validator_count: 21,
            min_stake: 100_000,
            mempool_ttl_ms: 3_600_000,
            eviction_interval_ms: 60_000,
            max_txs_per_block: 1_000,
            mempool_max_size: 100_000,
            max_payload_size: 1024 * 1024, // 1MB
            event_channel_capacity: 1_024,
            strict_slot_leader: false,
        }
    }
}

/// Configuration errors. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },
}

impl ChainConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every bound is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("block_time_ms", self.block_time_ms as u128),
            ("validator_count", self.validator_count as u128),
            ("mempool_ttl_ms", self.mempool_ttl_ms as u128),
            ("eviction_interval_ms", self.eviction_interval_ms as u128),
            ("max_txs_per_block", self.max_txs_per_block as u128),
            ("mempool_max_size", self.mempool_max_size as u128),
            ("max_payload_size", self.max_payload_size as u128),
            ("event_channel_capacity", self.event_channel_capacity as u128),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::NotPositive { field });
            }
        }
        Ok(())
    }

    /// Slot length.
    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.block_time_ms)
    }

    /// Eviction timer period.
    pub fn eviction_interval(&self) -> Duration {
        Duration::from_millis(self.eviction_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChainConfig::default();
        assert_eq!(config.block_time_ms, 3_000);
        assert_eq!(config.validator_count, 21);
        assert_eq!(config.min_stake, 100_000);
        assert_eq!(config.mempool_ttl_ms, 3_600_000);
        assert_eq!(config.eviction_interval_ms, 60_000);
        assert_eq!(config.max_txs_per_block, 1_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ChainConfig::from_json(r#"{"block_time_ms": 1000, "validator_count": 2}"#)
            .unwrap();
        assert_eq!(config.block_time(), Duration::from_secs(1));
        assert_eq!(config.validator_count, 2);
        assert_eq!(config.min_stake, 100_000);
    }

    #[test]
    fn test_negative_min_stake_rejected() {
        let err = ChainConfig::from_json(r#"{"min_stake": -5}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_zero_block_time_rejected() {
        let err = ChainConfig::from_json(r#"{"block_time_ms": 0}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::NotPositive {
                field: "block_time_ms"
            }
        ));
    }

    #[test]
    fn test_zero_min_stake_allowed() {
        let config = ChainConfig {
            min_stake: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = ChainConfig {
            strict_slot_leader: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(ChainConfig::from_json(&json).unwrap(), config);
    }
}
