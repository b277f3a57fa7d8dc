//! Mempool for pending transactions.
//!
//! The mempool holds transactions waiting to be included in blocks:
//! - Insertion-order queue
//! - Duplicate detection by transaction hash
//! - Expiration (TTL against the transaction timestamp)
//! - Size limits
//!
//! Transactions leave the pool only when a block including them is
//! appended, or when they expire.

use solvia_core::{Transaction, TxHash};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::ChainConfig;
use crate::validation::{validate_transaction, TxRejection};

/// Configuration for the mempool.
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// Maximum number of transactions in the pool.
    pub max_size: usize,
    /// Maximum payload size of a single transaction in bytes.
    pub max_payload_size: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self::from(&ChainConfig::default())
    }
}

impl From<&ChainConfig> for MempoolConfig {
    fn from(config: &ChainConfig) -> Self {
        Self {
            max_size: config.mempool_max_size,
            max_payload_size: config.max_payload_size,
        }
    }
}

/// Mempool for pending transactions.
#[derive(Debug)]
pub struct Mempool {
    /// Configuration.
    config: MempoolConfig,
    /// Transactions keyed by insertion sequence.
    queue: BTreeMap<u64, Transaction>,
    /// Hash to sequence, for O(1) duplicate detection.
    index: HashMap<TxHash, u64>,
    /// Next insertion sequence.
    next_seq: u64,
}

impl Mempool {
    /// Create a new mempool with the given configuration.
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            queue: BTreeMap::new(),
            index: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Create a mempool with default configuration.
    pub fn default_config() -> Self {
        Self::new(MempoolConfig::default())
    }

    /// Get the number of transactions in the pool.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Check if the pool is full.
    pub fn is_full(&self) -> bool {
        self.queue.len() >= self.config.max_size
    }

    /// Check if a transaction is already in the pool.
    pub fn contains(&self, hash: &TxHash) -> bool {
        self.index.contains_key(hash)
    }

    /// Get a pending transaction.
    pub fn get(&self, hash: &TxHash) -> Option<&Transaction> {
        self.index.get(hash).and_then(|seq| self.queue.get(seq))
    }

    /// Add a transaction to the pool.
    ///
    /// Returns `Ok(true)` if added, `Ok(false)` if already present.
    /// Returns `Err` if the transaction is invalid or the pool is full.
    pub fn add(&mut self, tx: Transaction) -> Result<bool, TxRejection> {
        if tx.payload.len() > self.config.max_payload_size {
            return Err(TxRejection::PayloadTooLarge {
                size: tx.payload.len(),
                limit: self.config.max_payload_size,
            });
        }

        validate_transaction(&tx)?;

        if self.contains(&tx.hash) {
            return Ok(false);
        }

        if self.is_full() {
            return Err(TxRejection::MempoolFull {
                capacity: self.config.max_size,
            });
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(tx.hash, seq);
        self.queue.insert(seq, tx);

        Ok(true)
    }

    /// Up to `limit` transactions in insertion order.
    ///
    /// The transactions stay in the pool until `remove_included`.
    pub fn take(&self, limit: usize) -> Vec<Transaction> {
        self.queue.values().take(limit).cloned().collect()
    }

    /// Remove transactions included in an appended block.
    ///
    /// Returns the number of transactions removed.
    pub fn remove_included(&mut self, hashes: &[TxHash]) -> usize {
        let mut removed = 0;
        for hash in hashes {
            if let Some(seq) = self.index.remove(hash) {
                self.queue.remove(&seq);
                removed += 1;
            }
        }
        removed
    }

    /// Remove transactions whose timestamp is more than `ttl_ms` before `now`.
    ///
    /// A transaction exactly `ttl_ms` old is retained. Returns the number
    /// of transactions removed.
    pub fn evict_expired(&mut self, now: u64, ttl_ms: u64) -> usize {
        let expired: HashSet<u64> = self
            .queue
            .iter()
            .filter(|(_, tx)| now.saturating_sub(tx.timestamp) > ttl_ms)
            .map(|(seq, _)| *seq)
            .collect();

        if expired.is_empty() {
            return 0;
        }

        self.index.retain(|_, seq| !expired.contains(seq));
        self.queue.retain(|seq, _| !expired.contains(seq));
        expired.len()
    }

    /// Get mempool statistics.
    pub fn stats(&self) -> MempoolStats {
        MempoolStats {
            size: self.len(),
            capacity: self.config.max_size,
            oldest_timestamp: self.queue.values().map(|tx| tx.timestamp).min(),
        }
    }
}

/// Mempool statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MempoolStats {
    /// Current number of transactions.
    pub size: usize,
    /// Maximum capacity.
    pub capacity: usize,
    /// Smallest transaction timestamp in the pool.
    pub oldest_timestamp: Option<u64>,
}
