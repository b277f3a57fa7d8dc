//! Append-only block ledger.
//!
//! The `Ledger` holds the chain in memory:
//! - Blocks indexed by number and by hash
//! - Hash-chaining invariants re-checked on every append
//! - Duplicate-height detection for blocks arriving from peers
//! - An index of included transaction hashes, so a transaction lands once
//! - Range queries over included transactions

use serde::{Deserialize, Serialize};
use solvia_core::{Block, BlockHash, Transaction, TxHash};
use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;

use crate::validation::BlockRejection;

/// Result of appending a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyResult {
    /// The block that was appended.
    pub block_hash: BlockHash,
    /// Number of the appended block.
    pub number: u64,
    /// Number of transactions in the block.
    pub transaction_count: usize,
}

/// Ledger invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("block number mismatch: expected {expected}, got {got}")]
    NumberMismatch { expected: u64, got: u64 },

    #[error("invalid parent hash: expected {expected}, got {got}")]
    InvalidParent { expected: BlockHash, got: BlockHash },

    #[error("block {number} hash does not recompute from its fields")]
    HashMismatch { number: u64 },

    #[error("transaction {hash} already included in block {included_in}")]
    DuplicateTransaction { hash: TxHash, included_in: u64 },

    #[error("transaction {hash} appears more than once in the block")]
    RepeatedTransaction { hash: TxHash },

    #[error("block encoding failed: {0}")]
    Encoding(String),
}

/// A transaction together with the block that included it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludedTransaction {
    pub block_number: u64,
    pub block_hash: BlockHash,
    pub transaction: Transaction,
}

/// The chain of appended blocks.
#[derive(Debug, Default)]
pub struct Ledger {
    blocks: Vec<Block>,
    by_hash: HashMap<BlockHash, u64>,
    /// Transaction hash to the number of the block that included it.
    included: HashMap<TxHash, u64>,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks, which is also the next expected block number.
    pub fn height(&self) -> u64 {
        self.blocks.len() as u64
    }

    /// Check if no block has been appended.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The most recently appended block.
    pub fn tip(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Hash the next block must link to (zero for genesis).
    pub fn expected_parent(&self) -> BlockHash {
        self.tip().map_or(BlockHash::ZERO, |b| b.hash)
    }

    /// Get a block by number.
    pub fn get(&self, number: u64) -> Option<&Block> {
        usize::try_from(number).ok().and_then(|i| self.blocks.get(i))
    }

    /// Get a block by hash.
    pub fn get_by_hash(&self, hash: &BlockHash) -> Option<&Block> {
        self.by_hash.get(hash).and_then(|n| self.get(*n))
    }

    /// Number of the block that included a transaction.
    pub fn included_in(&self, hash: &TxHash) -> Option<u64> {
        self.included.get(hash).copied()
    }

    /// Iterate over blocks in chain order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    /// Append a block.
    ///
    /// Re-checks the numbering, the parent link, the hash and that no
    /// transaction is already included or repeated within the block. Producer
    /// eligibility and signatures are the caller's responsibility (see
    /// [`crate::validation::validate_block`]). The ledger is unchanged on
    /// error.
    pub fn append(&mut self, block: Block) -> Result<ApplyResult, ChainError> {
        let expected = self.height();
        if block.number != expected {
            return Err(ChainError::NumberMismatch {
                expected,
                got: block.number,
            });
        }

        let expected_parent = self.expected_parent();
        if block.previous_hash != expected_parent {
            return Err(ChainError::InvalidParent {
                expected: expected_parent,
                got: block.previous_hash,
            });
        }

        let computed = block
            .compute_hash()
            .map_err(|e| ChainError::Encoding(e.to_string()))?;
        if computed != block.hash {
            return Err(ChainError::HashMismatch {
                number: block.number,
            });
        }

        let mut seen = HashSet::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            if let Some(included_in) = self.included_in(&tx.hash) {
                return Err(ChainError::DuplicateTransaction {
                    hash: tx.hash,
                    included_in,
                });
            }
            if !seen.insert(tx.hash) {
                return Err(ChainError::RepeatedTransaction { hash: tx.hash });
            }
        }

        let result = ApplyResult {
            block_hash: block.hash,
            number: block.number,
            transaction_count: block.transactions.len(),
        };
        self.by_hash.insert(block.hash, block.number);
        self.included.extend(block.transactions.iter().map(|tx| (tx.hash, block.number)));
        self.blocks.push(block);
        Ok(result)
    }

    /// Classify a block whose number is already occupied.
    ///
    /// Returns `AlreadyKnown` if the ledger holds this exact block and
    /// `DuplicateHeight` if it holds a different block at that number.
    /// Returns `None` for a number past the tip.
    pub fn conflict_with(&self, block: &Block) -> Option<BlockRejection> {
        let existing = self.get(block.number)?;
        if existing.hash == block.hash {
            Some(BlockRejection::AlreadyKnown {
                number: block.number,
            })
        } else {
            Some(BlockRejection::DuplicateHeight {
                number: block.number,
                existing: existing.hash,
                received: block.hash,
            })
        }
    }

    /// Transactions included in blocks `range`, in chain order.
    ///
    /// Numbers past the tip are ignored.
    pub fn transactions_in_range(&self, range: RangeInclusive<u64>) -> Vec<IncludedTransaction> {
        let (from, to) = range.into_inner();
        if from > to {
            return Vec::new();
        }
        let to = to.min(self.height().saturating_sub(1));

        (from..=to)
            .filter_map(|n| self.get(n))
            .flat_map(|block| {
                block.transactions.iter().map(move |tx| IncludedTransaction {
                    block_number: block.number,
                    block_hash: block.hash,
                    transaction: tx.clone(),
                })
            })
            .collect()
    }

    /// Milliseconds between the last two blocks.
    pub fn last_block_interval_ms(&self) -> Option<u64> {
        match self.blocks.as_slice() {
            [.., prev, tip] => Some(tip.timestamp.saturating_sub(prev.timestamp)),
            _ => None,
        }
    }
}
