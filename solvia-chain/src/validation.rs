//! Transaction and block validation.
//!
//! Pure checks over a block, the ledger tip it extends and the validator
//! set. Every failure is an expected outcome for untrusted input and is
//! returned as a typed reason with a stable `code()`.

use solvia_core::{Address, Block, BlockHash, Signer, Transaction, TxHash};
use std::collections::HashMap;

use crate::config::ChainConfig;
use crate::ledger::{ChainError, Ledger};
use crate::validators::{slot_for, ValidatorSet};

/// Why a transaction was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxRejection {
    #[error("transaction hash does not match contents")]
    HashMismatch,

    #[error("sender public key is malformed")]
    MalformedKey,

    #[error("transaction signature verification failed")]
    BadSignature,

    #[error("payload too large: {size} bytes exceeds limit {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("transaction already included in block {block_number}")]
    AlreadyIncluded { block_number: u64 },

    #[error("mempool full ({capacity} transactions)")]
    MempoolFull { capacity: usize },

    #[error("transaction encoding failed: {0}")]
    Encoding(String),
}

impl TxRejection {
    /// Stable reason code for observability.
    pub fn code(&self) -> &'static str {
        match self {
            TxRejection::HashMismatch => "tx_hash_mismatch",
            TxRejection::MalformedKey => "tx_malformed_key",
            TxRejection::BadSignature => "tx_bad_signature",
            TxRejection::PayloadTooLarge { .. } => "tx_payload_too_large",
            TxRejection::AlreadyIncluded { .. } => "tx_already_included",
            TxRejection::MempoolFull { .. } => "mempool_full",
            TxRejection::Encoding(_) => "tx_encoding",
        }
    }
}

/// Why a block was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockRejection {
    #[error("producer {producer} is not an active validator for slot {slot}")]
    IneligibleProducer { producer: Address, slot: u64 },

    #[error("producer {producer} is not the scheduled producer {expected} of slot {slot}")]
    NotSlotLeader {
        producer: Address,
        expected: Address,
        slot: u64,
    },

    #[error("block number mismatch: expected {expected}, got {got}")]
    NumberMismatch { expected: u64, got: u64 },

    #[error("invalid previous hash: expected {expected}, got {got}")]
    InvalidParent { expected: BlockHash, got: BlockHash },

    #[error("block hash does not match contents")]
    HashMismatch,

    #[error("block signature verification failed")]
    BadSignature,

    #[error("too many transactions: {count} exceeds limit {limit}")]
    TooManyTransactions { count: usize, limit: usize },

    #[error("transaction {index} invalid: {reason}")]
    InvalidTransaction { index: usize, reason: TxRejection },

    #[error("transaction {index} repeats transaction {first} of the same block")]
    DuplicateTransaction { index: usize, first: usize },

    #[error("block {number} already in ledger")]
    AlreadyKnown { number: u64 },

    #[error("conflicting block at height {number}: have {existing}, got {received}")]
    DuplicateHeight {
        number: u64,
        existing: BlockHash,
        received: BlockHash,
    },

    #[error("block encoding failed: {0}")]
    Encoding(String),

    #[error(transparent)]
    Ledger(#[from] ChainError),
}

impl BlockRejection {
    /// Stable reason code for observability.
    pub fn code(&self) -> &'static str {
        match self {
            BlockRejection::IneligibleProducer { .. } => "ineligible_producer",
            BlockRejection::NotSlotLeader { .. } => "not_slot_leader",
            BlockRejection::NumberMismatch { .. } => "number_mismatch",
            BlockRejection::InvalidParent { .. } => "invalid_parent",
            BlockRejection::HashMismatch => "hash_mismatch",
            BlockRejection::BadSignature => "bad_signature",
            BlockRejection::TooManyTransactions { .. } => "too_many_transactions",
            BlockRejection::InvalidTransaction { .. } => "invalid_transaction",
            BlockRejection::DuplicateTransaction { .. } => "duplicate_transaction",
            BlockRejection::AlreadyKnown { .. } => "already_known",
            BlockRejection::DuplicateHeight { .. } => "duplicate_height",
            BlockRejection::Encoding(_) => "encoding",
            BlockRejection::Ledger(_) => "ledger_invariant",
        }
    }
}

/// Check a transaction's digest and signature.
pub fn validate_transaction(tx: &Transaction) -> Result<(), TxRejection> {
    let digest = tx
        .compute_hash()
        .map_err(|e| TxRejection::Encoding(e.to_string()))?;
    if digest != tx.hash {
        return Err(TxRejection::HashMismatch);
    }
    if !tx.sender_public_key.is_well_formed() {
        return Err(TxRejection::MalformedKey);
    }
    if !Signer::verify(tx.hash.as_hash(), &tx.signature, &tx.sender_public_key) {
        return Err(TxRejection::BadSignature);
    }
    Ok(())
}

/// Check a block against the ledger it would extend.
///
/// Checks run in order and stop at the first failure:
/// 1. producer is in the active set for the block's slot
/// 2. number and previous hash extend the ledger tip
/// 3. hash recomputes from the block fields
/// 4. signature verifies under the producer's registered key
/// 5. every transaction validates, is not yet included in the ledger and
///    appears once in the block
///
/// The transaction count bound is checked just before step 5.
pub fn validate_block(
    block: &Block,
    ledger: &Ledger,
    validators: &ValidatorSet,
    config: &ChainConfig,
) -> Result<(), BlockRejection> {
    // 1. Eligibility
    let slot = slot_for(block.timestamp, config.block_time_ms);
    if !validators.is_eligible(&block.producer, config.validator_count) {
        return Err(BlockRejection::IneligibleProducer {
            producer: block.producer,
            slot,
        });
    }
    if config.strict_slot_leader {
        if let Some(expected) = validators.producer_for_slot(slot, config.validator_count) {
            if expected != block.producer {
                return Err(BlockRejection::NotSlotLeader {
                    producer: block.producer,
                    expected,
                    slot,
                });
            }
        }
    }

    // 2. Chain linkage
    let (expected_number, expected_parent) = match ledger.tip() {
        Some(t) => (t.number + 1, t.hash),
        None => (0, BlockHash::ZERO),
    };
    if block.number != expected_number {
        return Err(BlockRejection::NumberMismatch {
            expected: expected_number,
            got: block.number,
        });
    }
    if block.previous_hash != expected_parent {
        return Err(BlockRejection::InvalidParent {
            expected: expected_parent,
            got: block.previous_hash,
        });
    }

    // 3. Hash
    let computed = block
        .compute_hash()
        .map_err(|e| BlockRejection::Encoding(e.to_string()))?;
    if computed != block.hash {
        return Err(BlockRejection::HashMismatch);
    }

    // 4. Signature
    let key = validators
        .public_key_of(&block.producer)
        .ok_or(BlockRejection::IneligibleProducer {
            producer: block.producer,
            slot,
        })?;
    if !Signer::verify(block.hash.as_hash(), &block.signature, key) {
        return Err(BlockRejection::BadSignature);
    }

    // 5. Transactions
    if block.transactions.len() > config.max_txs_per_block {
        return Err(BlockRejection::TooManyTransactions {
            count: block.transactions.len(),
            limit: config.max_txs_per_block,
        });
    }
    let mut positions: HashMap<TxHash, usize> = HashMap::with_capacity(block.transactions.len());
    for (index, tx) in block.transactions.iter().enumerate() {
        validate_transaction(tx)
            .map_err(|reason| BlockRejection::InvalidTransaction { index, reason })?;
        if let Some(block_number) = ledger.included_in(&tx.hash) {
            return Err(BlockRejection::InvalidTransaction {
                index,
                reason: TxRejection::AlreadyIncluded { block_number },
            });
        }
        if let Some(&first) = positions.get(&tx.hash) {
            return Err(BlockRejection::DuplicateTransaction { index, first });
        }
        positions.insert(tx.hash, index);
    }

    Ok(())
}
