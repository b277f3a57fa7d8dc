//! Chain operations for the Solvia proof-of-stake ledger.
//!
//! This crate provides the ledger core without networking:
//! - Validator registry (stake-weighted, round-robin slot producers)
//! - Mempool (pending transactions: insertion order, dedup, expiration)
//! - Ledger (append-only, hash-chained blocks)
//! - Validation (typed rejection reasons for transactions and blocks)
//! - Block producer (slot timer driven production)
//! - Node wiring (shared state, events, start/stop)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Node                             │
//! │  (submit/receive, status, events, start/stop timers)    │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                    BlockProducer                        │
//! │  (Per-slot eligibility, build, seal, validate, append)  │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                     ChainState                          │
//! │  Mutex<Ledger + Mempool>, RwLock<ValidatorSet>,         │
//! │  watch<ChainSnapshot>, broadcast<ChainEvent>            │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                     Validation                          │
//! │  (Eligibility, linkage, hash, signature, transactions)  │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod config;
mod events;
mod ledger;
mod mempool;
mod node;
mod producer;
mod state;
mod validation;
mod validators;

#[cfg(test)]
mod proptest;

pub use config::{ChainConfig, ConfigError};
pub use events::ChainEvent;
pub use ledger::{ApplyResult, ChainError, IncludedTransaction, Ledger};
pub use mempool::{Mempool, MempoolConfig, MempoolStats};
pub use node::{Node, NodeHandle, NodeStatus};
pub use producer::{BlockProducer, ProducerState, SlotOutcome};
pub use state::{ChainSnapshot, ChainState};
pub use validation::{validate_block, validate_transaction, BlockRejection, TxRejection};
pub use validators::{
    slot_for, ValidatorChange, ValidatorChangeKind, ValidatorError, ValidatorRecord, ValidatorSet,
};
