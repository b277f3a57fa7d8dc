//! Chain events published to the transport and metrics collaborators.

use serde::{Deserialize, Serialize};
use solvia_core::{Block, BlockHash, Transaction};

use crate::validators::ValidatorChange;

/// An event emitted after the chain state changed (or refused to).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainEvent {
    /// This node produced and appended a block; rebroadcast it.
    BlockProduced(Block),
    /// A block from a peer was validated and appended.
    BlockAccepted(Block),
    /// A transaction entered the mempool; rebroadcast it.
    TransactionAccepted(Transaction),
    /// The validator set changed.
    ValidatorUpdated(ValidatorChange),
    /// A peer sent a different block for a height we already hold.
    ConflictingBlock {
        number: u64,
        existing: BlockHash,
        received: BlockHash,
    },
}

impl ChainEvent {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ChainEvent::BlockProduced(_) => "block_produced",
            ChainEvent::BlockAccepted(_) => "block_accepted",
            ChainEvent::TransactionAccepted(_) => "transaction_accepted",
            ChainEvent::ValidatorUpdated(_) => "validator_updated",
            ChainEvent::ConflictingBlock { .. } => "conflicting_block",
        }
    }
}
