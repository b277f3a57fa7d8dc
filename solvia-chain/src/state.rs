//! Shared chain state.
//!
//! The `ChainState` is the single owner of a node's mutable state:
//! - Ledger and mempool behind one mutex (the production critical section)
//! - Validator set behind a read-write lock (atomic record replacement)
//! - A watch channel carrying the latest `ChainSnapshot` for lock-free readers
//! - A broadcast channel carrying `ChainEvent`s to collaborators
//!
//! Lock order is always core, then validators. Events describing a core
//! mutation are published before the core lock is released, so subscribers
//! see them in the order the mutations happened.

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use solvia_core::{Address, Block, BlockHash, PublicKey, Transaction, TxHash};
use std::ops::RangeInclusive;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::config::{ChainConfig, ConfigError};
use crate::events::ChainEvent;
use crate::ledger::{ApplyResult, IncludedTransaction, Ledger};
use crate::mempool::{Mempool, MempoolConfig};
use crate::validation::{validate_block, BlockRejection, TxRejection};
use crate::validators::{ValidatorChange, ValidatorError, ValidatorSet};

/// A lightweight snapshot of chain state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    /// Number of blocks in the ledger.
    pub height: u64,
    pub tip_hash: Option<BlockHash>,
    pub tip_timestamp: Option<u64>,
    /// Milliseconds between the last two blocks.
    pub last_block_interval_ms: Option<u64>,
    pub mempool_size: usize,
}

/// State mutated under the core lock.
#[derive(Debug)]
pub struct ChainCore {
    pub ledger: Ledger,
    pub mempool: Mempool,
}

impl ChainCore {
    fn snapshot(&self) -> ChainSnapshot {
        let tip = self.ledger.tip();
        ChainSnapshot {
            height: self.ledger.height(),
            tip_hash: tip.map(|b| b.hash),
            tip_timestamp: tip.map(|b| b.timestamp),
            last_block_interval_ms: self.ledger.last_block_interval_ms(),
            mempool_size: self.mempool.len(),
        }
    }
}

/// Current state of the chain.
#[derive(Debug)]
pub struct ChainState {
    config: ChainConfig,
    core: Mutex<ChainCore>,
    validators: RwLock<ValidatorSet>,
    snapshot: watch::Sender<ChainSnapshot>,
    events: broadcast::Sender<ChainEvent>,
}

impl ChainState {
    /// Create an empty chain state.
    ///
    /// Fails only if the configuration is invalid.
    pub fn new(config: ChainConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let core = ChainCore {
            ledger: Ledger::new(),
            mempool: Mempool::new(MempoolConfig::from(&config)),
        };
        let (snapshot, _) = watch::channel(core.snapshot());
        let (events, _) = broadcast::channel(config.event_channel_capacity);

        Ok(Self {
            validators: RwLock::new(ValidatorSet::new(config.min_stake)),
            core: Mutex::new(core),
            config,
            snapshot,
            events,
        })
    }

    /// Get the chain configuration.
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Take the core lock.
    pub(crate) fn lock_core(&self) -> MutexGuard<'_, ChainCore> {
        self.core.lock()
    }

    /// Read access to the validator set.
    pub fn validators(&self) -> RwLockReadGuard<'_, ValidatorSet> {
        self.validators.read()
    }

    /// The latest snapshot, without taking the core lock.
    pub fn snapshot(&self) -> ChainSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every snapshot change.
    pub fn watch_snapshot(&self) -> watch::Receiver<ChainSnapshot> {
        self.snapshot.subscribe()
    }

    /// Subscribe to chain events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub(crate) fn publish(&self, event: ChainEvent) {
        let kind = event.kind();
        if self.events.send(event).is_err() {
            debug!(kind, "No event subscribers");
        }
    }

    pub(crate) fn refresh_snapshot(&self, core: &ChainCore) {
        self.snapshot.send_replace(core.snapshot());
    }

    /// Validate a block against the current tip and append it, removing
    /// its transactions from the mempool. Caller holds the core lock.
    pub(crate) fn commit(
        &self,
        core: &mut ChainCore,
        block: &Block,
    ) -> Result<ApplyResult, BlockRejection> {
        {
            let validators = self.validators.read();
            validate_block(block, &core.ledger, &validators, &self.config)?;
        }

        let result = core.ledger.append(block.clone())?;
        let removed = core.mempool.remove_included(&block.transaction_hashes());
        debug!(number = result.number, removed, "Removed included transactions");
        self.refresh_snapshot(core);
        Ok(result)
    }

    /// Add a transaction to the mempool.
    ///
    /// Returns `Ok(false)` for a transaction already pending. A transaction
    /// already included in a block is rejected.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<bool, TxRejection> {
        let mut core = self.core.lock();
        if let Some(block_number) = core.ledger.included_in(&tx.hash) {
            debug!(hash = %tx.hash, block_number, "Transaction already included");
            return Err(TxRejection::AlreadyIncluded { block_number });
        }

        let added = core.mempool.add(tx.clone())?;
        if added {
            self.refresh_snapshot(&core);
            self.publish(ChainEvent::TransactionAccepted(tx));
        }
        Ok(added)
    }

    /// Accept a block produced by a peer.
    ///
    /// A block at an occupied height is refused without touching the
    /// ledger; a different block at that height is also published as
    /// `ChainEvent::ConflictingBlock`.
    pub fn receive_block(&self, block: Block) -> Result<ApplyResult, BlockRejection> {
        let mut core = self.core.lock();
        let outcome = match core.ledger.conflict_with(&block) {
            Some(conflict) => Err(conflict),
            None => self.commit(&mut core, &block),
        };

        match &outcome {
            Ok(result) => {
                info!(
                    number = result.number,
                    transactions = result.transaction_count,
                    producer = %block.producer,
                    "Accepted block"
                );
                self.publish(ChainEvent::BlockAccepted(block));
            }
            Err(BlockRejection::DuplicateHeight {
                number,
                existing,
                received,
            }) => {
                warn!(
                    number,
                    %existing,
                    %received,
                    producer = %block.producer,
                    "Conflicting block at existing height"
                );
                self.publish(ChainEvent::ConflictingBlock {
                    number: *number,
                    existing: *existing,
                    received: *received,
                });
            }
            Err(BlockRejection::AlreadyKnown { number }) => {
                debug!(number, "Block already in ledger");
            }
            Err(reason) => {
                warn!(
                    number = block.number,
                    producer = %block.producer,
                    code = reason.code(),
                    %reason,
                    "Rejected block"
                );
            }
        }
        drop(core);
        outcome
    }

    /// Evict mempool transactions older than the configured TTL.
    pub fn evict_expired(&self, now_ms: u64) -> usize {
        let mut core = self.core.lock();
        let evicted = core.mempool.evict_expired(now_ms, self.config.mempool_ttl_ms);
        if evicted > 0 {
            self.refresh_snapshot(&core);
            debug!(evicted, remaining = core.mempool.len(), "Evicted expired transactions");
        }
        evicted
    }

    /// Insert or replace a validator record.
    pub fn upsert_validator(
        &self,
        address: Address,
        stake: u64,
        public_key: PublicKey,
    ) -> Result<ValidatorChange, ValidatorError> {
        let change = self.validators.write().upsert(address, stake, public_key)?;
        info!(address = %change.address, stake = change.stake, "Validator updated");
        self.publish(ChainEvent::ValidatorUpdated(change.clone()));
        Ok(change)
    }

    /// Remove a validator. Returns `None` if it was not registered.
    pub fn remove_validator(&self, address: &Address) -> Option<ValidatorChange> {
        let change = self.validators.write().remove(address)?;
        info!(address = %change.address, "Validator removed");
        self.publish(ChainEvent::ValidatorUpdated(change.clone()));
        Some(change)
    }

    /// Transactions included in blocks `range`, in chain order.
    pub fn transactions_in_range(&self, range: RangeInclusive<u64>) -> Vec<IncludedTransaction> {
        self.core.lock().ledger.transactions_in_range(range)
    }

    /// Get a block by number.
    pub fn block(&self, number: u64) -> Option<Block> {
        self.core.lock().ledger.get(number).cloned()
    }

    /// Get a block by hash.
    pub fn block_by_hash(&self, hash: &BlockHash) -> Option<Block> {
        self.core.lock().ledger.get_by_hash(hash).cloned()
    }

    /// Check if a transaction is pending.
    pub fn is_pending(&self, hash: &TxHash) -> bool {
        self.core.lock().mempool.contains(hash)
    }
}
