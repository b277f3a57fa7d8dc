//! Node wiring.
//!
//! A `Node` owns the shared chain state and the signing identity, and
//! exposes the calls made by the transport, bridge and metrics
//! collaborators. `Node::start` spawns the two timer tasks (block
//! production and mempool eviction) under one cancellation token.

use serde::{Deserialize, Serialize};
use solvia_core::{now_millis, Address, Block, PublicKey, Signer, Transaction};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{ChainConfig, ConfigError};
use crate::events::ChainEvent;
use crate::ledger::{ApplyResult, IncludedTransaction};
use crate::producer::{BlockProducer, ProducerState};
use crate::state::{ChainSnapshot, ChainState};
use crate::validation::{BlockRejection, TxRejection};
use crate::validators::{ValidatorChange, ValidatorError};

/// Node status for the metrics collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub address: Address,
    pub height: u64,
    pub mempool_size: usize,
    /// Registered validators, active or not.
    pub validator_count: usize,
    /// Whether this node is staked at or above the threshold.
    pub is_validator: bool,
    /// Milliseconds between the last two blocks.
    pub last_block_interval_ms: Option<u64>,
    /// Supplied by the transport layer.
    pub peer_count: usize,
}

/// A proof-of-stake ledger node.
#[derive(Debug)]
pub struct Node {
    chain: Arc<ChainState>,
    signer: Arc<Signer>,
    peer_count: AtomicUsize,
}

impl Node {
    /// Create a node with an empty ledger and validator set.
    pub fn new(config: ChainConfig, signer: Signer) -> Result<Self, ConfigError> {
        Ok(Self {
            chain: Arc::new(ChainState::new(config)?),
            signer: Arc::new(signer),
            peer_count: AtomicUsize::new(0),
        })
    }

    /// Our address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// The shared chain state.
    pub fn chain(&self) -> &Arc<ChainState> {
        &self.chain
    }

    /// Submit a transaction from the transport layer.
    pub fn submit(&self, tx: Transaction) -> Result<bool, TxRejection> {
        let hash = tx.hash;
        let result = self.chain.submit_transaction(tx);
        if let Err(reason) = &result {
            debug!(tx = %hash, code = reason.code(), %reason, "Rejected transaction");
        }
        result
    }

    /// Accept a block produced by a peer.
    pub fn receive(&self, block: Block) -> Result<ApplyResult, BlockRejection> {
        self.chain.receive_block(block)
    }

    /// Insert or replace a validator record.
    pub fn upsert_validator(
        &self,
        address: Address,
        stake: u64,
        public_key: PublicKey,
    ) -> Result<ValidatorChange, ValidatorError> {
        self.chain.upsert_validator(address, stake, public_key)
    }

    /// Remove a validator.
    pub fn remove_validator(&self, address: &Address) -> Option<ValidatorChange> {
        self.chain.remove_validator(address)
    }

    /// Transactions included in blocks `range`, for the bridge.
    pub fn transactions_in_range(&self, range: RangeInclusive<u64>) -> Vec<IncludedTransaction> {
        self.chain.transactions_in_range(range)
    }

    /// Whether this node is an active validator.
    pub fn is_validator(&self) -> bool {
        self.chain.validators().is_active(&self.address())
    }

    /// Record the peer count reported by the transport layer.
    pub fn set_peer_count(&self, count: usize) {
        self.peer_count.store(count, Ordering::Relaxed);
    }

    /// Status for the metrics collaborator.
    pub fn status(&self) -> NodeStatus {
        let snapshot = self.chain.snapshot();
        let (validator_count, is_validator) = {
            let validators = self.chain.validators();
            (validators.len(), validators.is_active(&self.address()))
        };

        NodeStatus {
            address: self.address(),
            height: snapshot.height,
            mempool_size: snapshot.mempool_size,
            validator_count,
            is_validator,
            last_block_interval_ms: snapshot.last_block_interval_ms,
            peer_count: self.peer_count.load(Ordering::Relaxed),
        }
    }

    /// Subscribe to chain events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.chain.subscribe()
    }

    /// The latest chain snapshot.
    pub fn snapshot(&self) -> ChainSnapshot {
        self.chain.snapshot()
    }

    /// Receiver notified on every snapshot change.
    pub fn watch_snapshot(&self) -> watch::Receiver<ChainSnapshot> {
        self.chain.watch_snapshot()
    }

    /// Spawn the producer and eviction tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> NodeHandle {
        let cancel = CancellationToken::new();
        let producer = Arc::new(BlockProducer::new(self.chain.clone(), self.signer.clone()));

        let producer_task = tokio::spawn({
            let producer = producer.clone();
            let cancel = cancel.clone();
            async move { producer.run(cancel).await }
        });
        let eviction_task = tokio::spawn(run_eviction(self.chain.clone(), cancel.clone()));

        info!(address = %self.address(), "Node started");
        NodeHandle {
            cancel,
            producer,
            producer_task,
            eviction_task,
        }
    }
}

/// Evict expired mempool transactions every `eviction_interval_ms`.
async fn run_eviction(chain: Arc<ChainState>, cancel: CancellationToken) {
    let period = chain.config().eviction_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                chain.evict_expired(now_millis());
            }
        }
    }
    debug!("Mempool eviction stopped");
}

/// Handle to a started node's background tasks.
#[derive(Debug)]
pub struct NodeHandle {
    cancel: CancellationToken,
    producer: Arc<BlockProducer>,
    producer_task: JoinHandle<()>,
    eviction_task: JoinHandle<()>,
}

impl NodeHandle {
    /// Current producer state.
    pub fn producer_state(&self) -> ProducerState {
        self.producer.state()
    }

    /// Check if stop has been requested.
    pub fn is_stopping(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel both timers and wait for the tasks to exit.
    ///
    /// A slot that has not started when cancellation is observed is never
    /// produced; the ledger only changes through a completed slot step.
    pub async fn stop(self) -> Result<(), JoinError> {
        self.cancel.cancel();
        let producer = self.producer_task.await;
        let eviction = self.eviction_task.await;
        info!("Node stopped");
        producer.and(eviction)
    }
}
