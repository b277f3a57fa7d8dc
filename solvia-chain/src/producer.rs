//! Block producer for creating new blocks.
//!
//! The block producer:
//! - Wakes once per slot (`block_time_ms`)
//! - Computes the scheduled producer from the active validator set
//! - When it is our slot, batches mempool transactions into a block
//! - Seals, validates and appends the block in one critical section

use parking_lot::Mutex;
use solvia_core::{now_millis, Address, Block, BlockBuilder, Signer};
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::events::ChainEvent;
use crate::state::ChainState;
use crate::validation::BlockRejection;
use crate::validators::slot_for;

/// Producer lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    /// Waiting for the next slot.
    Idle,
    /// Building a block for the given slot.
    ProducingSlot(u64),
    /// The run loop has exited.
    Stopped,
}

/// What happened in one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotOutcome {
    /// No validator is active.
    NoEligibleProducer { slot: u64 },
    /// Another validator is scheduled for this slot.
    NotOurSlot { slot: u64, producer: Address },
    /// We already appended a block in this slot.
    AlreadyProduced { slot: u64 },
    /// A block was appended.
    Produced(Block),
    /// The candidate failed validation and was dropped.
    Discarded { slot: u64, reason: BlockRejection },
}

/// Block producer that creates blocks from mempool transactions.
#[derive(Debug)]
pub struct BlockProducer {
    /// The shared chain state.
    chain: Arc<ChainState>,
    /// Our signing identity.
    signer: Arc<Signer>,
    state: Mutex<ProducerState>,
}

impl BlockProducer {
    /// Create a new block producer.
    pub fn new(chain: Arc<ChainState>, signer: Arc<Signer>) -> Self {
        Self {
            chain,
            signer,
            state: Mutex::new(ProducerState::Idle),
        }
    }

    /// Our address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProducerState {
        *self.state.lock()
    }

    fn set_state(&self, state: ProducerState) {
        *self.state.lock() = state;
    }

    /// Check if we are the scheduled producer for the slot containing `now_ms`.
    pub fn is_our_turn(&self, now_ms: u64) -> bool {
        let config = self.chain.config();
        let slot = slot_for(now_ms, config.block_time_ms);
        self.chain
            .validators()
            .producer_for_slot(slot, config.validator_count)
            == Some(self.address())
    }

    /// Run one slot at time `now_ms`.
    ///
    /// Draw, build, validate, append, mempool cleanup and the
    /// `BlockProduced` event all happen under the core lock, so no other
    /// mempool mutation interleaves with an in-flight candidate.
    pub fn produce_for_slot(&self, now_ms: u64) -> SlotOutcome {
        let config = self.chain.config();
        let slot = slot_for(now_ms, config.block_time_ms);
        let me = self.address();

        let mut core = self.chain.lock_core();

        let scheduled = self
            .chain
            .validators()
            .producer_for_slot(slot, config.validator_count);
        match scheduled {
            None => {
                debug!(slot, "No eligible producer");
                return SlotOutcome::NoEligibleProducer { slot };
            }
            Some(producer) if producer != me => {
                debug!(slot, %producer, "Not our slot");
                return SlotOutcome::NotOurSlot { slot, producer };
            }
            Some(_) => {}
        }

        if let Some(tip) = core.ledger.tip() {
            if tip.producer == me && slot_for(tip.timestamp, config.block_time_ms) == slot {
                debug!(slot, "Already produced in this slot");
                return SlotOutcome::AlreadyProduced { slot };
            }
        }

        self.set_state(ProducerState::ProducingSlot(slot));

        let transactions = core.mempool.take(config.max_txs_per_block);
        let mut builder = BlockBuilder::new(me)
            .transactions(transactions)
            .timestamp(now_ms);
        if let Some(tip) = core.ledger.tip() {
            builder = builder.parent(tip);
        }

        let outcome = match builder.seal(&self.signer) {
            Err(e) => {
                let reason = BlockRejection::Encoding(e.to_string());
                error!(slot, %reason, "Failed to build candidate block");
                SlotOutcome::Discarded { slot, reason }
            }
            Ok(block) => match self.chain.commit(&mut core, &block) {
                Ok(result) => {
                    info!(
                        number = result.number,
                        slot,
                        transactions = result.transaction_count,
                        hash = %result.block_hash,
                        "Produced block"
                    );
                    self.chain.publish(ChainEvent::BlockProduced(block.clone()));
                    SlotOutcome::Produced(block)
                }
                Err(reason) => {
                    error!(
                        slot,
                        number = block.number,
                        code = reason.code(),
                        %reason,
                        "Discarding self-produced block that failed validation"
                    );
                    // Drop the transaction that sank the candidate so the next
                    // slot does not draw it again.
                    let offending = match &reason {
                        BlockRejection::InvalidTransaction { index, .. }
                        | BlockRejection::DuplicateTransaction { index, .. } => {
                            block.transactions.get(*index).map(|tx| tx.hash)
                        }
                        _ => None,
                    };
                    if let Some(hash) = offending {
                        core.mempool.remove_included(&[hash]);
                        self.chain.refresh_snapshot(&core);
                        warn!(slot, %hash, "Dropped offending transaction from mempool");
                    }
                    SlotOutcome::Discarded { slot, reason }
                }
            },
        };
        drop(core);

        self.set_state(ProducerState::Idle);
        outcome
    }

    /// Run the block producer loop.
    ///
    /// Ticks every `block_time_ms` against the wall clock until `cancel`
    /// fires. Cancellation is observed between slots; a slot step either
    /// runs to completion or is never started.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = interval(self.chain.config().block_time());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(address = %self.address(), "Block producer started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Block producer shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.produce_for_slot(now_millis());
                }
            }
        }

        self.set_state(ProducerState::Stopped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainConfig;
    use crate::validation::TxRejection;
    use solvia_core::{SecretKey, Transaction};
    use std::collections::HashSet;

    const BLOCK_TIME: u64 = 3_000;
    /// Start of slot 10.
    const SLOT_10: u64 = 30_000;

    fn test_tx(n: u8) -> Transaction {
        Transaction::builder()
            .timestamp(SLOT_10 + n as u64)
            .payload(vec![n])
            .sign(&SecretKey::generate())
            .unwrap()
    }

    fn test_chain(config: ChainConfig) -> Arc<ChainState> {
        Arc::new(ChainState::new(config).unwrap())
    }

    fn register(chain: &ChainState, signer: &Signer, stake: u64) {
        chain
            .upsert_validator(signer.address(), stake, signer.public_key())
            .unwrap();
    }

    fn test_producer() -> BlockProducer {
        let chain = test_chain(ChainConfig::default());
        let signer = Arc::new(Signer::generate());
        register(&chain, &signer, 200_000);
        BlockProducer::new(chain, signer)
    }

    #[test]
    fn test_producer_single_validator_always_scheduled() {
        let producer = test_producer();
        assert!(producer.is_our_turn(SLOT_10));
        assert!(producer.is_our_turn(SLOT_10 + BLOCK_TIME));
        assert_eq!(producer.state(), ProducerState::Idle);
    }

    #[test]
    fn test_producer_drains_mempool_into_block() {
        let producer = test_producer();
        for n in 0..3 {
            producer.chain.submit_transaction(test_tx(n)).unwrap();
        }

        let block = match producer.produce_for_slot(SLOT_10) {
            SlotOutcome::Produced(block) => block,
            other => panic!("expected a block, got {other:?}"),
        };

        assert_eq!(block.number, 0);
        assert_eq!(block.previous_hash, solvia_core::BlockHash::ZERO);
        assert_eq!(block.transactions.len(), 3);
        assert_eq!(block.timestamp, SLOT_10);

        let snapshot = producer.chain.snapshot();
        assert_eq!(snapshot.height, 1);
        assert_eq!(snapshot.mempool_size, 0);
        assert_eq!(producer.state(), ProducerState::Idle);
    }

    #[test]
    fn test_producer_links_to_tip() {
        let producer = test_producer();

        let SlotOutcome::Produced(first) = producer.produce_for_slot(SLOT_10) else {
            panic!("expected genesis");
        };
        producer.chain.submit_transaction(test_tx(1)).unwrap();
        let SlotOutcome::Produced(second) = producer.produce_for_slot(SLOT_10 + BLOCK_TIME) else {
            panic!("expected second block");
        };

        assert_eq!(second.number, 1);
        assert_eq!(second.previous_hash, first.hash);
        assert_eq!(producer.chain.snapshot().last_block_interval_ms, Some(BLOCK_TIME));
    }

    #[test]
    fn test_producer_once_per_slot() {
        let producer = test_producer();

        assert!(matches!(producer.produce_for_slot(SLOT_10), SlotOutcome::Produced(_)));
        assert_eq!(
            producer.produce_for_slot(SLOT_10 + 1_500),
            SlotOutcome::AlreadyProduced { slot: 10 }
        );
        assert_eq!(producer.chain.snapshot().height, 1);
    }

    #[test]
    fn test_producer_no_eligible_producer() {
        let producer = test_producer();
        producer.chain.remove_validator(&producer.address()).unwrap();
        producer.chain.submit_transaction(test_tx(1)).unwrap();

        assert_eq!(
            producer.produce_for_slot(SLOT_10),
            SlotOutcome::NoEligibleProducer { slot: 10 }
        );
        assert_eq!(producer.chain.snapshot().height, 0);
        assert_eq!(producer.chain.snapshot().mempool_size, 1);
    }

    #[test]
    fn test_producer_not_our_slot() {
        let config = ChainConfig {
            validator_count: 2,
            ..Default::default()
        };
        let chain = test_chain(config);
        let a = Arc::new(Signer::generate());
        let b = Arc::new(Signer::generate());
        register(&chain, &a, 200_000);
        register(&chain, &b, 150_000);
        chain.submit_transaction(test_tx(1)).unwrap();

        let producer_b = BlockProducer::new(chain.clone(), b.clone());
        assert_eq!(
            producer_b.produce_for_slot(SLOT_10),
            SlotOutcome::NotOurSlot {
                slot: 10,
                producer: a.address()
            }
        );
        assert_eq!(chain.snapshot().mempool_size, 1);

        // Slot 11 belongs to B.
        assert!(matches!(
            producer_b.produce_for_slot(SLOT_10 + BLOCK_TIME),
            SlotOutcome::Produced(block) if block.producer == b.address()
        ));
    }

    #[test]
    fn test_producer_respects_max_txs() {
        let config = ChainConfig {
            max_txs_per_block: 5,
            ..Default::default()
        };
        let chain = test_chain(config);
        let signer = Arc::new(Signer::generate());
        register(&chain, &signer, 200_000);
        for n in 0..8 {
            chain.submit_transaction(test_tx(n)).unwrap();
        }
        let producer = BlockProducer::new(chain.clone(), signer);

        let SlotOutcome::Produced(first) = producer.produce_for_slot(SLOT_10) else {
            panic!("expected block");
        };
        assert_eq!(first.transactions.len(), 5);
        assert_eq!(first.transactions[0].payload, vec![0]);
        assert_eq!(chain.snapshot().mempool_size, 3);

        let SlotOutcome::Produced(second) = producer.produce_for_slot(SLOT_10 + BLOCK_TIME) else {
            panic!("expected block");
        };
        assert_eq!(second.transactions.len(), 3);
        assert_eq!(chain.snapshot().mempool_size, 0);
    }

    #[test]
    fn test_producer_publishes_block_event() {
        let producer = test_producer();
        let mut events = producer.chain.subscribe();

        let SlotOutcome::Produced(block) = producer.produce_for_slot(SLOT_10) else {
            panic!("expected block");
        };
        assert_eq!(events.try_recv().unwrap(), ChainEvent::BlockProduced(block));
    }

    #[test]
    fn test_producer_discards_invalid_candidate() {
        let producer = test_producer();
        let tx = test_tx(1);
        producer.chain.submit_transaction(tx.clone()).unwrap();

        // Include the pending transaction without the usual mempool cleanup.
        {
            let mut core = producer.chain.lock_core();
            let block = BlockBuilder::new(producer.address())
                .transactions(vec![tx.clone()])
                .timestamp(SLOT_10 - BLOCK_TIME)
                .seal(&producer.signer)
                .unwrap();
            core.ledger.append(block).unwrap();
            assert!(core.mempool.contains(&tx.hash));
        }

        let mut events = producer.chain.subscribe();
        assert_eq!(
            producer.produce_for_slot(SLOT_10),
            SlotOutcome::Discarded {
                slot: 10,
                reason: BlockRejection::InvalidTransaction {
                    index: 0,
                    reason: TxRejection::AlreadyIncluded { block_number: 0 },
                },
            }
        );
        assert!(events.try_recv().is_err());
        assert_eq!(producer.state(), ProducerState::Idle);
        assert!(!producer.chain.is_pending(&tx.hash));
        assert_eq!(producer.chain.snapshot().height, 1);

        // The next slot produces normally.
        assert!(matches!(
            producer.produce_for_slot(SLOT_10 + BLOCK_TIME),
            SlotOutcome::Produced(block) if block.number == 1 && block.transactions.is_empty()
        ));
    }

    #[test]
    fn test_transaction_event_precedes_block_event() {
        let config = ChainConfig {
            event_channel_capacity: 8_192,
            ..Default::default()
        };
        let chain = test_chain(config);
        let signer = Arc::new(Signer::generate());
        register(&chain, &signer, 200_000);
        let producer = BlockProducer::new(chain.clone(), signer);
        let mut events = chain.subscribe();

        let submitter = std::thread::spawn({
            let chain = chain.clone();
            move || {
                for n in 0..100u8 {
                    chain.submit_transaction(test_tx(n)).unwrap();
                }
            }
        });

        let mut now = SLOT_10;
        for _ in 0..2_000 {
            if submitter.is_finished() {
                break;
            }
            producer.produce_for_slot(now);
            now += BLOCK_TIME;
        }
        submitter.join().unwrap();
        producer.produce_for_slot(now);

        let mut accepted = HashSet::new();
        let mut included = 0;
        while let Ok(event) = events.try_recv() {
            match event {
                ChainEvent::TransactionAccepted(tx) => {
                    accepted.insert(tx.hash);
                }
                ChainEvent::BlockProduced(block) => {
                    for tx in &block.transactions {
                        assert!(accepted.contains(&tx.hash), "block event before tx event");
                        included += 1;
                    }
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(included, 100);
        assert_eq!(chain.snapshot().mempool_size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_producer_run_stops_on_cancel() {
        let producer = Arc::new(test_producer());
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let producer = producer.clone();
            let cancel = cancel.clone();
            async move { producer.run(cancel).await }
        });

        tokio::time::sleep(std::time::Duration::from_millis(BLOCK_TIME * 2)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(producer.state(), ProducerState::Stopped);
        assert!(producer.chain.snapshot().height >= 1);
    }
}
