//! Property-based tests for chain operations.
//!
//! Uses proptest to verify scheduling, mempool and acceptance invariants
//! hold for arbitrary inputs.

use proptest::prelude::*;
use solvia_core::{SecretKey, Signer, Transaction};
use std::cmp::Reverse;
use std::sync::Arc;

use crate::config::ChainConfig;
use crate::mempool::Mempool;
use crate::producer::{BlockProducer, SlotOutcome};
use crate::state::ChainState;
use crate::validators::ValidatorSet;

const MIN_STAKE: u64 = 100_000;

/// Build a set from stakes, returning the signers in insertion order.
fn build_set(stakes: &[u64]) -> (ValidatorSet, Vec<Signer>) {
    let mut set = ValidatorSet::new(MIN_STAKE);
    let signers: Vec<Signer> = stakes.iter().map(|_| Signer::generate()).collect();
    for (signer, &stake) in signers.iter().zip(stakes) {
        set.upsert(signer.address(), stake, signer.public_key()).unwrap();
    }
    (set, signers)
}

fn test_tx(timestamp: u64, payload: Vec<u8>) -> Transaction {
    Transaction::builder()
        .timestamp(timestamp)
        .payload(payload)
        .sign(&SecretKey::generate())
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Same validator records, inserted in any order, schedule the same producer.
    #[test]
    fn prop_producer_deterministic(
        stakes in prop::collection::vec(0u64..400_000, 1..8),
        limit in 1usize..10,
        slot in any::<u64>(),
    ) {
        let (set, signers) = build_set(&stakes);

        let mut reversed = ValidatorSet::new(MIN_STAKE);
        for (signer, &stake) in signers.iter().zip(&stakes).rev() {
            reversed.upsert(signer.address(), stake, signer.public_key()).unwrap();
        }

        prop_assert_eq!(
            set.producer_for_slot(slot, limit),
            reversed.producer_for_slot(slot, limit)
        );
    }

    /// Exactly one producer per slot when any validator is active.
    #[test]
    fn prop_one_producer_when_active(
        stakes in prop::collection::vec(0u64..400_000, 1..8),
        limit in 1usize..10,
        slot in any::<u64>(),
    ) {
        let (set, _) = build_set(&stakes);
        let producer = set.producer_for_slot(slot, limit);

        if stakes.iter().any(|&s| s >= MIN_STAKE) {
            let producer = producer.unwrap();
            prop_assert!(set.is_eligible(&producer, limit));
        } else {
            prop_assert!(producer.is_none());
        }
    }

    /// Active ordering is stake descending, address ascending, bounded by limit.
    #[test]
    fn prop_active_ordered_total_order(
        stakes in prop::collection::vec(
            prop::sample::select(vec![50_000u64, 100_000, 150_000, 300_000]),
            0..10,
        ),
        limit in 1usize..12,
    ) {
        let (set, _) = build_set(&stakes);
        let ordered = set.active_ordered(limit);

        prop_assert!(ordered.len() <= limit);
        prop_assert_eq!(ordered.len(), set.active_count().min(limit));
        let keys: Vec<_> = ordered
            .iter()
            .map(|a| (Reverse(set.get(a).unwrap().stake), *a))
            .collect();
        prop_assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    /// Adding a transaction twice leaves the pool size unchanged.
    #[test]
    fn prop_mempool_add_idempotent(
        timestamp in 0u64..4_000_000_000_000,
        payload in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut pool = Mempool::default_config();
        let tx = test_tx(timestamp, payload);

        prop_assert!(pool.add(tx.clone()).unwrap());
        let size = pool.len();
        prop_assert!(!pool.add(tx).unwrap());
        prop_assert_eq!(pool.len(), size);
    }

    /// A transaction is retained iff its age is at most the TTL.
    #[test]
    fn prop_eviction_boundary(
        now in 10_000_000u64..4_000_000_000_000,
        ttl in 1u64..10_000_000,
        age in 0u64..20_000_000,
    ) {
        let mut pool = Mempool::default_config();
        let tx = test_tx(now.saturating_sub(age), vec![1]);
        let hash = tx.hash;
        pool.add(tx).unwrap();

        pool.evict_expired(now, ttl);
        prop_assert_eq!(pool.contains(&hash), age.min(now) <= ttl);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Every block a producer appends is accepted by a second node replaying it.
    #[test]
    fn prop_appended_blocks_revalidate(tx_counts in prop::collection::vec(0usize..4, 1..5)) {
        let config = ChainConfig::default();
        let signer = Arc::new(Signer::generate());

        let chain = Arc::new(ChainState::new(config.clone()).unwrap());
        let replica = ChainState::new(config.clone()).unwrap();
        for state in [&*chain, &replica] {
            state.upsert_validator(signer.address(), 200_000, signer.public_key()).unwrap();
        }
        let producer = BlockProducer::new(chain.clone(), signer);

        let mut now = 1_700_000_000_000;
        for (round, count) in tx_counts.iter().enumerate() {
            for n in 0..*count {
                chain.submit_transaction(test_tx(now, vec![round as u8, n as u8])).unwrap();
            }
            match producer.produce_for_slot(now) {
                SlotOutcome::Produced(block) => {
                    prop_assert_eq!(block.transactions.len(), *count);
                    prop_assert!(replica.receive_block(block).is_ok());
                }
                other => prop_assert!(false, "unexpected outcome {:?}", other),
            }
            now += config.block_time_ms;
        }

        // All pending transactions were included, so both pools are empty.
        prop_assert_eq!(replica.snapshot(), chain.snapshot());
    }
}
