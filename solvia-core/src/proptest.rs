//! Property-based tests for core types.
//!
//! Uses proptest to verify invariants hold for arbitrary inputs.

use proptest::prelude::*;

use crate::block::{Block, BlockBuilder};
use crate::crypto::{hash, Hash, SecretKey};
use crate::signer::Signer;
use crate::transaction::Transaction;

/// Generate arbitrary 32-byte arrays.
fn arb_bytes32() -> impl Strategy<Value = [u8; 32]> {
    prop::array::uniform32(any::<u8>())
}

/// Generate a fresh signer (keys are not shrinkable).
fn arb_signer() -> impl Strategy<Value = Signer> {
    Just(()).prop_map(|_| Signer::generate())
}

/// Generate an arbitrary signed transaction.
fn arb_transaction() -> impl Strategy<Value = Transaction> {
    (0u64..4_000_000_000_000, prop::collection::vec(any::<u8>(), 0..128)).prop_map(
        |(timestamp, payload)| {
            Transaction::builder()
                .timestamp(timestamp)
                .payload(payload)
                .sign(&SecretKey::generate())
                .expect("signing should succeed")
        },
    )
}

/// Generate an arbitrary sealed block with up to `max_txs` transactions.
fn arb_block(max_txs: usize) -> impl Strategy<Value = Block> {
    (
        arb_signer(),
        any::<u64>(),
        arb_bytes32(),
        0u64..4_000_000_000_000,
        prop::collection::vec(arb_transaction(), 0..max_txs),
    )
        .prop_map(|(signer, number, prev, timestamp, txs)| {
            BlockBuilder::new(signer.address())
                .position(number, crate::block::BlockHash(Hash::from_bytes(prev)))
                .timestamp(timestamp)
                .transactions(txs)
                .seal(&signer)
                .expect("sealing should succeed")
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Hash hex roundtrip: from_hex(h.to_hex()) == h
    #[test]
    fn prop_hash_hex_roundtrip(bytes in arb_bytes32()) {
        let h = Hash::from_bytes(bytes);
        let restored = Hash::from_hex(&h.to_hex()).expect("hex roundtrip should succeed");
        prop_assert_eq!(h, restored);
    }

    /// Digest is a function of its input.
    #[test]
    fn prop_hash_deterministic(data in prop::collection::vec(any::<u8>(), 0..512)) {
        prop_assert_eq!(hash(&data), hash(&data));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every built transaction verifies.
    #[test]
    fn prop_transaction_verifies(tx in arb_transaction()) {
        prop_assert!(tx.verify().is_ok());
    }

    /// Any single-byte payload change breaks verification.
    #[test]
    fn prop_transaction_tamper_detected(tx in arb_transaction(), flip in any::<u8>()) {
        let mut tampered = tx.clone();
        tampered.payload.push(flip);
        prop_assert!(tampered.verify().is_err());
    }

    /// Recomputing the hash of a sealed block reproduces `hash`, also after
    /// a serialization roundtrip.
    #[test]
    fn prop_block_hash_recompute(block in arb_block(4)) {
        prop_assert_eq!(block.compute_hash().expect("hash"), block.hash);

        let encoded = bincode::serialize(&block).expect("serialize should succeed");
        let decoded: Block = bincode::deserialize(&encoded).expect("deserialize should succeed");
        prop_assert_eq!(decoded.compute_hash().expect("hash"), block.hash);
    }

    /// Changing any hashed field changes the hash.
    #[test]
    fn prop_block_hashed_fields_bound(block in arb_block(2), delta in 1u64..1000) {
        let mut moved = block.clone();
        moved.timestamp = block.timestamp.wrapping_add(delta);
        prop_assert!(moved.verify_hash().is_err());

        let mut renumbered = block.clone();
        renumbered.number = block.number.wrapping_add(delta);
        prop_assert!(renumbered.verify_hash().is_err());
    }
}
