//! Validator registry for proof-of-stake block production.
//!
//! Manages the stake-weighted set of block producers:
//! - Stake and public key per address
//! - Deterministic active ordering (stake descending, address ascending)
//! - Round-robin producer selection per slot

use serde::{Deserialize, Serialize};
use solvia_core::{address_of, Address, PublicKey};
use std::cmp::Reverse;
use std::collections::HashMap;

/// Slot index containing `timestamp_ms`.
///
/// A zero `block_time_ms` is rejected by `ChainConfig::validate`; if one
/// slips through anyway every timestamp maps to slot 0.
pub fn slot_for(timestamp_ms: u64, block_time_ms: u64) -> u64 {
    timestamp_ms.checked_div(block_time_ms).unwrap_or(0)
}

/// A registered validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRecord {
    pub address: Address,
    pub stake: u64,
    pub public_key: PublicKey,
}

/// Errors from validator set updates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidatorError {
    #[error("negative stake {stake} for {address}")]
    InvalidStake { address: Address, stake: i64 },

    #[error("public key for {0} is not a valid Ed25519 key")]
    MalformedKey(Address),

    #[error("address {address} does not match public key (derived {derived})")]
    AddressMismatch { address: Address, derived: Address },
}

/// A change to the validator set, published to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorChange {
    /// The change type.
    pub kind: ValidatorChangeKind,
    /// The validator being updated or removed.
    pub address: Address,
    /// Stake after the change (0 when removed).
    pub stake: u64,
}

/// Type of validator set change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidatorChangeKind {
    /// Added, or stake/key updated.
    Upsert,
    /// Removed (validator exit).
    Remove,
}

/// The set of staked validators.
#[derive(Debug, Clone)]
pub struct ValidatorSet {
    records: HashMap<Address, ValidatorRecord>,
    min_stake: u64,
}

impl ValidatorSet {
    /// Create an empty set with the given activation threshold.
    pub fn new(min_stake: u64) -> Self {
        Self {
            records: HashMap::new(),
            min_stake,
        }
    }

    /// Number of registered validators (active or not).
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if no validators are registered.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up a validator.
    pub fn get(&self, address: &Address) -> Option<&ValidatorRecord> {
        self.records.get(address)
    }

    /// Registered public key of a validator.
    pub fn public_key_of(&self, address: &Address) -> Option<&PublicKey> {
        self.records.get(address).map(|r| &r.public_key)
    }

    /// Insert or replace a validator record.
    ///
    /// The record is replaced as a whole, so a reader never observes a new
    /// stake paired with an old key.
    pub fn upsert(
        &mut self,
        address: Address,
        stake: u64,
        public_key: PublicKey,
    ) -> Result<ValidatorChange, ValidatorError> {
        if !public_key.is_well_formed() {
            return Err(ValidatorError::MalformedKey(address));
        }
        let derived = address_of(&public_key);
        if derived != address {
            return Err(ValidatorError::AddressMismatch { address, derived });
        }

        self.records.insert(
            address,
            ValidatorRecord {
                address,
                stake,
                public_key,
            },
        );
        Ok(ValidatorChange {
            kind: ValidatorChangeKind::Upsert,
            address,
            stake,
        })
    }

    /// Insert or replace a validator whose stake arrives as a signed value.
    pub fn upsert_signed(
        &mut self,
        address: Address,
        stake: i64,
        public_key: PublicKey,
    ) -> Result<ValidatorChange, ValidatorError> {
        let stake =
            u64::try_from(stake).map_err(|_| ValidatorError::InvalidStake { address, stake })?;
        self.upsert(address, stake, public_key)
    }

    /// Remove a validator.
    ///
    /// Returns `None` if the address was not registered.
    pub fn remove(&mut self, address: &Address) -> Option<ValidatorChange> {
        self.records.remove(address).map(|r| ValidatorChange {
            kind: ValidatorChangeKind::Remove,
            address: r.address,
            stake: 0,
        })
    }

    /// Present and staked at or above the threshold.
    pub fn is_active(&self, address: &Address) -> bool {
        self.records
            .get(address)
            .is_some_and(|r| r.stake >= self.min_stake)
    }

    /// Number of active validators (before the `limit` cut).
    pub fn active_count(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.stake >= self.min_stake)
            .count()
    }

    /// Up to `limit` active validators, stake descending, ties by
    /// ascending address.
    pub fn active_ordered(&self, limit: usize) -> Vec<Address> {
        let mut active: Vec<&ValidatorRecord> = self
            .records
            .values()
            .filter(|r| r.stake >= self.min_stake)
            .collect();
        active.sort_by_key(|r| (Reverse(r.stake), r.address));
        active.into_iter().take(limit).map(|r| r.address).collect()
    }

    /// Whether `address` is in the active set of size `limit`.
    pub fn is_eligible(&self, address: &Address, limit: usize) -> bool {
        self.is_active(address) && self.active_ordered(limit).contains(address)
    }

    /// The producer scheduled for `slot`.
    ///
    /// Returns None if no validator is active.
    pub fn producer_for_slot(&self, slot: u64, limit: usize) -> Option<Address> {
        let producers = self.active_ordered(limit);
        if producers.is_empty() {
            return None;
        }
        let idx = (slot % producers.len() as u64) as usize;
        Some(producers[idx])
    }
}
