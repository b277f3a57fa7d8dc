//! Transactions submitted to the ledger.
//!
//! A transaction is created and signed by an external submitter and is
//! immutable once constructed. Its `hash` is the digest the submitter
//! signs, so identity and signature cover the same bytes.

use serde::{Deserialize, Serialize};

use crate::crypto::{address_of, hash, Address, Hash, PublicKey, SecretKey, Sig};
use crate::error::{Error, Result};

/// Transaction identifier (digest of the signable fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxHash(pub Hash);

impl TxHash {
    /// Get the underlying hash.
    pub fn as_hash(&self) -> &Hash {
        &self.0
    }
}

impl std::fmt::Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A signed transaction with an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Digest of the signable fields.
    pub hash: TxHash,
    /// Submitter's public key.
    pub sender_public_key: PublicKey,
    /// Submitter's signature over `hash`.
    pub signature: Sig,
    /// Creation time, Unix millis.
    pub timestamp: u64,
    /// Opaque application payload.
    pub payload: Vec<u8>,
}

/// Fields covered by the transaction digest.
#[derive(Serialize)]
struct SignableTransaction<'a> {
    sender_public_key: &'a PublicKey,
    timestamp: u64,
    payload: &'a [u8],
}

fn signing_digest(sender_public_key: &PublicKey, timestamp: u64, payload: &[u8]) -> Result<TxHash> {
    let signable = SignableTransaction {
        sender_public_key,
        timestamp,
        payload,
    };
    Ok(TxHash(hash(&bincode::serialize(&signable)?)))
}

impl Transaction {
    /// Create a new transaction builder.
    pub fn builder() -> TransactionBuilder {
        TransactionBuilder::default()
    }

    /// Recompute the digest intended for signing.
    pub fn compute_hash(&self) -> Result<TxHash> {
        signing_digest(&self.sender_public_key, self.timestamp, &self.payload)
    }

    /// Address of the submitter.
    pub fn sender(&self) -> Address {
        address_of(&self.sender_public_key)
    }

    /// Check that `hash` matches the contents and `signature` verifies over it.
    pub fn verify(&self) -> Result<()> {
        if self.compute_hash()? != self.hash {
            return Err(Error::invalid_transaction("hash does not match contents"));
        }
        self.sender_public_key
            .verify(self.hash.0.as_bytes(), &self.signature)
    }
}

/// Builder for creating signed transactions.
#[derive(Default)]
pub struct TransactionBuilder {
    timestamp: Option<u64>,
    payload: Vec<u8>,
}

impl TransactionBuilder {
    /// Set the creation time (Unix millis).
    pub fn timestamp(mut self, millis: u64) -> Self {
        self.timestamp = Some(millis);
        self
    }

    /// Use the current time.
    pub fn now(mut self) -> Self {
        self.timestamp = Some(crate::now_millis());
        self
    }

    /// Set the payload.
    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Build and sign the transaction.
    pub fn sign(self, key: &SecretKey) -> Result<Transaction> {
        let timestamp = self
            .timestamp
            .ok_or_else(|| Error::invalid_transaction("missing timestamp"))?;
        let sender_public_key = key.public_key();
        let tx_hash = signing_digest(&sender_public_key, timestamp, &self.payload)?;
        let signature = key.sign(tx_hash.0.as_bytes());

        Ok(Transaction {
            hash: tx_hash,
            sender_public_key,
            signature,
            timestamp,
            payload: self.payload,
        })
    }
}
