//! Block types for Solvia.
//!
//! Blocks batch transactions together and link by `previous_hash` to form
//! the chain. The block hash covers everything except `hash` and
//! `signature`; the signature is the producer's signature over the hash.

use serde::{Deserialize, Serialize};

use crate::crypto::{hash, Address, Hash, PublicKey, Sig};
use crate::error::{Error, Result};
use crate::signer::Signer;
use crate::transaction::{Transaction, TxHash};

/// Unique identifier for a block (digest of its hashed fields).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockHash(pub Hash);

impl BlockHash {
    /// The zero block hash (used for genesis parent).
    pub const ZERO: Self = Self(Hash::ZERO);

    /// Get the underlying hash.
    pub fn as_hash(&self) -> &Hash {
        &self.0
    }
}

impl std::fmt::Display for BlockHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A block of transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain, starting at 0.
    pub number: u64,
    /// Included transactions, in mempool insertion order.
    pub transactions: Vec<Transaction>,
    /// Hash of the previous block (zero for genesis).
    pub previous_hash: BlockHash,
    /// Address of the producing validator.
    pub producer: Address,
    /// Production time, Unix millis.
    pub timestamp: u64,
    /// Digest of the hashed fields.
    pub hash: BlockHash,
    /// Producer's signature over `hash`.
    pub signature: Sig,
}

/// Fields covered by the block hash (excludes hash and signature).
#[derive(Serialize)]
struct HashableBlock<'a> {
    timestamp: u64,
    previous_hash: &'a BlockHash,
    transactions: &'a [Transaction],
    producer: &'a Address,
    number: u64,
}

impl Block {
    /// Deterministic serialization of the hashed fields.
    pub fn hashable_bytes(&self) -> Result<Vec<u8>> {
        let hashable = HashableBlock {
            timestamp: self.timestamp,
            previous_hash: &self.previous_hash,
            transactions: &self.transactions,
            producer: &self.producer,
            number: self.number,
        };
        Ok(bincode::serialize(&hashable)?)
    }

    /// Recompute the block hash from its fields.
    pub fn compute_hash(&self) -> Result<BlockHash> {
        Ok(BlockHash(hash(&self.hashable_bytes()?)))
    }

    /// Check that `hash` matches the block contents.
    pub fn verify_hash(&self) -> Result<()> {
        if self.compute_hash()? != self.hash {
            return Err(Error::invalid_block("hash does not match contents"));
        }
        Ok(())
    }

    /// Check the producer signature over `hash` under `key`.
    pub fn verify_signature(&self, key: &PublicKey) -> Result<()> {
        key.verify(self.hash.0.as_bytes(), &self.signature)
    }

    /// Whether this is the first block of the chain.
    pub fn is_genesis(&self) -> bool {
        self.number == 0
    }

    /// Hashes of the included transactions, in block order.
    pub fn transaction_hashes(&self) -> Vec<TxHash> {
        self.transactions.iter().map(|tx| tx.hash).collect()
    }
}

/// Builder for creating blocks.
pub struct BlockBuilder {
    producer: Address,
    number: u64,
    previous_hash: BlockHash,
    transactions: Vec<Transaction>,
    timestamp: Option<u64>,
}

impl BlockBuilder {
    /// Create a builder for a genesis block by `producer`.
    pub fn new(producer: Address) -> Self {
        Self {
            producer,
            number: 0,
            previous_hash: BlockHash::ZERO,
            transactions: Vec::new(),
            timestamp: None,
        }
    }

    /// Extend `parent`: number is parent + 1 and the hash links to it.
    pub fn parent(mut self, parent: &Block) -> Self {
        self.number = parent.number + 1;
        self.previous_hash = parent.hash;
        self
    }

    /// Set the number and previous hash explicitly.
    pub fn position(mut self, number: u64, previous_hash: BlockHash) -> Self {
        self.number = number;
        self.previous_hash = previous_hash;
        self
    }

    /// Set the transactions.
    pub fn transactions(mut self, transactions: Vec<Transaction>) -> Self {
        self.transactions = transactions;
        self
    }

    /// Set the timestamp (Unix millis). Defaults to now.
    pub fn timestamp(mut self, millis: u64) -> Self {
        self.timestamp = Some(millis);
        self
    }

    /// Compute the hash and sign it.
    pub fn seal(self, signer: &Signer) -> Result<Block> {
        let mut block = Block {
            number: self.number,
            transactions: self.transactions,
            previous_hash: self.previous_hash,
            producer: self.producer,
            timestamp: self.timestamp.unwrap_or_else(crate::now_millis),
            hash: BlockHash::ZERO,
            signature: Sig::empty(),
        };
        block.hash = block.compute_hash()?;
        block.signature = signer.sign(&block.hash.0);
        Ok(block)
    }
}
