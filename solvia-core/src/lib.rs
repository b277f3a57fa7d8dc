//! Solvia Core - Fundamental types for the Solvia proof-of-stake ledger.
//!
//! - [`crypto`] - Digests (BLAKE3), addresses and Ed25519 keys/signatures
//! - [`signer`] - A node's signing identity
//! - [`transaction`] - Signed transactions with opaque payloads
//! - [`block`] - Blocks that batch transactions and link into a chain
//!
//! # Example
//!
//! ```rust
//! use solvia_core::{BlockBuilder, Signer, Transaction};
//!
//! let signer = Signer::generate();
//!
//! let tx = Transaction::builder()
//!     .now()
//!     .payload(b"hello".to_vec())
//!     .sign(signer.secret_key())
//!     .unwrap();
//! assert!(tx.verify().is_ok());
//!
//! let block = BlockBuilder::new(signer.address())
//!     .transactions(vec![tx])
//!     .seal(&signer)
//!     .unwrap();
//! assert!(block.verify_hash().is_ok());
//! assert!(block.verify_signature(&signer.public_key()).is_ok());
//! ```

pub mod block;
pub mod crypto;
pub mod error;
pub mod signer;
pub mod transaction;

#[cfg(test)]
mod proptest;

pub use block::{Block, BlockBuilder, BlockHash};
pub use crypto::{address_of, hash, Address, Hash, PublicKey, SecretKey, Sig};
pub use error::{Error, ErrorCode, Result};
pub use signer::Signer;
pub use transaction::{Transaction, TransactionBuilder, TxHash};

/// Current wall-clock time as Unix millis.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
