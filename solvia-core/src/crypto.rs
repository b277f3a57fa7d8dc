//! Cryptographic primitives for Solvia.
//!
//! - BLAKE3 for digests (block identity, transaction identity, addresses)
//! - Ed25519 for detached signatures over 32-byte digests
//!
//! Public keys and signatures are kept as raw bytes. They arrive inside
//! untrusted transactions and blocks, so a malformed value must be
//! representable and must fail verification instead of failing to parse.

use std::fmt;

use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Shared surface of the 32-byte digest newtypes.
macro_rules! digest_newtype {
    ($name:ident) => {
        impl $name {
            pub fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Parse 64 hex characters.
            pub fn from_hex(s: &str) -> Result<Self> {
                let bytes = hex::decode(s)?;
                let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                    Error::invalid_hash(format!("expected 32 bytes, got {}", bytes.len()))
                })?;
                Ok(Self(arr))
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.to_hex()[..16])
            }
        }
    };
}

/// A 32-byte BLAKE3 digest.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

digest_newtype!(Hash);

impl Hash {
    /// Parent of the genesis block.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// BLAKE3 digest of `data`.
pub fn hash(data: &[u8]) -> Hash {
    Hash(*blake3::hash(data).as_bytes())
}

/// Participant address: the BLAKE3 digest of a public key.
///
/// Addresses order by their bytes; this is the tie-break when two
/// validators hold equal stake.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address([u8; 32]);

digest_newtype!(Address);

/// Derive the address of a public key.
pub fn address_of(key: &PublicKey) -> Address {
    Address(*blake3::hash(&key.0).as_bytes())
}

/// An Ed25519 public key, possibly malformed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Wrap raw bytes without checking that they encode a curve point.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether the bytes decode to a usable Ed25519 key.
    pub fn is_well_formed(&self) -> bool {
        self.decode().is_ok()
    }

    pub fn address(&self) -> Address {
        address_of(self)
    }

    /// Strictly verify `signature` over `message`.
    ///
    /// A key that does not decode is `InvalidKey`; any other failure is
    /// `InvalidSignature`.
    pub fn verify(&self, message: &[u8], signature: &Sig) -> Result<()> {
        let key = self.decode()?;
        key.verify_strict(message, &Signature::from_bytes(&signature.to_bytes()))
            .map_err(|_| Error::invalid_signature())
    }

    fn decode(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0).map_err(|e| Error::invalid_key(e.to_string()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0[..8]))
    }
}

/// An Ed25519 signing key.
#[derive(Clone)]
pub struct SecretKey(SigningKey);

impl SecretKey {
    /// Fresh key from the OS RNG.
    pub fn generate() -> Self {
        Self(SigningKey::generate(&mut OsRng))
    }

    /// Restore from a 32-byte seed.
    pub fn from_bytes(seed: &[u8; 32]) -> Self {
        Self(SigningKey::from_bytes(seed))
    }

    /// The 32-byte seed.
    pub fn as_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key().to_bytes())
    }

    /// Deterministic Ed25519 signature over `message`.
    pub fn sign(&self, message: &[u8]) -> Sig {
        Sig::from_bytes(self.0.sign(message).to_bytes())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([redacted])")
    }
}

/// A 64-byte detached signature, possibly malformed.
///
/// Stored as its two 32-byte halves (the `R` point and the `s` scalar),
/// which serde handles natively.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sig {
    r: [u8; 32],
    s: [u8; 32],
}

impl Sig {
    /// The all-zero placeholder used before sealing.
    pub fn empty() -> Self {
        Self {
            r: [0u8; 32],
            s: [0u8; 32],
        }
    }

    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        let mut sig = Self::empty();
        sig.r.copy_from_slice(&bytes[..32]);
        sig.s.copy_from_slice(&bytes[32..]);
        sig
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..].copy_from_slice(&self.s);
        bytes
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }
}

impl fmt::Debug for Sig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sig({})", hex::encode(&self.r[..8]))
    }
}
