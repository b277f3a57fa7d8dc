//! Node signing identity.

use crate::crypto::{address_of, Address, Hash, PublicKey, SecretKey, Sig};

/// Holds a node's keypair and signs digests with it.
///
/// Signatures are deterministic (Ed25519). Verification never fails
/// loudly: a malformed key or signature is simply `false`.
#[derive(Debug, Clone)]
pub struct Signer {
    key: SecretKey,
    public_key: PublicKey,
    address: Address,
}

impl Signer {
    /// Create a signer from an existing secret key.
    pub fn new(key: SecretKey) -> Self {
        let public_key = key.public_key();
        let address = address_of(&public_key);
        Self {
            key,
            public_key,
            address,
        }
    }

    /// Create a signer with a freshly generated key.
    pub fn generate() -> Self {
        Self::new(SecretKey::generate())
    }

    /// The signer's public key.
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// The signer's address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Access the underlying secret key.
    pub fn secret_key(&self) -> &SecretKey {
        &self.key
    }

    /// Sign a digest.
    pub fn sign(&self, digest: &Hash) -> Sig {
        self.key.sign(digest.as_bytes())
    }

    /// Verify a signature over a digest.
    pub fn verify(digest: &Hash, signature: &Sig, public_key: &PublicKey) -> bool {
        public_key.verify(digest.as_bytes(), signature).is_ok()
    }
}
