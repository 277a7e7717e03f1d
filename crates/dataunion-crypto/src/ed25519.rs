//! Ed25519 member keys.
//!
//! A member's [`Address`] *is* its Ed25519 verifying key, so the ledger
//! checks a withdrawal signature against the member address directly,
//! with no separate key registry. Verification is strict: small-order
//! keys and malleable signatures never authorize a withdrawal.

use dataunion_types::Address;
use ed25519_dalek::Signer;
use zeroize::Zeroize;

use crate::{CryptoError, Result};

/// A member's private key.
pub struct SigningKey(ed25519_dalek::SigningKey);

/// A member's public key; interchangeable with its [`Address`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VerifyingKey(ed25519_dalek::VerifyingKey);

/// A detached Ed25519 signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

/// A signing key together with its public half.
pub struct KeyPair {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl SigningKey {
    pub fn generate() -> Self {
        Self(ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng))
    }

    /// Build a key from a 32-byte seed. The caller's copy of the seed is
    /// wiped.
    pub fn from_seed(seed: &mut [u8; 32]) -> Self {
        let key = ed25519_dalek::SigningKey::from_bytes(seed);
        seed.zeroize();
        Self(key)
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }

    /// The address this key signs for.
    pub fn address(&self) -> Address {
        self.verifying_key().address()
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey({:?})", self.address())
    }
}

impl VerifyingKey {
    /// Interpret a ledger address as a verifying key.
    ///
    /// # Errors
    ///
    /// - [`CryptoError::InvalidKey`] if the bytes are not a curve point
    pub fn from_address(address: &Address) -> Result<Self> {
        ed25519_dalek::VerifyingKey::from_bytes(address.as_bytes())
            .map(Self)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    pub fn address(&self) -> Address {
        Address::from_bytes(self.0.to_bytes())
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        self.0
            .verify_strict(message, &signature.0)
            .map_err(|_| CryptoError::SignatureVerification)
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerifyingKey({:?})", self.address())
    }
}

impl Signature {
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self(ed25519_dalek::Signature::from_bytes(bytes))
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        self.0.to_bytes()
    }
}

impl KeyPair {
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate())
    }

    /// Deterministic keypair, for fixtures and test vectors.
    pub fn from_seed(mut seed: [u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_seed(&mut seed))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    pub fn address(&self) -> Address {
        self.verifying_key.address()
    }
}
