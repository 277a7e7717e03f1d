//! # dataunion-crypto
//!
//! Cryptographic primitives for the Data Union ledger. The suite is fixed:
//! Ed25519 for authorization signatures and domain-separated BLAKE3 for
//! message digests.
//!
//! ## Modules
//!
//! - [`blake3`] — Domain-separated BLAKE3 hashing and registered contexts
//! - [`ed25519`] — Ed25519 signing and verification (RFC 8032)
//! - [`envelope`] — 65-byte versioned signature envelope

pub mod blake3;
pub mod ed25519;
pub mod envelope;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Ed25519 signature verification failed.
    #[error("signature verification failed")]
    SignatureVerification,

    /// Signature envelope has the wrong number of bytes.
    #[error("invalid signature length: expected {expected}, got {actual}")]
    InvalidSignatureLength { expected: usize, actual: usize },

    /// Signature envelope carries an unknown version byte.
    #[error("unsupported signature version: {0}")]
    UnsupportedSignatureVersion(u8),

    /// Bytes do not encode a valid Ed25519 public key.
    #[error("invalid public key: {0}")]
    InvalidKey(String),

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
