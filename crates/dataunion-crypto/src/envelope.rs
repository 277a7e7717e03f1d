//! Versioned signature envelope.
//!
//! Off-chain signers hand the ledger 65 bytes: a 64-byte Ed25519
//! signature followed by one version byte. Malformed envelopes are
//! reported separately from signatures that simply fail to verify, so a
//! caller can tell "encoded wrong" from "signed the wrong thing".

use crate::ed25519::{Signature, SigningKey};
use crate::{CryptoError, Result};

/// Total envelope length in bytes.
pub const ENVELOPE_LEN: usize = 65;

/// The only supported envelope version.
pub const SIGNATURE_VERSION: u8 = 1;

/// A parsed signature envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureEnvelope {
    pub signature: Signature,
    pub version: u8,
}

impl SignatureEnvelope {
    /// Parse and validate an envelope.
    ///
    /// # Errors
    ///
    /// - [`CryptoError::InvalidSignatureLength`] if `bytes` is not 65 bytes long
    /// - [`CryptoError::UnsupportedSignatureVersion`] if the trailing byte is not 1
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let (sig_bytes, version) = match bytes {
            [sig @ .., version] if bytes.len() == ENVELOPE_LEN => (sig, *version),
            _ => {
                return Err(CryptoError::InvalidSignatureLength {
                    expected: ENVELOPE_LEN,
                    actual: bytes.len(),
                })
            }
        };
        if version != SIGNATURE_VERSION {
            return Err(CryptoError::UnsupportedSignatureVersion(version));
        }
        let raw: [u8; 64] = sig_bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidInput("signature body".to_string()))?;
        Ok(Self {
            signature: Signature::from_bytes(&raw),
            version,
        })
    }

    /// Sign `digest` and wrap the result in a current-version envelope.
    pub fn sign(key: &SigningKey, digest: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENVELOPE_LEN);
        out.extend_from_slice(&key.sign(digest).to_bytes());
        out.push(SIGNATURE_VERSION);
        out
    }
}
