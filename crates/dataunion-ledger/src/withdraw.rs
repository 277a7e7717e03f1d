//! Withdrawal authorization.
//!
//! A member can let anyone redeem their earnings by signing a
//! [`WithdrawalAuthorization`] offline. The message binds the recipient,
//! the amount (or [`UNLIMITED`]), the ledger it is valid for, and the
//! member's `withdrawn_earnings` at signing time. The last field is the
//! replay nonce: any withdrawal that changes it stales every outstanding
//! signature of that member.
//!
//! ## Message layout
//!
//! ```text
//! recipient (32) || amount (8, BE) || ledger (32) || withdrawn_earnings (8, BE)
//! ```
//!
//! The signature covers the BLAKE3 `derive_key` digest of that message
//! under the withdraw-authorization context, wrapped in a 65-byte envelope.

use dataunion_crypto::blake3::{self, contexts};
use dataunion_crypto::ed25519::{SigningKey, VerifyingKey};
use dataunion_crypto::envelope::SignatureEnvelope;
use dataunion_crypto::CryptoError;
use dataunion_types::{Address, Amount};

use crate::{LedgerError, Result};

/// Amount sentinel meaning "everything withdrawable at redemption time".
pub const UNLIMITED: Amount = 0;

/// Length of the encoded authorization message.
pub const MESSAGE_LEN: usize = 32 + 8 + 32 + 8;

/// The statement a member signs to authorize a withdrawal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WithdrawalAuthorization {
    pub recipient: Address,
    /// Exact amount, or [`UNLIMITED`].
    pub amount: Amount,
    /// Identity of the ledger the authorization is valid for.
    pub ledger: Address,
    /// Signer's withdrawn earnings when signing.
    pub withdrawn_earnings: Amount,
}

impl WithdrawalAuthorization {
    pub fn message(&self) -> [u8; MESSAGE_LEN] {
        let mut out = [0u8; MESSAGE_LEN];
        out[..32].copy_from_slice(self.recipient.as_bytes());
        out[32..40].copy_from_slice(&self.amount.to_be_bytes());
        out[40..72].copy_from_slice(self.ledger.as_bytes());
        out[72..].copy_from_slice(&self.withdrawn_earnings.to_be_bytes());
        out
    }

    pub fn digest(&self) -> [u8; 32] {
        blake3::derive_key(contexts::WITHDRAW_AUTHORIZATION, &self.message())
    }

    /// Produce a signature envelope over this authorization.
    pub fn sign(&self, key: &SigningKey) -> Vec<u8> {
        SignatureEnvelope::sign(key, &self.digest())
    }
}

/// Check `signature` over `auth` against `signer`.
///
/// Returns `Ok(false)` for any well-formed envelope that does not verify,
/// including signer addresses that are not valid keys.
///
/// # Errors
///
/// - [`LedgerError::BadSignatureLength`] if the envelope is not 65 bytes
/// - [`LedgerError::BadSignatureVersion`] if the version byte is unsupported
pub fn verify_authorization(signer: &Address, auth: &WithdrawalAuthorization, signature: &[u8]) -> Result<bool> {
    let envelope = SignatureEnvelope::parse(signature).map_err(|e| match e {
        CryptoError::UnsupportedSignatureVersion(version) => LedgerError::BadSignatureVersion { version },
        _ => LedgerError::BadSignatureLength { len: signature.len() },
    })?;
    let Ok(key) = VerifyingKey::from_address(signer) else {
        return Ok(false);
    };
    Ok(key.verify(&auth.digest(), &envelope.signature).is_ok())
}

/// One planned transfer out of the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WithdrawalStep {
    pub member: Address,
    /// Recipient the caller asked for.
    pub recipient: Address,
    /// Where the tokens actually go, after routing.
    pub destination: Address,
    pub amount: Amount,
}
