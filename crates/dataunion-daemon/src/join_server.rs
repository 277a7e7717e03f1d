//! Signed join requests.
//!
//! A prospective member signs `request_json ‖ timestamp` (decimal ASCII)
//! with its own key and submits it through `join_request`. The daemon
//! checks the signature against the member's address and the timestamp
//! against its clock, then adds the member as the configured join agent.

use dataunion_crypto::blake3::{contexts, derive_key};
use dataunion_crypto::ed25519::{SigningKey, VerifyingKey};
use dataunion_crypto::envelope::SignatureEnvelope;
use dataunion_ledger::LedgerError;
use dataunion_types::Address;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::actor::{with_backoff, ActorError, Backoff, LedgerHandle};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub member: Address,
    /// Application payload, opaque to the ledger. Must be valid JSON.
    pub request_json: String,
    /// Unix seconds at signing time.
    pub timestamp: u64,
    /// Hex-encoded 65-byte signature envelope.
    pub signature: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum JoinError {
    #[error("join requests are disabled")]
    Disabled,

    #[error("request_json is not valid JSON")]
    MalformedRequest,

    #[error("timestamp {timestamp} is outside the accepted window around {now}")]
    StaleTimestamp { timestamp: u64, now: u64 },

    #[error("signature does not match {0}")]
    BadSignature(Address),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Actor(#[from] ActorError),
}

impl crate::actor::Transient for JoinError {
    fn is_transient(&self) -> bool {
        matches!(self, JoinError::Actor(ActorError::Unavailable))
    }
}

/// What a successful request did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinOutcome {
    Joined,
    AlreadyMember,
}

/// Digest a join request signature covers.
pub fn join_digest(request_json: &str, timestamp: u64) -> [u8; 32] {
    let mut material = request_json.as_bytes().to_vec();
    material.extend_from_slice(timestamp.to_string().as_bytes());
    derive_key(contexts::JOIN_REQUEST, &material)
}

impl JoinRequest {
    /// Build and sign a request for `key`'s own address.
    pub fn sign(key: &SigningKey, request_json: &str, timestamp: u64) -> Self {
        let digest = join_digest(request_json, timestamp);
        Self {
            member: key.verifying_key().address(),
            request_json: request_json.to_string(),
            timestamp,
            signature: hex::encode(SignatureEnvelope::sign(key, &digest)),
        }
    }

    /// Check payload, clock window and signature.
    pub fn validate(&self, now: u64, tolerance_seconds: u64) -> Result<(), JoinError> {
        if serde_json::from_str::<serde_json::Value>(&self.request_json).is_err() {
            return Err(JoinError::MalformedRequest);
        }
        if now.abs_diff(self.timestamp) > tolerance_seconds {
            return Err(JoinError::StaleTimestamp {
                timestamp: self.timestamp,
                now,
            });
        }

        let bad = || JoinError::BadSignature(self.member);
        let bytes = hex::decode(&self.signature).map_err(|_| bad())?;
        let envelope = SignatureEnvelope::parse(&bytes).map_err(|_| bad())?;
        let key = VerifyingKey::from_address(&self.member).map_err(|_| bad())?;
        key.verify(&join_digest(&self.request_json, self.timestamp), &envelope.signature)
            .map_err(|_| bad())
    }
}

/// Validate `request` against the ledger clock and add the member as `agent`.
pub async fn handle(
    ledger: &LedgerHandle,
    agent: Address,
    tolerance_seconds: u64,
    request: JoinRequest,
) -> Result<JoinOutcome, JoinError> {
    let member = request.member;
    let outcome = with_backoff(Backoff::default(), || {
        let request = request.clone();
        async move {
            ledger
                .call(move |rt| -> Result<JoinOutcome, JoinError> {
                    request.validate(rt.ledger.now(), tolerance_seconds)?;
                    if rt.ledger.is_active_member(&request.member) {
                        return Ok(JoinOutcome::AlreadyMember);
                    }
                    rt.ledger.add_member(&agent, request.member)?;
                    Ok(JoinOutcome::Joined)
                })
                .await?
        }
    })
    .await;

    match &outcome {
        Ok(result) => info!(%member, ?result, "join request accepted"),
        Err(e) => warn!(%member, "join request rejected: {e}"),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dataunion_crypto::ed25519::KeyPair;
    use dataunion_ledger::clock::ManualClock;

    use super::*;
    use crate::commands::test_support::*;

    #[test]
    fn test_valid_request() {
        let kp = KeyPair::generate();
        let req = JoinRequest::sign(&kp.signing_key, r#"{"device":"a"}"#, 1_000);
        assert_eq!(req.member, kp.address());
        assert!(req.validate(1_000, 300).is_ok());
        assert!(req.validate(1_300, 300).is_ok());
        assert!(req.validate(700, 300).is_ok());
    }

    #[test]
    fn test_stale_request() {
        let kp = KeyPair::generate();
        let req = JoinRequest::sign(&kp.signing_key, "{}", 1_000);
        assert_eq!(
            req.validate(1_301, 300),
            Err(JoinError::StaleTimestamp {
                timestamp: 1_000,
                now: 1_301
            })
        );
        assert!(req.validate(699, 300).is_err());
    }

    #[test]
    fn test_signer_mismatch() {
        let kp = KeyPair::generate();
        let other = KeyPair::generate();
        let mut req = JoinRequest::sign(&kp.signing_key, "{}", 1_000);
        req.member = other.address();
        assert_eq!(req.validate(1_000, 300), Err(JoinError::BadSignature(other.address())));
    }

    #[test]
    fn test_tampered_payload() {
        let kp = KeyPair::generate();
        let mut req = JoinRequest::sign(&kp.signing_key, r#"{"a":1}"#, 1_000);
        req.request_json = r#"{"a":2}"#.to_string();
        assert!(matches!(req.validate(1_000, 300), Err(JoinError::BadSignature(_))));

        let mut req = JoinRequest::sign(&kp.signing_key, "{}", 1_000);
        req.timestamp = 1_001;
        assert!(matches!(req.validate(1_001, 300), Err(JoinError::BadSignature(_))));
    }

    #[test]
    fn test_malformed_payload() {
        let kp = KeyPair::generate();
        let req = JoinRequest::sign(&kp.signing_key, "not json", 1_000);
        assert_eq!(req.validate(1_000, 300), Err(JoinError::MalformedRequest));
    }

    #[tokio::test]
    async fn test_handle_adds_member() {
        let clock = Arc::new(ManualClock::new(5_000));
        let state = state_with(config(), clock);
        let kp = KeyPair::generate();
        let req = JoinRequest::sign(&kp.signing_key, "{}", 5_010);

        let outcome = handle(&state.ledger, addr(AGENT), 300, req.clone())
            .await
            .expect("join");
        assert_eq!(outcome, JoinOutcome::Joined);

        let outcome = handle(&state.ledger, addr(AGENT), 300, req).await.expect("repeat");
        assert_eq!(outcome, JoinOutcome::AlreadyMember);
    }

    #[tokio::test]
    async fn test_handle_rejects_non_agent() {
        let state = state();
        let kp = KeyPair::generate();
        let req = JoinRequest::sign(&kp.signing_key, "{}", 1_000);
        let err = handle(&state.ledger, addr(0x77), 300, req).await.expect_err("not an agent");
        assert!(matches!(err, JoinError::Ledger(LedgerError::NotJoinPartAgent { .. })));
    }
}
