//! Domain-separated BLAKE3 hashing for the Data Union protocol.
//!
//! Every signed payload is first reduced to a 32-byte digest with
//! BLAKE3's key-derivation mode under a registered context string, so a
//! signature produced for one purpose can never be replayed for another.

/// Registered BLAKE3 context strings.
/// Using an unregistered context string is a protocol violation.
pub mod contexts {
    pub const WITHDRAW_AUTHORIZATION: &str = "DataUnion v1 withdraw-authorization";
    pub const JOIN_REQUEST: &str = "DataUnion v1 join-request";
    pub const EVENT_JOURNAL: &str = "DataUnion v1 event-journal";

    /// All registered context strings. Used for validation.
    pub const ALL_CONTEXTS: &[&str] = &[WITHDRAW_AUTHORIZATION, JOIN_REQUEST, EVENT_JOURNAL];
}

/// Compute BLAKE3 hash of the input data.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *::blake3::hash(data).as_bytes()
}

/// Derive a digest using BLAKE3's built-in key derivation mode.
///
/// # Arguments
///
/// * `context` - A registered context string (see [`contexts`])
/// * `material` - The message being digested
pub fn derive_key(context: &str, material: &[u8]) -> [u8; 32] {
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    hasher.update(material);
    *hasher.finalize().as_bytes()
}

/// Verify that a context string is registered.
pub fn is_registered_context(context: &str) -> bool {
    contexts::ALL_CONTEXTS.contains(&context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(hash(b"revenue"), hash(b"revenue"));
        assert_ne!(hash(b"revenue"), hash(b"revenuE"));
    }

    #[test]
    fn test_contexts_separate_domains() {
        let msg = b"same bytes";
        let a = derive_key(contexts::WITHDRAW_AUTHORIZATION, msg);
        let b = derive_key(contexts::JOIN_REQUEST, msg);
        assert_ne!(a, b);
        assert_ne!(a, hash(msg));
    }

    #[test]
    fn test_registered_contexts() {
        for ctx in contexts::ALL_CONTEXTS {
            assert!(is_registered_context(ctx));
            assert!(ctx.starts_with("DataUnion v1 "));
        }
        assert!(!is_registered_context("DataUnion v1 unknown"));
    }
}
