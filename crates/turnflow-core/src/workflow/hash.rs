//! Identity hashing for history entries.
//!
//! History stores a one-way hash of each task's identity rather than the
//! identity itself. The hash is only compared for equality on replay; two
//! identities with the same digest are indistinguishable and are treated as
//! the same call.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

/// Abstraction over identity hashing so the digest can be swapped without
/// touching the dispatcher.
pub trait IdentityHasher: Send + Sync {
    /// Compute the persisted hash of a task identity.
    fn hash_identity(&self, identity: &str) -> String;
}

/// SHA-256 digest, base64 encoded (44 characters).
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256IdentityHasher;

impl IdentityHasher for Sha256IdentityHasher {
    fn hash_identity(&self, identity: &str) -> String {
        STANDARD.encode(Sha256::digest(identity.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_value() {
        let hasher = Sha256IdentityHasher;
        assert_eq!(
            hasher.hash_identity(""),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn test_same_identity_same_hash() {
        let hasher = Sha256IdentityHasher;
        assert_eq!(
            hasher.hash_identity("call@src/flow.rs:10:5"),
            hasher.hash_identity("call@src/flow.rs:10:5")
        );
    }

    #[test]
    fn test_different_identity_different_hash() {
        let hasher = Sha256IdentityHasher;
        assert_ne!(
            hasher.hash_identity("dialog:prompt:{\"a\":1}"),
            hasher.hash_identity("dialog:prompt:{\"a\":2}")
        );
    }
}
