//! Conversation state stores.
//!
//! Both stores implement the `StateStore` trait from `turnflow-core` and share
//! the same conversation id rules, so a conversation that can be kept in memory
//! can also be written to disk.

pub mod file;
pub mod memory;

use turnflow_types::error::StoreError;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;

/// Check that a conversation id is usable as a storage key.
///
/// Ids are limited to ASCII letters, digits, `-`, `_` and `.`, and may not
/// start with a dot. That keeps every id a plain file name.
pub fn validate_conversation_id(id: &str) -> Result<(), StoreError> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_ids() {
        assert!(validate_conversation_id("conv-1").is_ok());
        assert!(validate_conversation_id("team_chat.2026").is_ok());
    }

    #[test]
    fn test_rejects_path_like_ids() {
        for id in ["", "../etc", ".hidden", "a/b", "a\\b", "with space"] {
            assert!(
                matches!(validate_conversation_id(id), Err(StoreError::InvalidKey(_))),
                "{id:?} should be rejected"
            );
        }
    }
}
