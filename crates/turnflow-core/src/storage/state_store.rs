//! Conversation state store trait.
//!
//! Hosts persist each conversation's dialog stack (and with it every workflow
//! instance's state slot) between turns. Implementations live in
//! turnflow-infra.

use turnflow_types::dialog::ConversationState;
use turnflow_types::error::StoreError;

/// Persistent storage for conversation state, keyed by conversation id.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition). Callers
/// serialize turns per conversation; stores need not guard against
/// concurrent writers for the same key.
pub trait StateStore: Send + Sync {
    /// Load a conversation. Returns None if nothing was saved for it.
    fn load(
        &self,
        conversation_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<ConversationState>, StoreError>> + Send;

    /// Save a conversation, replacing any previous state.
    fn save(
        &self,
        conversation_id: &str,
        state: &ConversationState,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Delete a conversation. No-op if it does not exist.
    fn delete(
        &self,
        conversation_id: &str,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Ids of every stored conversation.
    fn list(&self) -> impl std::future::Future<Output = Result<Vec<String>, StoreError>> + Send;
}
