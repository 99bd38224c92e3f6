//! In-memory state store.
//!
//! Backed by a `DashMap`. Values are cloned in and out so no map guard is held
//! across an `.await`.

use std::sync::Arc;

use dashmap::DashMap;

use turnflow_core::storage::state_store::StateStore;
use turnflow_types::dialog::ConversationState;
use turnflow_types::error::StoreError;

use super::validate_conversation_id;

/// Conversation states kept in process memory.
///
/// Cloning produces a shared view of the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<DashMap<String, ConversationState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored conversations.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl StateStore for MemoryStateStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationState>, StoreError> {
        validate_conversation_id(conversation_id)?;
        Ok(self.inner.get(conversation_id).map(|r| r.value().clone()))
    }

    async fn save(&self, conversation_id: &str, state: &ConversationState) -> Result<(), StoreError> {
        validate_conversation_id(conversation_id)?;
        self.inner.insert(conversation_id.to_string(), state.clone());
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> Result<(), StoreError> {
        validate_conversation_id(conversation_id)?;
        self.inner.remove(conversation_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.inner.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnflow_types::dialog::DialogInstance;

    fn sample() -> ConversationState {
        ConversationState {
            stack: vec![DialogInstance::new("root")],
        }
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = MemoryStateStore::new();
        store.save("c1", &sample()).await.unwrap();

        assert_eq!(store.load("c1").await.unwrap(), Some(sample()));
        assert_eq!(store.load("c2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clones_share_data() {
        let store = MemoryStateStore::new();
        let view = store.clone();
        store.save("c1", &sample()).await.unwrap();

        assert_eq!(view.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let store = MemoryStateStore::new();
        store.save("b", &sample()).await.unwrap();
        store.save("a", &sample()).await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec!["a", "b"]);

        store.delete("a").await.unwrap();
        store.delete("missing").await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_rejects_invalid_ids() {
        let store = MemoryStateStore::new();
        let err = store.save("../x", &sample()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
        assert!(store.is_empty());
    }
}
