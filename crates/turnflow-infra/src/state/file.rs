//! JSON-file state store.
//!
//! One pretty-printed JSON document per conversation at
//! `{dir}/{conversation_id}.json`. Saves write to a sibling temp file first and
//! rename it over the target, so a crash mid-write leaves the previous state
//! intact.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use turnflow_core::storage::state_store::StateStore;
use turnflow_types::dialog::ConversationState;
use turnflow_types::error::StoreError;

use super::validate_conversation_id;

const EXTENSION: &str = "json";

/// Conversation states stored as files under one directory.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, conversation_id: &str) -> Result<PathBuf, StoreError> {
        validate_conversation_id(conversation_id)?;
        Ok(self.dir.join(format!("{conversation_id}.{EXTENSION}")))
    }
}

impl StateStore for FileStateStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationState>, StoreError> {
        let path = self.path_for(conversation_id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn save(&self, conversation_id: &str, state: &ConversationState) -> Result<(), StoreError> {
        let path = self.path_for(conversation_id)?;
        let content = serde_json::to_string_pretty(state)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(
            conversation_id,
            path = %path.display(),
            depth = state.stack.len(),
            "saved conversation state"
        );
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> Result<(), StoreError> {
        let path = self.path_for(conversation_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(id) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
