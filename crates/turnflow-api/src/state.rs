//! Application state wiring the sample workflow to on-disk storage.

use std::path::PathBuf;

use turnflow_infra::config::{load_engine_config, resolve_data_dir, resolve_state_dir};
use turnflow_infra::host::DialogStack;
use turnflow_infra::state::FileStateStore;

use crate::sample;

/// Everything a command needs: the dialog host and, through it, the file store.
pub struct AppState {
    pub stack: DialogStack<FileStateStore>,
}

impl AppState {
    /// Resolve the data directory, load `turnflow.toml`, and wire the host.
    pub async fn init(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir(data_dir);
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_engine_config(&data_dir).await;
        let store = FileStateStore::new(resolve_state_dir(&config, &data_dir));
        tracing::debug!(
            data_dir = %data_dir.display(),
            state_dir = %store.dir().display(),
            max_attempts = config.default_retry.max_attempts,
            "initialized"
        );

        let stack = DialogStack::new(sample::dialogs(&config), sample::ROOT_DIALOG, store);
        Ok(Self { stack })
    }

    pub fn store(&self) -> &FileStateStore {
        self.stack.store()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::TempDir;
    use turnflow_core::storage::state_store::StateStore;
    use turnflow_types::activity::Activity;

    async fn read_conversation(dir: &TempDir, id: &str) -> Value {
        let path = dir.path().join("conversations").join(format!("{id}.json"));
        let raw = tokio::fs::read_to_string(path).await.unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_turns_persist_to_the_data_dir() {
        let dir = TempDir::new().unwrap();
        let state = AppState::init(Some(dir.path().into())).await.unwrap();
        let message = |text: &str| Activity::message(text).in_conversation("cli", "local");

        let first = state.stack.run_turn(message("hi")).await.unwrap();
        assert_eq!(first.texts()[1], "What's your name?");

        let saved = read_conversation(&dir, "local").await;
        let stack = saved["stack"].as_array().unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack[0]["state"]["resumeState"]["kind"], "DialogCall");

        // A fresh process sees the same conversation.
        let state = AppState::init(Some(dir.path().into())).await.unwrap();
        let second = state.stack.run_turn(message("Ada")).await.unwrap();
        assert!(second.texts()[0].starts_with("Nice to meet you, Ada."));

        let saved = read_conversation(&dir, "local").await;
        assert_eq!(saved["stack"].as_array().unwrap().len(), 1);
        assert_eq!(saved["stack"][0]["state"]["resumeState"]["kind"], "ReceiveActivity");
        assert_eq!(state.store().list().await.unwrap(), vec!["local".to_string()]);
    }
}
