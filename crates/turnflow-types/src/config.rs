//! Engine configuration types.
//!
//! `EngineConfig` represents `turnflow.toml` in the data directory. All fields
//! have defaults, so an empty or missing file yields a working engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::workflow::RetryConfig;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Retry policy attached to tasks that do not configure their own.
    #[serde(default)]
    pub default_retry: RetryConfig,

    /// Directory for persisted conversations (defaults to `{data_dir}/conversations`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
}
