//! Engine configuration loader.
//!
//! Reads `turnflow.toml` from the data directory and deserializes it into
//! [`EngineConfig`]. Falls back to defaults when the file is missing or
//! malformed.

use std::path::{Path, PathBuf};

use turnflow_types::config::EngineConfig;

/// Name of the config file inside the data directory.
pub const CONFIG_FILE: &str = "turnflow.toml";

/// Environment variable that overrides the platform data directory.
pub const DATA_DIR_ENV: &str = "TURNFLOW_DATA_DIR";

/// Load engine configuration from `{data_dir}/turnflow.toml`.
///
/// - Missing file: [`EngineConfig::default()`] (never retry, default state dir).
/// - Unreadable or unparsable file: logs a warning and returns the default.
pub async fn load_engine_config(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {CONFIG_FILE} found at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            EngineConfig::default()
        }
    }
}

/// Resolve the data directory.
///
/// Priority:
/// 1. Explicit override (the `--data-dir` flag)
/// 2. `TURNFLOW_DATA_DIR` environment variable
/// 3. Platform data directory (e.g. `~/.local/share/turnflow` on Linux)
/// 4. `.turnflow` in the current directory
pub fn resolve_data_dir(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir;
    }

    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(data) = dirs::data_dir() {
        return data.join("turnflow");
    }

    PathBuf::from(".turnflow")
}

/// Directory the file store writes conversations to.
///
/// A relative `state_dir` in the config is taken relative to the data directory.
pub fn resolve_state_dir(config: &EngineConfig, data_dir: &Path) -> PathBuf {
    match &config.state_dir {
        Some(dir) if dir.is_absolute() => dir.clone(),
        Some(dir) => data_dir.join(dir),
        None => data_dir.join("conversations"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use turnflow_types::workflow::DelayConfig;

    #[tokio::test]
    async fn test_load_engine_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config, EngineConfig::default());
    }

    #[tokio::test]
    async fn test_load_engine_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
state_dir = "state"

[default_retry]
max_attempts = 3

[default_retry.delay]
type = "exponential"
initial_ms = 10
max_ms = 100
"#,
        )
        .await
        .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.default_retry.max_attempts, 3);
        assert_eq!(
            config.default_retry.delay,
            DelayConfig::Exponential {
                initial_ms: 10,
                max_ms: 100
            }
        );
        assert_eq!(config.state_dir, Some(PathBuf::from("state")));
    }

    #[tokio::test]
    async fn test_load_engine_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join(CONFIG_FILE), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_resolve_data_dir_prefers_explicit_override() {
        let dir = resolve_data_dir(Some(PathBuf::from("/tmp/explicit")));
        assert_eq!(dir, PathBuf::from("/tmp/explicit"));
    }

    #[test]
    fn test_resolve_data_dir_from_env() {
        // SAFETY: This test is single-threaded and restores the env var immediately.
        unsafe {
            std::env::set_var(DATA_DIR_ENV, "/tmp/test-turnflow");
        }
        let dir = resolve_data_dir(None);
        assert_eq!(dir, PathBuf::from("/tmp/test-turnflow"));
        unsafe {
            std::env::remove_var(DATA_DIR_ENV);
        }
    }

    #[test]
    fn test_resolve_state_dir_variants() {
        let data_dir = PathBuf::from("/data/turnflow");
        let mut config = EngineConfig::default();
        assert_eq!(
            resolve_state_dir(&config, &data_dir),
            PathBuf::from("/data/turnflow/conversations")
        );

        config.state_dir = Some(PathBuf::from("state"));
        assert_eq!(
            resolve_state_dir(&config, &data_dir),
            PathBuf::from("/data/turnflow/state")
        );

        config.state_dir = Some(PathBuf::from("/var/lib/turnflow"));
        assert_eq!(
            resolve_state_dir(&config, &data_dir),
            PathBuf::from("/var/lib/turnflow")
        );
    }
}
