//! Persisted workflow state for Turnflow.
//!
//! A workflow instance is stored by its host as one plain JSON document:
//!
//! ```json
//! {
//!   "options": { ... },
//!   "history": [ { "kind": "AsyncCall", "hashedIdentity": "...", "result": { "success": true, "value": 1 } } ],
//!   "resumeState": { "kind": "ReceiveActivity", "hashedIdentity": "..." }
//! }
//! ```
//!
//! The types here are pure data. The engine that appends to `history` and
//! sets `resume_state` lives in `turnflow-core`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// WorkflowState
// ---------------------------------------------------------------------------

/// The per-instance state slot owned by the host.
///
/// Created when the workflow instance begins, mutated by the dispatcher on
/// every turn, discarded when the host ends or replaces the instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState<O> {
    /// The input the instance was started with.
    pub options: O,
    /// Outcomes of every task executed so far, in issuance order.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    /// Present only while the coroutine is suspended on one outstanding task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_state: Option<ResumeState>,
}

impl<O> WorkflowState<O> {
    /// Fresh state for a new instance: empty history, not suspended.
    pub fn new(options: O) -> Self {
        Self {
            options,
            history: Vec::new(),
            resume_state: None,
        }
    }

    /// Whether the last run ended on a suspension.
    pub fn is_suspended(&self) -> bool {
        self.resume_state.is_some()
    }
}

// ---------------------------------------------------------------------------
// HistoryEntry / ResumeState
// ---------------------------------------------------------------------------

/// One recorded task outcome. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Task kind tag (e.g. `AsyncCall`, `boundFunc_...`).
    pub kind: String,
    /// One-way hash of the task's invocation identity. Empty for built-ins.
    pub hashed_identity: String,
    /// The recorded outcome.
    pub result: TaskResult,
}

/// Marker for the single task the coroutine is suspended on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeState {
    pub kind: String,
    pub hashed_identity: String,
}

// ---------------------------------------------------------------------------
// TaskResult
// ---------------------------------------------------------------------------

/// Recorded outcome of a task.
///
/// Serialized as `{ "success": true, "value": <json> }` or
/// `{ "success": false, "error": "<message>" }`. Errors are stored as strings
/// so they survive serialization. A `null` value is written without the
/// `value` field and read back as `null`. A rejected task additionally
/// carries `"workflowError": true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTaskResult", into = "RawTaskResult")]
pub enum TaskResult {
    Succeeded(Value),
    Failed(String),
    /// Workflow-level failure such as a failed sign-in. Never retried.
    Rejected(String),
}

impl TaskResult {
    pub fn succeeded(value: impl Into<Value>) -> Self {
        Self::Succeeded(value.into())
    }

    pub fn failed(error: impl ToString) -> Self {
        Self::Failed(error.to_string())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    /// Borrow the outcome as a standard `Result`.
    pub fn as_result(&self) -> Result<&Value, &str> {
        match self {
            Self::Succeeded(value) => Ok(value),
            Self::Failed(error) | Self::Rejected(error) => Err(error),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawTaskResult {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, rename = "workflowError", skip_serializing_if = "std::ops::Not::not")]
    workflow_error: bool,
}

impl TryFrom<RawTaskResult> for TaskResult {
    type Error = String;

    fn try_from(raw: RawTaskResult) -> Result<Self, Self::Error> {
        if raw.success {
            Ok(Self::Succeeded(raw.value.unwrap_or(Value::Null)))
        } else {
            let rejected = raw.workflow_error;
            raw.error
                .map(|error| if rejected { Self::Rejected(error) } else { Self::Failed(error) })
                .ok_or_else(|| "failed task result is missing its error".to_string())
        }
    }
}

impl From<TaskResult> for RawTaskResult {
    fn from(result: TaskResult) -> Self {
        match result {
            TaskResult::Succeeded(value) => Self {
                success: true,
                value: (!value.is_null()).then_some(value),
                error: None,
                workflow_error: false,
            },
            TaskResult::Failed(error) => Self {
                success: false,
                value: None,
                error: Some(error),
                workflow_error: false,
            },
            TaskResult::Rejected(error) => Self {
                success: false,
                value: None,
                error: Some(error),
                workflow_error: true,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Retry Configuration
// ---------------------------------------------------------------------------

/// Serializable retry settings (the `[default_retry]` table of `turnflow.toml`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one (default 1, i.e. never retry).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay curve between attempts.
    #[serde(default)]
    pub delay: DelayConfig,
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay: DelayConfig::default(),
        }
    }
}

/// Delay between retry attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DelayConfig {
    /// Retry right away.
    #[default]
    Immediate,
    /// Constant delay.
    Linear { delay_ms: u64 },
    /// Doubles per attempt starting at `initial_ms`, capped at `max_ms`.
    Exponential { initial_ms: u64, max_ms: u64 },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_result_success_json_shape() {
        let json = serde_json::to_value(TaskResult::succeeded(json!({"a": 1}))).unwrap();
        assert_eq!(json, json!({"success": true, "value": {"a": 1}}));
    }

    #[test]
    fn test_task_result_failure_json_shape() {
        let json = serde_json::to_value(TaskResult::failed("boom")).unwrap();
        assert_eq!(json, json!({"success": false, "error": "boom"}));
    }

    #[test]
    fn test_task_result_rejected_keeps_its_marker() {
        let rejected = TaskResult::Rejected("Sign-in failed.".to_string());
        let json = serde_json::to_value(&rejected).unwrap();
        assert_eq!(
            json,
            json!({"success": false, "error": "Sign-in failed.", "workflowError": true})
        );

        let parsed: TaskResult = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, rejected);
        assert_eq!(parsed.as_result(), Err("Sign-in failed."));
    }

    #[test]
    fn test_task_result_null_value_is_omitted() {
        let json = serde_json::to_value(TaskResult::Succeeded(Value::Null)).unwrap();
        assert_eq!(json, json!({"success": true}));

        let parsed: TaskResult = serde_json::from_value(json!({"success": true})).unwrap();
        assert_eq!(parsed, TaskResult::Succeeded(Value::Null));
    }

    #[test]
    fn test_task_result_failure_without_error_is_rejected() {
        let parsed = serde_json::from_value::<TaskResult>(json!({"success": false}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_workflow_state_uses_camel_case_fields() {
        let mut state = WorkflowState::new(json!({"foo": 1}));
        state.history.push(HistoryEntry {
            kind: "AsyncCall".to_string(),
            hashed_identity: "abc".to_string(),
            result: TaskResult::succeeded(2),
        });
        state.resume_state = Some(ResumeState {
            kind: "ReceiveActivity".to_string(),
            hashed_identity: "def".to_string(),
        });

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["history"][0]["hashedIdentity"], "abc");
        assert_eq!(json["resumeState"]["kind"], "ReceiveActivity");
        assert!(state.is_suspended());
    }

    #[test]
    fn test_workflow_state_omits_absent_resume_state() {
        let state = WorkflowState::new(json!(null));
        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("resumeState").is_none());
        assert!(!state.is_suspended());
    }

    #[test]
    fn test_default_retry_config_never_retries() {
        let config: RetryConfig = toml::from_str("").unwrap();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.delay, DelayConfig::Immediate);
    }

    #[test]
    fn test_retry_config_exponential_from_toml() {
        let config: RetryConfig = toml::from_str(
            r#"
max_attempts = 4

[delay]
type = "exponential"
initial_ms = 100
max_ms = 1000
"#,
        )
        .unwrap();
        assert_eq!(config.max_attempts, 4);
        assert_eq!(
            config.delay,
            DelayConfig::Exponential {
                initial_ms: 100,
                max_ms: 1000
            }
        );
    }
}
