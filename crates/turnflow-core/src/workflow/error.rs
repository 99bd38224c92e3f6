//! Error types for workflow execution.
//!
//! Two layers:
//! - [`TaskError`] is what a task's own work produces. It is recorded in
//!   history as a string and may be retried.
//! - [`WorkflowError`] is what the coroutine observes at a yield point and
//!   what the host receives when a turn fails.

use serde_json::Value;
use thiserror::Error;
use turnflow_types::error::HostError;
use turnflow_types::workflow::TaskResult;

// ---------------------------------------------------------------------------
// TaskError
// ---------------------------------------------------------------------------

/// Failure of a single task execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The wrapped function, call, or sub-dialog failed.
    #[error("{0}")]
    Failed(String),

    /// A workflow-level semantic failure (e.g. sign-in failed). Retrying it
    /// cannot change the outcome, so the default retry filter skips it.
    #[error("{0}")]
    Workflow(String),
}

impl TaskError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn workflow(message: impl Into<String>) -> Self {
        Self::Workflow(message.into())
    }

    pub fn is_workflow(&self) -> bool {
        matches!(self, Self::Workflow(_))
    }
}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        Self::Failed(message)
    }
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        Self::Failed(message.to_string())
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        Self::Failed(format!("serialization error: {err}"))
    }
}

impl From<HostError> for TaskError {
    fn from(err: HostError) -> Self {
        Self::Failed(err.to_string())
    }
}

impl From<WorkflowError> for TaskError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::TaskFailed(message) => Self::Failed(message),
            WorkflowError::Workflow(message) => Self::Workflow(message),
            other => Self::Failed(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowError
// ---------------------------------------------------------------------------

/// Errors surfaced to workflow code and to the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// A task failed after exhausting its retries. Raised at the yield point
    /// on live execution and on every replay alike.
    #[error("{0}")]
    TaskFailed(String),

    /// A task was rejected with a workflow-level failure (e.g. sign-in
    /// failed). Raised live and on replay, like `TaskFailed`.
    #[error("{0}")]
    Workflow(String),

    /// A recorded value could not be converted into the caller's type.
    #[error("cannot project task result: {0}")]
    Projection(String),

    /// Replay diverged from history, or the host passed inconsistent resume
    /// data. The persisted instance is unrecoverable under this workflow.
    #[error("nondeterministic workflow: {0}")]
    Nondeterminism(String),

    /// The workflow awaited something the dispatcher cannot drive.
    #[error("unsupported await in workflow: {0}")]
    UnsupportedAwait(String),

    #[error("host error: {0}")]
    Host(#[from] HostError),

    /// Persisted state could not be read or written.
    #[error("invalid workflow state: {0}")]
    State(String),
}

impl WorkflowError {
    /// Faults that must abort the turn rather than be handled by workflow code.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Nondeterminism(_) | Self::UnsupportedAwait(_) | Self::State(_)
        )
    }

    pub(crate) fn nondeterminism(message: impl Into<String>) -> Self {
        Self::Nondeterminism(message.into())
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::State(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Recorded outcomes
// ---------------------------------------------------------------------------

/// History record for a task that gave up with `error`.
pub(crate) fn record_error(error: &TaskError) -> TaskResult {
    match error {
        TaskError::Failed(message) => TaskResult::Failed(message.clone()),
        TaskError::Workflow(message) => TaskResult::Rejected(message.clone()),
    }
}

/// What the workflow sees at the yield point for a recorded result.
pub(crate) fn recorded_value(result: TaskResult) -> Result<Value, WorkflowError> {
    match result {
        TaskResult::Succeeded(value) => Ok(value),
        TaskResult::Failed(error) => Err(WorkflowError::TaskFailed(error)),
        TaskResult::Rejected(error) => Err(WorkflowError::Workflow(error)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_error_display_is_bare_message() {
        assert_eq!(TaskError::failed("boom").to_string(), "boom");
        assert_eq!(TaskError::workflow("Sign-in failed.").to_string(), "Sign-in failed.");
    }

    #[test]
    fn test_task_failed_converts_back_without_prefix() {
        let err: TaskError = WorkflowError::TaskFailed("inner".to_string()).into();
        assert_eq!(err, TaskError::Failed("inner".to_string()));
    }

    #[test]
    fn test_only_consistency_faults_are_fatal() {
        assert!(WorkflowError::nondeterminism("kind mismatch").is_fatal());
        assert!(WorkflowError::UnsupportedAwait("sleep".to_string()).is_fatal());
        assert!(!WorkflowError::TaskFailed("boom".to_string()).is_fatal());
        assert!(!WorkflowError::Projection("bad".to_string()).is_fatal());
        assert!(!WorkflowError::Workflow("Sign-in failed.".to_string()).is_fatal());
    }

    #[test]
    fn test_workflow_failures_keep_their_kind_through_history() {
        let recorded = record_error(&TaskError::workflow("Sign-in failed."));
        assert_eq!(recorded, TaskResult::Rejected("Sign-in failed.".to_string()));
        assert_eq!(
            recorded_value(recorded),
            Err(WorkflowError::Workflow("Sign-in failed.".to_string()))
        );

        let recorded = record_error(&TaskError::failed("boom"));
        assert_eq!(
            recorded_value(recorded),
            Err(WorkflowError::TaskFailed("boom".to_string()))
        );
    }

    #[test]
    fn test_workflow_error_converts_back_to_workflow_task_error() {
        let err: TaskError = WorkflowError::Workflow("Sign-in failed.".to_string()).into();
        assert!(err.is_workflow());
    }
}
