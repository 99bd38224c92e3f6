//! Dialog-stack data shared between the engine and its hosts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one dialog operation within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogTurnStatus {
    /// No dialog was active.
    Empty,
    /// The active dialog is waiting for the next turn.
    Waiting,
    /// The dialog finished and returned a result.
    Complete,
    /// The dialog was cancelled.
    Cancelled,
}

/// Status plus optional result of a dialog operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogTurnResult {
    pub status: DialogTurnStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl DialogTurnResult {
    pub fn empty() -> Self {
        Self {
            status: DialogTurnStatus::Empty,
            result: None,
        }
    }

    /// End of turn: the active dialog waits for the next inbound activity.
    pub fn waiting() -> Self {
        Self {
            status: DialogTurnStatus::Waiting,
            result: None,
        }
    }

    pub fn complete(result: Option<Value>) -> Self {
        Self {
            status: DialogTurnStatus::Complete,
            result,
        }
    }
}

/// One entry on a conversation's dialog stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogInstance {
    /// Id of the registered dialog this instance runs.
    pub id: String,
    /// The instance's private state slot.
    #[serde(default)]
    pub state: Value,
}

impl DialogInstance {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Value::Null,
        }
    }
}

/// Everything persisted for one conversation between turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Active dialogs, root first.
    #[serde(default)]
    pub stack: Vec<DialogInstance>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_waiting_has_no_result() {
        let result = DialogTurnResult::waiting();
        assert_eq!(result.status, DialogTurnStatus::Waiting);
        assert!(result.result.is_none());
    }

    #[test]
    fn test_conversation_state_deserializes_missing_stack() {
        let state: ConversationState = serde_json::from_value(json!({})).unwrap();
        assert!(state.stack.is_empty());
    }

    #[test]
    fn test_dialog_instance_state_defaults_to_null() {
        let instance: DialogInstance = serde_json::from_value(json!({"id": "root"})).unwrap();
        assert_eq!(instance.id, "root");
        assert!(instance.state.is_null());
    }
}
