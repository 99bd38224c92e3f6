//! One turn's view of a conversation's dialog stack.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde_json::Value;

use turnflow_core::dialog::SharedDialog;
use turnflow_core::dialog::host::{DialogHost, TurnContext};
use turnflow_core::workflow::WorkflowError;
use turnflow_types::activity::{Activity, ResourceResponse};
use turnflow_types::dialog::{ConversationState, DialogInstance, DialogTurnResult};
use turnflow_types::error::HostError;

use super::DialogSet;

/// Serves the host contract for a single inbound activity.
///
/// The stack is held behind a plain mutex that is never locked across an
/// `.await`: every lifecycle call on a child dialog happens after the guard is
/// dropped.
pub(crate) struct StackTurn {
    activity: Activity,
    dialogs: Arc<DialogSet>,
    state: Mutex<ConversationState>,
    outbound: Mutex<Vec<Activity>>,
    this: Weak<StackTurn>,
}

impl StackTurn {
    pub(crate) fn new(
        activity: Activity,
        dialogs: Arc<DialogSet>,
        state: ConversationState,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            activity,
            dialogs,
            state: Mutex::new(state),
            outbound: Mutex::new(Vec::new()),
            this: this.clone(),
        })
    }

    /// A context handle for dialogs running within this turn.
    pub(crate) fn context(&self) -> Result<TurnContext, HostError> {
        self.this
            .upgrade()
            .map(TurnContext::from_arc)
            .ok_or_else(|| HostError::Transport("turn has already finished".to_string()))
    }

    pub(crate) fn depth(&self) -> usize {
        self.stack().stack.len()
    }

    /// Take the final stack and every activity sent during the turn.
    pub(crate) fn finish(&self) -> (ConversationState, Vec<Activity>) {
        let state = std::mem::take(&mut *self.stack());
        let outbound = std::mem::take(&mut *self.outbound.lock().expect("outbound lock poisoned"));
        (state, outbound)
    }

    async fn start(
        &self,
        dialog_id: &str,
        options: Option<Value>,
    ) -> Result<DialogTurnResult, WorkflowError> {
        let dialog: SharedDialog = self.dialogs.find(dialog_id)?;
        self.stack().stack.push(DialogInstance::new(dialog_id));
        tracing::debug!(dialog_id, depth = self.depth(), "begin dialog");
        dialog.begin_dialog_boxed(self.context()?, options).await
    }

    fn stack(&self) -> MutexGuard<'_, ConversationState> {
        self.state.lock().expect("dialog stack lock poisoned")
    }

    fn top_mut<T>(&self, f: impl FnOnce(&mut DialogInstance) -> T) -> Result<T, HostError> {
        let mut state = self.stack();
        state.stack.last_mut().map(f).ok_or(HostError::NoActiveDialog)
    }
}

impl DialogHost for StackTurn {
    fn activity(&self) -> Activity {
        self.activity.clone()
    }

    fn active_dialog_id(&self) -> Option<String> {
        self.stack().stack.last().map(|d| d.id.clone())
    }

    fn load_instance_state(&self) -> Result<Option<Value>, HostError> {
        self.top_mut(|top| Some(top.state.clone()).filter(|s| !s.is_null()))
    }

    fn save_instance_state(&self, state: Value) -> Result<(), HostError> {
        self.top_mut(|top| top.state = state)
    }

    async fn send_activity(&self, activity: Activity) -> Result<ResourceResponse, HostError> {
        let mut activity = activity;
        if activity.channel_id.is_empty() {
            activity.channel_id = self.activity.channel_id.clone();
        }
        if activity.conversation_id.is_empty() {
            activity.conversation_id = self.activity.conversation_id.clone();
        }

        let mut outbound = self.outbound.lock().expect("outbound lock poisoned");
        outbound.push(activity);
        Ok(ResourceResponse {
            id: format!("{}-{}", self.activity.conversation_id, outbound.len()),
        })
    }

    async fn begin_dialog(
        &self,
        dialog_id: &str,
        options: Option<Value>,
    ) -> Result<DialogTurnResult, WorkflowError> {
        self.start(dialog_id, options).await
    }

    async fn end_dialog(&self, result: Option<Value>) -> Result<DialogTurnResult, WorkflowError> {
        let parent = {
            let mut state = self.stack();
            let ended = state.stack.pop().ok_or(HostError::NoActiveDialog)?;
            tracing::debug!(dialog_id = %ended.id, depth = state.stack.len(), "end dialog");
            state.stack.last().map(|d| d.id.clone())
        };

        match parent {
            Some(parent_id) => {
                let dialog = self.dialogs.find(&parent_id)?;
                dialog.resume_dialog_boxed(self.context()?, result).await
            }
            None => Ok(DialogTurnResult::complete(result)),
        }
    }

    async fn replace_dialog(
        &self,
        dialog_id: &str,
        options: Option<Value>,
    ) -> Result<DialogTurnResult, WorkflowError> {
        let replaced = self.stack().stack.pop().ok_or(HostError::NoActiveDialog)?;
        tracing::debug!(from = %replaced.id, to = dialog_id, "replace dialog");
        self.start(dialog_id, options).await
    }
}
