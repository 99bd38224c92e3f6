//! Workflow entry point: a coroutine exposed as a [`Dialog`].
//!
//! [`FluentDialog`] owns the instance's state slot on the host. Each
//! lifecycle call loads (or creates) the persisted state, runs a
//! [`Dispatcher`], and translates the outcome into a dialog turn result:
//! completion ends the instance, suspension saves the state and then applies
//! the suspend hook.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use turnflow_types::dialog::DialogTurnResult;
use turnflow_types::workflow::WorkflowState;

use super::dispatcher::{Dispatcher, RunMode, TurnOutcome, WorkflowFn};
use super::error::WorkflowError;
use super::hash::{IdentityHasher, Sha256IdentityHasher};
use super::retry::{NeverRetry, RetryPolicy};
use crate::dialog::Dialog;
use crate::dialog::host::TurnContext;

/// A workflow coroutine registered as a dialog.
pub struct FluentDialog<O, W> {
    id: String,
    flow: W,
    hasher: Arc<dyn IdentityHasher>,
    default_retry: Arc<dyn RetryPolicy>,
    _options: PhantomData<fn(O)>,
}

impl<O, W> FluentDialog<O, W>
where
    O: Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static,
    W: WorkflowFn<O>,
    W::Output: Serialize + Send,
{
    pub fn new(id: impl Into<String>, flow: W) -> Self {
        Self {
            id: id.into(),
            flow,
            hasher: Arc::new(Sha256IdentityHasher),
            default_retry: Arc::new(NeverRetry),
            _options: PhantomData,
        }
    }

    pub fn with_hasher(mut self, hasher: impl IdentityHasher + 'static) -> Self {
        self.hasher = Arc::new(hasher);
        self
    }

    /// Retry policy for every task that does not configure its own.
    pub fn with_default_retry(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.default_retry = policy;
        self
    }

    fn load_state(&self, turn: &TurnContext) -> Result<WorkflowState<O>, WorkflowError> {
        let raw = turn.load_instance_state()?.ok_or_else(|| {
            WorkflowError::State(format!("no persisted state for workflow '{}'", self.id))
        })?;
        Ok(serde_json::from_value(raw)?)
    }

    async fn run_turn(
        &self,
        turn: TurnContext,
        state: WorkflowState<O>,
        mode: RunMode,
    ) -> Result<DialogTurnResult, WorkflowError> {
        let mut dispatcher = Dispatcher::new(state, turn.clone(), self.id.as_str())
            .with_hasher(Arc::clone(&self.hasher))
            .with_default_retry(Arc::clone(&self.default_retry));

        match dispatcher.run(&self.flow, mode).await? {
            TurnOutcome::Completed(result) => {
                let result = serde_json::to_value(result)?;
                tracing::info!(dialog_id = %self.id, "workflow finished");
                turn.end_dialog(Some(result)).await
            }
            TurnOutcome::Suspended(suspension) => {
                // Saved before the hook runs: a child that completes within
                // this turn resumes us from the saved state.
                let state = serde_json::to_value(dispatcher.into_state())?;
                turn.save_instance_state(state)?;
                suspension.apply(turn).await
            }
        }
    }
}

impl<O, W> Dialog for FluentDialog<O, W>
where
    O: Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static,
    W: WorkflowFn<O>,
    W::Output: Serialize + Send,
{
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin_dialog(
        &self,
        turn: TurnContext,
        options: Option<Value>,
    ) -> Result<DialogTurnResult, WorkflowError> {
        let options = match options {
            Some(raw) => serde_json::from_value(raw)
                .map_err(|e| WorkflowError::State(format!("invalid workflow options: {e}")))?,
            None => O::default(),
        };
        tracing::debug!(dialog_id = %self.id, "beginning workflow");
        self.run_turn(turn, WorkflowState::new(options), RunMode::Begin)
            .await
    }

    async fn continue_dialog(&self, turn: TurnContext) -> Result<DialogTurnResult, WorkflowError> {
        let state = self.load_state(&turn)?;
        self.run_turn(turn, state, RunMode::Continue).await
    }

    async fn resume_dialog(
        &self,
        turn: TurnContext,
        result: Option<Value>,
    ) -> Result<DialogTurnResult, WorkflowError> {
        let state = self.load_state(&turn)?;
        self.run_turn(turn, state, RunMode::Resume(result)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use turnflow_types::dialog::DialogTurnStatus;

    use crate::test_support::RecordingHost;
    use crate::workflow::context::WorkflowContext;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Greeting {
        name: String,
    }

    async fn greet(ctx: WorkflowContext<Greeting>) -> Result<String, WorkflowError> {
        let name = ctx.options().name.clone();
        ctx.send_activity(format!("hi {name}")).await?;
        let reply = ctx.receive_activity().await?;
        Ok(format!("{name} heard {}", reply.text()))
    }

    fn setup() -> (Arc<RecordingHost>, TurnContext) {
        let host = Arc::new(RecordingHost::default());
        let turn = TurnContext::from_arc(Arc::clone(&host));
        (host, turn)
    }

    #[tokio::test]
    async fn test_begin_saves_state_and_waits() {
        let (host, turn) = setup();
        let dialog = FluentDialog::new("flow", greet);

        let result = dialog
            .begin_dialog(turn, Some(json!({"name": "Ada"})))
            .await
            .unwrap();

        assert_eq!(result.status, DialogTurnStatus::Waiting);
        assert_eq!(host.sent_texts(), vec!["hi Ada"]);
        let saved = host.slot.lock().unwrap().clone().unwrap();
        assert_eq!(saved["options"]["name"], "Ada");
        assert_eq!(saved["history"].as_array().unwrap().len(), 1);
        assert_eq!(saved["resumeState"]["kind"], "ReceiveActivity");
    }

    #[tokio::test]
    async fn test_continue_completes_and_ends_dialog() {
        let (host, turn) = setup();
        let dialog = FluentDialog::new("flow", greet);
        dialog
            .begin_dialog(turn.clone(), Some(json!({"name": "Ada"})))
            .await
            .unwrap();

        host.receive("hello");
        let result = dialog.continue_dialog(turn).await.unwrap();

        assert_eq!(result.status, DialogTurnStatus::Complete);
        assert_eq!(result.result, Some(json!("Ada heard hello")));
        assert_eq!(*host.ended.lock().unwrap(), vec![Some(json!("Ada heard hello"))]);
        assert_eq!(host.sent_texts().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_options_use_default() {
        let (host, turn) = setup();
        let dialog = FluentDialog::new("flow", greet);

        dialog.begin_dialog(turn, None).await.unwrap();

        assert_eq!(host.sent_texts(), vec!["hi "]);
    }

    #[tokio::test]
    async fn test_invalid_options_are_rejected() {
        let (_host, turn) = setup();
        let dialog = FluentDialog::new("flow", greet);

        let err = dialog
            .begin_dialog(turn, Some(json!({"name": 7})))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::State(_)));
    }

    #[tokio::test]
    async fn test_continue_without_state_fails() {
        let (_host, turn) = setup();
        let dialog = FluentDialog::new("flow", greet);

        let err = dialog.continue_dialog(turn).await.unwrap_err();
        assert!(matches!(err, WorkflowError::State(_)));
    }

    #[tokio::test]
    async fn test_nondeterministic_state_is_not_saved() {
        let (host, turn) = setup();
        let dialog = FluentDialog::new("flow", greet);
        dialog
            .begin_dialog(turn.clone(), Some(json!({"name": "Ada"})))
            .await
            .unwrap();

        let mut saved = host.slot.lock().unwrap().clone().unwrap();
        saved["history"][0]["hashedIdentity"] = json!("tampered");
        *host.slot.lock().unwrap() = Some(saved.clone());

        let err = dialog.continue_dialog(turn).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Nondeterminism(_)));
        assert_eq!(host.slot.lock().unwrap().clone(), Some(saved));
    }
}
