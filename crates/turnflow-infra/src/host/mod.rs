//! Dialog-stack host.
//!
//! [`DialogStack`] runs the dialogs registered in a [`DialogSet`] against one
//! conversation at a time. Each call to [`DialogStack::run_turn`] loads the
//! conversation's stack from a [`StateStore`], continues the active dialog (or
//! begins the root dialog when the stack is empty), and saves the stack again.
//! Turns for the same conversation must not run concurrently.

mod turn;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use turnflow_core::dialog::{Dialog, SharedDialog};
use turnflow_core::storage::state_store::StateStore;
use turnflow_core::workflow::WorkflowError;
use turnflow_types::activity::Activity;
use turnflow_types::dialog::DialogTurnStatus;
use turnflow_types::error::HostError;

use self::turn::StackTurn;

// ---------------------------------------------------------------------------
// DialogSet
// ---------------------------------------------------------------------------

/// Registry of dialogs by id.
#[derive(Default)]
pub struct DialogSet {
    dialogs: HashMap<String, SharedDialog>,
}

impl DialogSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dialog under its own id, replacing any previous one.
    pub fn add<D: Dialog + 'static>(mut self, dialog: D) -> Self {
        let id = Dialog::id(&dialog).to_string();
        self.dialogs.insert(id, Arc::new(dialog));
        self
    }

    pub fn find(&self, dialog_id: &str) -> Result<SharedDialog, HostError> {
        self.dialogs
            .get(dialog_id)
            .cloned()
            .ok_or_else(|| HostError::DialogNotFound(dialog_id.to_string()))
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.dialogs.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

// ---------------------------------------------------------------------------
// DialogStack
// ---------------------------------------------------------------------------

/// What one turn produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutput {
    /// Status of the outermost dialog operation.
    pub status: DialogTurnStatus,
    /// The root dialog's result, when it completed this turn.
    pub result: Option<Value>,
    /// Activities sent during the turn, in order.
    pub outbound: Vec<Activity>,
}

impl TurnOutput {
    pub fn texts(&self) -> Vec<&str> {
        self.outbound.iter().map(Activity::text).collect()
    }
}

/// Runs a registered root dialog over persisted conversation stacks.
pub struct DialogStack<S> {
    dialogs: Arc<DialogSet>,
    root: String,
    store: S,
}

impl<S: StateStore> DialogStack<S> {
    pub fn new(dialogs: DialogSet, root: impl Into<String>, store: S) -> Self {
        Self {
            dialogs: Arc::new(dialogs),
            root: root.into(),
            store,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one turn for an inbound activity.
    ///
    /// When the root dialog completes, its result is sent back as a message and
    /// the stack is saved empty, so the next activity starts a new run. On error
    /// nothing is saved: the conversation keeps the state it had before the turn.
    pub async fn run_turn(&self, activity: Activity) -> Result<TurnOutput, WorkflowError> {
        let conversation_id = activity.conversation_id.clone();
        let state = self
            .store
            .load(&conversation_id)
            .await
            .map_err(HostError::from)?
            .unwrap_or_default();

        let turn = StackTurn::new(activity, Arc::clone(&self.dialogs), state);
        let ctx = turn.context()?;
        let outcome = match ctx.active_dialog_id() {
            Some(active) => {
                let dialog = self.dialogs.find(&active)?;
                tracing::debug!(%conversation_id, dialog_id = %active, "continue dialog");
                dialog.continue_dialog_boxed(ctx.clone()).await
            }
            None => ctx.begin_dialog(&self.root, None).await,
        };
        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(%conversation_id, error = %err, "turn failed, state not saved");
                return Err(err);
            }
        };

        if result.status == DialogTurnStatus::Complete && turn.depth() == 0 {
            if let Some(text) = result.result.as_ref().and_then(result_text) {
                ctx.send_activity(text).await?;
            }
        }

        let (state, outbound) = turn.finish();
        self.store
            .save(&conversation_id, &state)
            .await
            .map_err(HostError::from)?;

        tracing::info!(
            %conversation_id,
            status = ?result.status,
            depth = state.stack.len(),
            sent = outbound.len(),
            "turn finished"
        );
        Ok(TurnOutput {
            status: result.status,
            result: result.result,
            outbound,
        })
    }
}

/// Message text for a completed root dialog's result.
fn result_text(result: &Value) -> Option<String> {
    match result {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use turnflow_core::workflow::retry::policy_from_config;
    use turnflow_core::workflow::{FluentDialog, TaskError, WorkflowContext};
    use turnflow_types::dialog::ConversationState;
    use turnflow_types::workflow::{RetryConfig, WorkflowState};

    use crate::prompt::TextPrompt;
    use crate::state::MemoryStateStore;

    fn message(text: &str) -> Activity {
        Activity::message(text).in_conversation("test", "c1")
    }

    async fn stored(stack: &DialogStack<MemoryStateStore>) -> ConversationState {
        stack.store().load("c1").await.unwrap().unwrap_or_default()
    }

    async fn root_state(stack: &DialogStack<MemoryStateStore>) -> WorkflowState<Value> {
        let state = stored(stack).await;
        serde_json::from_value(state.stack[0].state.clone()).unwrap()
    }

    // -------------------------------------------------------------------
    // Suspend / resume
    // -------------------------------------------------------------------

    async fn echo(ctx: WorkflowContext<Value>) -> Result<String, WorkflowError> {
        ctx.send_activity("hi").await?;
        let reply = ctx.receive_activity().await?;
        Ok(format!("got: {}", reply.text()))
    }

    #[tokio::test]
    async fn test_send_receive_round_trip() {
        let dialogs = DialogSet::new().add(FluentDialog::new("echo", echo));
        let stack = DialogStack::new(dialogs, "echo", MemoryStateStore::new());

        let first = stack.run_turn(message("start")).await.unwrap();
        assert_eq!(first.status, DialogTurnStatus::Waiting);
        assert_eq!(first.texts(), vec!["hi"]);
        let state = root_state(&stack).await;
        assert_eq!(state.resume_state.unwrap().kind, "ReceiveActivity");
        assert_eq!(state.history.len(), 1);

        let second = stack.run_turn(message("hello")).await.unwrap();
        assert_eq!(second.status, DialogTurnStatus::Complete);
        assert_eq!(second.result, Some(json!("got: hello")));
        assert_eq!(second.texts(), vec!["got: hello"]);
        assert!(stored(&stack).await.stack.is_empty());
    }

    #[tokio::test]
    async fn test_outbound_activities_are_addressed_to_the_conversation() {
        let dialogs = DialogSet::new().add(FluentDialog::new("echo", echo));
        let stack = DialogStack::new(dialogs, "echo", MemoryStateStore::new());

        let output = stack.run_turn(message("start")).await.unwrap();
        assert_eq!(output.outbound[0].channel_id, "test");
        assert_eq!(output.outbound[0].conversation_id, "c1");

        let state = root_state(&stack).await;
        assert_eq!(
            state.history[0].result,
            turnflow_types::workflow::TaskResult::Succeeded(json!({"id": "c1-1"}))
        );
    }

    async fn greet(ctx: WorkflowContext<Value>) -> Result<String, WorkflowError> {
        let name: String = ctx.prompt("name", "What's your name?", []).await?;
        Ok(format!("Hello {name}"))
    }

    #[tokio::test]
    async fn test_dialog_call_resumes_parent_with_child_result() {
        let dialogs = DialogSet::new()
            .add(FluentDialog::new("greet", greet))
            .add(TextPrompt::new("name"));
        let stack = DialogStack::new(dialogs, "greet", MemoryStateStore::new());

        let first = stack.run_turn(message("hi")).await.unwrap();
        assert_eq!(first.texts(), vec!["What's your name?"]);
        let ids: Vec<String> = stored(&stack).await.stack.into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["greet", "name"]);

        let second = stack.run_turn(message("Ada")).await.unwrap();
        assert_eq!(second.texts(), vec!["Hello Ada"]);
        assert!(stored(&stack).await.stack.is_empty());
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Multiply {
        n: u32,
    }

    async fn times_ten(ctx: WorkflowContext<Multiply>) -> Result<u32, WorkflowError> {
        Ok(ctx.options().n * 10)
    }

    async fn parent(ctx: WorkflowContext<Value>) -> Result<String, WorkflowError> {
        let product: u32 = ctx.call_dialog("times-ten", Some(json!({"n": 2}))).await?;
        Ok(format!("result {product}"))
    }

    #[tokio::test]
    async fn test_child_completing_in_the_same_turn() {
        let dialogs = DialogSet::new()
            .add(FluentDialog::new("parent", parent))
            .add(FluentDialog::new("times-ten", times_ten));
        let stack = DialogStack::new(dialogs, "parent", MemoryStateStore::new());

        let output = stack.run_turn(message("go")).await.unwrap();
        assert_eq!(output.status, DialogTurnStatus::Complete);
        assert_eq!(output.texts(), vec!["result 20"]);
    }

    // -------------------------------------------------------------------
    // Replay
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn test_replay_is_idempotent_and_byte_identical() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let flow = move |ctx: WorkflowContext<Value>| {
            let counter = Arc::clone(&counter);
            async move {
                let first: u32 = ctx
                    .call(move |_turn| {
                        let n = counter.fetch_add(1, Ordering::SeqCst);
                        async move { Ok::<_, TaskError>(n) }
                    })
                    .await?;
                let stamp = ctx.bind(|n: u32| n + 100).call(first)?;
                let reply = ctx.receive_activity().await?;
                ctx.send_activity(format!("{stamp}:{}", reply.text())).await?;
                let again = ctx.receive_activity().await?;
                Ok::<_, WorkflowError>(again.text().to_string())
            }
        };
        let dialogs = DialogSet::new().add(FluentDialog::new("flow", flow));
        let stack = DialogStack::new(dialogs, "flow", MemoryStateStore::new());

        stack.run_turn(message("start")).await.unwrap();
        let before = serde_json::to_string(&root_state(&stack).await.history).unwrap();

        let output = stack.run_turn(message("one")).await.unwrap();
        assert_eq!(output.texts(), vec!["100:one"]);
        let after = root_state(&stack).await;
        let replayed = serde_json::to_string(&after.history[..2]).unwrap();

        assert_eq!(before, replayed);
        assert_eq!(after.history.len(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_determinism_fault_leaves_state_untouched() {
        let dialogs = DialogSet::new().add(FluentDialog::new("echo", echo));
        let stack = DialogStack::new(dialogs, "echo", MemoryStateStore::new());
        stack.run_turn(message("start")).await.unwrap();

        let mut tampered = stored(&stack).await;
        tampered.stack[0].state["history"][0]["kind"] = json!("DialogCall");
        stack.store().save("c1", &tampered).await.unwrap();

        let err = stack.run_turn(message("hello")).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Nondeterminism(_)));
        assert_eq!(stored(&stack).await, tampered);
    }

    // -------------------------------------------------------------------
    // Retry
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn test_default_retry_from_config() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let flow = move |ctx: WorkflowContext<Value>| {
            let counter = Arc::clone(&counter);
            async move {
                let outcome = ctx
                    .call(move |_turn| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        async { Err::<u32, _>(TaskError::failed("always down")) }
                    })
                    .await;
                match outcome {
                    Err(WorkflowError::TaskFailed(message)) => Ok::<_, WorkflowError>(message),
                    other => Ok(format!("unexpected {other:?}")),
                }
            }
        };
        let config = RetryConfig {
            max_attempts: 3,
            ..RetryConfig::default()
        };
        let dialogs = DialogSet::new()
            .add(FluentDialog::new("flow", flow).with_default_retry(policy_from_config(&config)));
        let stack = DialogStack::new(dialogs, "flow", MemoryStateStore::new());

        let output = stack.run_turn(message("go")).await.unwrap();
        assert_eq!(output.texts(), vec!["always down"]);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    // -------------------------------------------------------------------
    // Restart
    // -------------------------------------------------------------------

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Round {
        foo: u32,
    }

    async fn rounds(ctx: WorkflowContext<Round>) -> Result<String, WorkflowError> {
        let foo = ctx.options().foo;
        let reply = ctx.receive_activity().await?;
        if reply.text() == "again" {
            match ctx.restart(Round { foo: foo + 1 }).await? {}
        }
        Ok(format!("done at {foo}"))
    }

    #[tokio::test]
    async fn test_restart_discards_history() {
        let dialogs = DialogSet::new().add(FluentDialog::new("rounds", rounds));
        let stack = DialogStack::new(dialogs, "rounds", MemoryStateStore::new());

        stack.run_turn(message("start")).await.unwrap();
        let output = stack.run_turn(message("again")).await.unwrap();
        assert_eq!(output.status, DialogTurnStatus::Waiting);

        let state = stored(&stack).await;
        assert_eq!(state.stack.len(), 1);
        let restarted: WorkflowState<Value> =
            serde_json::from_value(state.stack[0].state.clone()).unwrap();
        assert!(restarted.history.is_empty());
        assert_eq!(restarted.options["foo"], 1);
        assert_eq!(restarted.resume_state.unwrap().kind, "ReceiveActivity");

        let done = stack.run_turn(message("stop")).await.unwrap();
        assert_eq!(done.texts(), vec!["done at 1"]);
    }

    // -------------------------------------------------------------------
    // Registry
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn test_unknown_root_dialog() {
        let stack = DialogStack::new(DialogSet::new(), "missing", MemoryStateStore::new());
        let err = stack.run_turn(message("hi")).await.unwrap_err();
        assert_eq!(
            err,
            WorkflowError::Host(HostError::DialogNotFound("missing".to_string()))
        );
        assert!(stack.store().is_empty());
    }

    #[test]
    fn test_dialog_set_ids() {
        let dialogs = DialogSet::new()
            .add(TextPrompt::new("b"))
            .add(TextPrompt::new("a"));
        assert_eq!(dialogs.ids(), vec!["a", "b"]);
        assert!(dialogs.find("a").is_ok());
    }

    #[test]
    fn test_result_text() {
        assert_eq!(result_text(&Value::Null), None);
        assert_eq!(result_text(&json!("hi")).as_deref(), Some("hi"));
        assert_eq!(result_text(&json!(42)).as_deref(), Some("42"));
    }
}
