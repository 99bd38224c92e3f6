//! The bundled sample workflow.
//!
//! Greets the user, asks for a name, hands out a ticket id, then waits for
//! one more message. Replying "again" restarts the workflow with the round
//! counter bumped; anything else ends it.

use serde::{Deserialize, Serialize};

use turnflow_core::workflow::retry::policy_from_config;
use turnflow_core::workflow::{FluentDialog, WorkflowContext, WorkflowError};
use turnflow_infra::host::DialogSet;
use turnflow_infra::prompt::TextPrompt;
use turnflow_types::config::EngineConfig;

pub const ROOT_DIALOG: &str = "greeting";
pub const NAME_PROMPT: &str = "name-prompt";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GreetingOptions {
    #[serde(default)]
    pub round: u32,
}

pub async fn greeting(ctx: WorkflowContext<GreetingOptions>) -> Result<String, WorkflowError> {
    let round = ctx.options().round;
    let started = ctx.current_utc_time()?;
    if !ctx.is_replaying() {
        tracing::info!(round, channel = %ctx.channel_id(), "greeting started");
    }

    ctx.send_activity(format!(
        "Welcome! This is round {round}, started at {}.",
        started.format("%H:%M:%S UTC")
    ))
    .await?;

    let name: String = ctx.prompt(NAME_PROMPT, "What's your name?", []).await?;
    let ticket = ctx.new_guid()?;
    ctx.send_activity(format!("Nice to meet you, {name}. Your ticket is {ticket}."))
        .await?;
    ctx.send_activity("Say anything to finish, or \"again\" to start over.")
        .await?;

    let reply = ctx.receive_activity().await?;
    if reply.text().trim().eq_ignore_ascii_case("again") {
        match ctx.restart(GreetingOptions { round: round + 1 }).await? {}
    }
    Ok(format!("Goodbye, {name}!"))
}

/// Dialogs the CLI registers: the greeting workflow and its name prompt.
pub fn dialogs(config: &EngineConfig) -> DialogSet {
    DialogSet::new()
        .add(
            FluentDialog::new(ROOT_DIALOG, greeting)
                .with_default_retry(policy_from_config(&config.default_retry)),
        )
        .add(TextPrompt::new(NAME_PROMPT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use turnflow_core::storage::state_store::StateStore;
    use turnflow_infra::host::DialogStack;
    use turnflow_infra::state::MemoryStateStore;
    use turnflow_types::activity::Activity;
    use turnflow_types::dialog::DialogTurnStatus;
    use turnflow_types::workflow::WorkflowState;

    fn message(text: &str) -> Activity {
        Activity::message(text).in_conversation("cli", "local")
    }

    fn host() -> DialogStack<MemoryStateStore> {
        DialogStack::new(
            dialogs(&EngineConfig::default()),
            ROOT_DIALOG,
            MemoryStateStore::new(),
        )
    }

    #[tokio::test]
    async fn test_full_conversation() {
        let stack = host();

        let first = stack.run_turn(message("hi")).await.unwrap();
        let texts = first.texts();
        assert!(texts[0].starts_with("Welcome! This is round 0"));
        assert_eq!(texts[1], "What's your name?");

        let second = stack.run_turn(message("Ada")).await.unwrap();
        let texts = second.texts();
        assert!(texts[0].starts_with("Nice to meet you, Ada. Your ticket is "));
        assert_eq!(texts.len(), 2);

        let third = stack.run_turn(message("bye")).await.unwrap();
        assert_eq!(third.status, DialogTurnStatus::Complete);
        assert_eq!(third.texts(), vec!["Goodbye, Ada!"]);
    }

    #[tokio::test]
    async fn test_again_restarts_with_next_round() {
        let stack = host();
        stack.run_turn(message("hi")).await.unwrap();
        stack.run_turn(message("Ada")).await.unwrap();

        let restarted = stack.run_turn(message("again")).await.unwrap();
        let texts = restarted.texts();
        assert!(texts[0].starts_with("Welcome! This is round 1"));
        assert_eq!(texts[1], "What's your name?");

        let saved = stack.store().load("local").await.unwrap().unwrap();
        let root: WorkflowState<Value> = serde_json::from_value(saved.stack[0].state.clone()).unwrap();
        assert_eq!(root.options["round"], 1);
        assert_eq!(root.history[0].kind, "currentUtcTime");
    }
}
