//! `tflow chat`: run one conversation turn.

use anyhow::{Context, Result};
use console::style;
use serde_json::json;

use turnflow_types::activity::Activity;
use turnflow_types::dialog::DialogTurnStatus;

use crate::state::AppState;

/// Channel id stamped on activities sent from the terminal.
const CHANNEL_ID: &str = "cli";

/// Deliver `text` to the conversation and print whatever the workflow sent back.
///
/// # Examples
///
/// ```bash
/// tflow chat hello
/// tflow chat -c support-42 "my name is Ada"
/// ```
pub async fn chat(
    state: &AppState,
    conversation: &str,
    text: &str,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let activity = Activity::message(text).in_conversation(CHANNEL_ID, conversation);
    let output = state
        .stack
        .run_turn(activity)
        .await
        .with_context(|| format!("Turn failed for conversation '{conversation}'"))?;

    if json {
        let body = json!({
            "conversation": conversation,
            "status": output.status,
            "result": output.result,
            "outbound": output.outbound,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    if quiet {
        for line in output.texts() {
            println!("{line}");
        }
        return Ok(());
    }

    println!();
    for line in output.texts() {
        println!("  {} {}", style("bot>").cyan().bold(), line);
    }
    if output.status == DialogTurnStatus::Complete {
        println!();
        println!(
            "  {} Workflow finished. The next message starts a new run.",
            style("✓").green()
        );
    }
    println!();
    Ok(())
}
