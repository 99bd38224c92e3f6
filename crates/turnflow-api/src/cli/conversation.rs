//! Conversation inspection and reset commands.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::Value;

use turnflow_core::storage::state_store::StateStore;
use turnflow_types::dialog::DialogInstance;
use turnflow_types::workflow::{HistoryEntry, TaskResult, WorkflowState};

use crate::state::AppState;

/// Longest value preview shown in the history table.
const PREVIEW_LEN: usize = 48;

/// Show one conversation, or list all of them when `conversation` is None.
pub async fn inspect(state: &AppState, conversation: Option<&str>, json: bool) -> Result<()> {
    match conversation {
        Some(id) => show_conversation(state, id, json).await,
        None => list_conversations(state, json).await,
    }
}

async fn list_conversations(state: &AppState, json: bool) -> Result<()> {
    let ids = state.store().list().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ids)?);
        return Ok(());
    }

    if ids.is_empty() {
        println!();
        println!(
            "  {} No conversations yet. Start one with: {}",
            style("i").blue().bold(),
            style("tflow chat hello").yellow()
        );
        println!();
        return Ok(());
    }

    println!();
    for id in &ids {
        println!("  {}", style(id).cyan());
    }
    println!();
    println!(
        "  {} conversation{} in {}",
        style(ids.len()).bold(),
        if ids.len() == 1 { "" } else { "s" },
        style(state.store().dir().display()).dim()
    );
    println!();
    Ok(())
}

async fn show_conversation(state: &AppState, id: &str, json: bool) -> Result<()> {
    let saved = state
        .store()
        .load(id)
        .await
        .with_context(|| format!("Failed to load conversation '{id}'"))?
        .with_context(|| format!("Conversation '{id}' not found"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&saved)?);
        return Ok(());
    }

    println!();
    println!("  Conversation '{}'", style(id).cyan().bold());
    if saved.stack.is_empty() {
        println!();
        println!("  {} No active dialogs.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    for (depth, instance) in saved.stack.iter().enumerate() {
        println!();
        println!(
            "  {} {}",
            style(format!("[{depth}]")).dim(),
            style(&instance.id).bold()
        );
        print_instance(instance);
    }
    println!();
    Ok(())
}

fn print_instance(instance: &DialogInstance) {
    // Slots that are not workflow state (e.g. prompt options) are shown raw.
    let Ok(workflow) = serde_json::from_value::<WorkflowState<Value>>(instance.state.clone())
    else {
        println!("      state: {}", preview(&instance.state));
        return;
    };

    println!("      options: {}", preview(&workflow.options));
    match &workflow.resume_state {
        Some(resume) => println!(
            "      waiting on: {}",
            style(&resume.kind).yellow()
        ),
        None => println!("      waiting on: -"),
    }

    if workflow.history.is_empty() {
        println!("      history: empty");
        return;
    }
    println!("{}", history_table(&workflow.history));
}

fn history_table(history: &[HistoryEntry]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#").fg(Color::White),
        Cell::new("Kind").fg(Color::White),
        Cell::new("Identity").fg(Color::White),
        Cell::new("Result").fg(Color::White),
    ]);

    for (index, entry) in history.iter().enumerate() {
        let identity = if entry.hashed_identity.is_empty() {
            "-".to_string()
        } else {
            truncate(&entry.hashed_identity, 12)
        };
        let result = match &entry.result {
            TaskResult::Succeeded(value) => Cell::new(preview(value)).fg(Color::Green),
            TaskResult::Failed(error) | TaskResult::Rejected(error) => {
                Cell::new(truncate(error, PREVIEW_LEN)).fg(Color::Red)
            }
        };
        table.add_row(vec![
            Cell::new(index).fg(Color::DarkGrey),
            Cell::new(truncate(&entry.kind, 32)).fg(Color::Cyan),
            Cell::new(identity).fg(Color::DarkGrey),
            result,
        ]);
    }
    table
}

fn preview(value: &Value) -> String {
    truncate(&value.to_string(), PREVIEW_LEN)
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Delete a conversation's persisted state.
pub async fn reset(state: &AppState, id: &str, json: bool) -> Result<()> {
    state
        .store()
        .delete(id)
        .await
        .with_context(|| format!("Failed to reset conversation '{id}'"))?;

    if json {
        println!("{}", serde_json::json!({ "conversation": id, "reset": true }));
    } else {
        println!();
        println!(
            "  {} Conversation '{}' reset.",
            style("✓").green(),
            style(id).cyan()
        );
        println!();
    }
    Ok(())
}
