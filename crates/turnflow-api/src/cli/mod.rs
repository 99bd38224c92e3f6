//! CLI command definitions for the `tflow` binary.
//!
//! Each `chat` invocation is one conversation turn: the conversation's dialog
//! stack is loaded from disk, the inbound message is handled, and the stack is
//! saved again before the process exits.

pub mod chat;
pub mod conversation;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Conversation used when `--conversation` is not given.
pub const DEFAULT_CONVERSATION: &str = "local";

/// Drive turn-based replay workflows from the terminal.
#[derive(Parser)]
#[command(name = "tflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Data directory (overrides TURNFLOW_DATA_DIR).
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Export tracing spans to stdout through OpenTelemetry.
    #[arg(long, global = true, hide = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send one message to the sample workflow and print its replies.
    #[command(alias = "say")]
    Chat {
        /// Message text.
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,

        /// Conversation id.
        #[arg(long, short, default_value = DEFAULT_CONVERSATION)]
        conversation: String,
    },

    /// Show a conversation's dialog stack and workflow history, or list
    /// conversations when no id is given.
    #[command(alias = "show")]
    Inspect {
        /// Conversation id.
        #[arg(long, short)]
        conversation: Option<String>,
    },

    /// Delete a conversation's persisted state.
    #[command(alias = "rm")]
    Reset {
        /// Conversation id.
        #[arg(long, short, default_value = DEFAULT_CONVERSATION)]
        conversation: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

impl Cli {
    /// Tracing directives for the selected verbosity.
    pub fn log_directives(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "warn",
            1 => "info,turnflow=debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_chat_joins_words_and_defaults_conversation() {
        let cli = Cli::parse_from(["tflow", "chat", "hello", "there"]);
        match cli.command {
            Commands::Chat { text, conversation } => {
                assert_eq!(text, vec!["hello", "there"]);
                assert_eq!(conversation, DEFAULT_CONVERSATION);
            }
            _ => panic!("expected chat"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["tflow", "inspect", "-c", "c1", "--json", "-vv"]);
        assert!(cli.json);
        assert_eq!(cli.log_directives(), "trace");
        assert!(matches!(
            cli.command,
            Commands::Inspect { conversation: Some(ref id) } if id == "c1"
        ));
    }

    #[test]
    fn test_quiet_lowers_log_level() {
        let cli = Cli::parse_from(["tflow", "--quiet", "reset"]);
        assert_eq!(cli.log_directives(), "error");
    }
}
