//! Turnflow CLI entry point.
//!
//! Binary name: `tflow`
//!
//! Parses CLI arguments, sets up tracing, wires the sample workflow to the
//! on-disk conversation store, and dispatches to the command handler.

mod cli;
mod sample;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    turnflow_observe::tracing_setup::init_tracing(cli.log_directives(), cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "tflow", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(cli.data_dir.clone()).await?;

    let result = match &cli.command {
        Commands::Chat { text, conversation } => {
            cli::chat::chat(&state, conversation, &text.join(" "), cli.json, cli.quiet).await
        }
        Commands::Inspect { conversation } => {
            cli::conversation::inspect(&state, conversation.as_deref(), cli.json).await
        }
        Commands::Reset { conversation } => {
            cli::conversation::reset(&state, conversation, cli.json).await
        }
        Commands::Completions { .. } => Ok(()),
    };

    turnflow_observe::tracing_setup::shutdown_tracing();
    result
}
