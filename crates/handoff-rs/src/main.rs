//! Run a tree of delegating agents from a TOML config.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # Interactive session driven by agents.toml
//! handoff --config agents.toml
//!
//! # One-shot: a single turn on the primary agent, then wait for delegations
//! handoff --prompt "Draft a release announcement"
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use handoff_rs::config::{DEFAULT_CONFIG_FILE, SessionConfig};
use handoff_rs::prelude::*;
use tracing::info;

/// Run a tree of delegating agents.
#[derive(Parser)]
#[command(name = "handoff", version)]
struct Cli {
    /// Agent tree and session config.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Model for agents that don't name one. Overrides the config file.
    #[arg(long)]
    model: Option<String>,

    /// Run one turn with this input instead of the configured input source.
    #[arg(long)]
    prompt: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let mut config = SessionConfig::load_from(&cli.config).map_err(|e| e.to_string())?;
    if let Some(model) = cli.model {
        config.model = model;
    }

    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "OPENROUTER_KEY environment variable is not set".to_string())?;
    let client = OpenRouterClient::new(api_key)
        .map_err(|e| format!("failed to create API client: {e}"))?;
    let runtime: Arc<dyn AgentRuntime> = Arc::new(
        OpenRouterRuntime::new(client)
            .with_retry(config.runtime.retry())
            .with_max_tokens(config.runtime.max_tokens)
            .with_temperature(config.runtime.temperature),
    );

    match cli.prompt {
        Some(prompt) => {
            let primary = config
                .build_agents(&runtime)
                .into_iter()
                .next()
                .ok_or("no agents configured")?;
            let reply = primary.run_turn(TurnRequest::user(prompt)).await?;
            println!("{reply}");

            // Fold finished delegations in and show the primary's follow-up.
            primary.settled().await;
            if primary.delegation().is_some_and(|d| d.resolved_count() > 0) {
                let follow_up = primary.run_turn(TurnRequest::resume()).await?;
                println!("{follow_up}");
            }
        }
        None => {
            let mut session = config
                .build_session(runtime)
                .map_err(|e| e.to_string())?;
            let report = session.run().await?;
            info!(
                "{} turns, {} failed, {} reviewer notes",
                report.turns, report.failed_turns, report.reviewer_notes
            );
        }
    }
    Ok(())
}
