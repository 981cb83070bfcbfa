//! Research Agent - Entry Point
//!
//! Modes:
//! - `serve`: REST API (default)
//! - `ask <query>`: answer one question and print the outcome as JSON

use clap::{Parser, Subcommand};
use research_agent::{AppState, Config, ResearchRequest};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "research-agent")]
#[command(about = "Reflective research agent with a REST API", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Emit logs as JSON on stderr
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the REST API server
    Serve,
    /// Research a single question
    Ask {
        query: String,

        #[arg(short = 'n', long, default_value_t = 5)]
        max_results: usize,

        /// Continue an existing conversation
        #[arg(short, long)]
        conversation_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let config = Config::from_env()?;
    let state = AppState::from_config(&config)?;
    info!(
        "Research Agent v{} ({} tools)",
        env!("CARGO_PKG_VERSION"),
        state.agent.tools().len()
    );

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            research_agent::api::serve(config.socket_addr(), Arc::new(state)).await?;
        }
        Commands::Ask {
            query,
            max_results,
            conversation_id,
        } => {
            let mut request = ResearchRequest::new(query).with_max_results(max_results);
            if let Some(id) = conversation_id {
                request = request.with_conversation(id);
            }

            let cancel = CancellationToken::new();
            let result = tokio::select! {
                result = state.research(&request, &cancel, None) => result,
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted, cancelling research");
                    cancel.cancel();
                    return Err(research_agent::AgentError::Cancelled.into());
                }
            };

            let (outcome, _) = result?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }

    Ok(())
}
