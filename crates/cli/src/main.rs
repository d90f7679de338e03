//! threadbot CLI — the main entry point.
//!
//! Commands:
//! - `run`     — Connect to Slack over Socket Mode and answer messages
//! - `ask`     — Answer a single message on stdout
//! - `tools`   — Print the tool schemas sent to the model
//! - `doctor`  — Diagnose configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "threadbot",
    about = "threadbot — a Slack assistant backed by a streaming LLM",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Config file (defaults to ~/.threadbot/config.toml)
    #[arg(short, long, global = true, env = "THREADBOT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Slack bot
    Run,

    /// Ask a single question and stream the answer to stdout
    Ask {
        /// The message to send
        #[arg(short, long)]
        message: String,
    },

    /// Print the registered tools
    Tools,

    /// Diagnose configuration
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Run => commands::run::run(config_path).await?,
        Commands::Ask { message } => commands::ask::run(config_path, message).await?,
        Commands::Tools => commands::tools::run(config_path).await?,
        Commands::Doctor => commands::doctor::run(config_path).await?,
    }

    Ok(())
}
