//! codeloop CLI, the main entry point.
//!
//! - `codeloop`: interactive coding session in the current directory
//! - `codeloop -m "<text>"`: run one turn and exit
//! - `codeloop onboard`: write the default config file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod input;
mod terminal;

#[derive(Parser)]
#[command(
    name = "codeloop",
    about = "codeloop: a terminal coding assistant for local LLMs",
    version,
    author
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file to use instead of ~/.codeloop/config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Model server base URL
    #[arg(long, env = "CODELOOP_HOST")]
    pub host: Option<String>,

    /// API key for servers that require one
    #[arg(long, env = "CODELOOP_API_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Model name
    #[arg(long)]
    pub model: Option<String>,

    /// Server kind: auto, vllm, ollama, llama.cpp
    #[arg(long)]
    pub vendor: Option<String>,

    /// Wait for complete responses instead of streaming
    #[arg(long)]
    pub no_stream: bool,

    /// Disable the progress spinner
    #[arg(long)]
    pub no_spinner: bool,

    /// Send a single message instead of entering interactive mode
    #[arg(short, long)]
    pub message: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Onboard,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr and stay quiet by default so they don't interleave with the REPL
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Onboard) => commands::onboard::run(cli.config.as_deref()).await?,
        None => commands::repl::run(&cli).await?,
    }

    Ok(())
}
