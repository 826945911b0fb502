//! Elenchus CLI - adversarial code review orchestration service.
//!
//! The primary mode is `serve`, which speaks MCP (JSON-RPC 2.0) over
//! stdio to a host LLM client. Logging goes to stderr so stdout remains
//! a clean protocol channel.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use elenchus_rs::core::config::ElenchusConfig;
use elenchus_rs::core::engine::SessionEngine;
use elenchus_rs::mcp::schemas::tool_definitions;
use elenchus_rs::mcp::server::McpServer;

#[derive(Parser)]
#[command(
    name = "elenchus",
    version,
    about = "Stateful MCP service for adversarial code review"
)]
struct Cli {
    /// Enable debug logging (stderr)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (YAML)
    #[arg(short, long, global = true, env = "ELENCHUS_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory override
    #[arg(long, global = true, env = "ELENCHUS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP over stdio
    Serve,
    /// Print the default configuration as YAML
    PrintDefaultConfig,
    /// List the advertised tool surface
    ListTools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => ElenchusConfig::from_yaml_file(path)?,
        None => ElenchusConfig::default(),
    };
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = Some(data_dir);
    }

    match cli.command {
        Commands::Serve => {
            let engine = Arc::new(SessionEngine::new(config)?);
            McpServer::new(engine, elenchus_rs::VERSION).run().await?;
        }
        Commands::PrintDefaultConfig => {
            println!("{}", serde_yaml::to_string(&ElenchusConfig::default())?);
        }
        Commands::ListTools => {
            for tool in tool_definitions() {
                println!("{:32} {}", tool.name, tool.description);
            }
        }
    }

    Ok(())
}
