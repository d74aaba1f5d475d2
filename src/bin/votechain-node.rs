#![forbid(unsafe_code)]
//! VoteChain ledger node: sync with peers and serve the ledger over HTTP

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use votechain::config::{load_config, CONFIG_ENV_VAR, DEFAULT_CONFIG_PATH};
use votechain::node::{init_logging, Node};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short, env = CONFIG_ENV_VAR, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override `[node] api_port`
    #[arg(long)]
    port: Option<u16>,

    /// Additional peer base URL (repeatable)
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Override `[chain] difficulty`
    #[arg(long)]
    difficulty: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(port) = cli.port {
        config.node.api_port = port;
    }
    if let Some(difficulty) = cli.difficulty {
        config.chain.difficulty = difficulty;
    }
    config.sync.peers.extend(cli.peers);
    config.validate()?;

    init_logging(config.logging.max_level()?)?;
    tracing::info!("Loaded configuration from {}", cli.config.display());

    let node = Arc::new(Node::init(config)?);
    node.start().await?;
    Ok(())
}
