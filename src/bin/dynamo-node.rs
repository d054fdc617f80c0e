//! Runs one ring member: recovers via anti-entropy, serves peers, and reads
//! console commands from stdin.
//!
//! Five local nodes in the conventional layout:
//! ```bash
//! dynamo-node --port 11108 &
//! dynamo-node --port 11112 &
//! dynamo-node --port 11116 &
//! dynamo-node --port 11120 &
//! dynamo-node --port 11124
//! ```

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mini_dynamo::config::DEFAULT_NODE_COUNT;
use mini_dynamo::console::ConsoleCommand;
use mini_dynamo::network::NetworkServer;
use mini_dynamo::{DynamoConfig, DynamoNode, Record};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a mini-dynamo ring member")]
struct Args {
    /// TOML config file; overrides the sequential layout flags
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host all ring members listen on (sequential layout)
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port of the first ring member (sequential layout)
    #[arg(long, default_value_t = 11108)]
    base_port: u16,

    /// Port distance between consecutive members (sequential layout)
    #[arg(long, default_value_t = 4)]
    stride: u16,

    /// Number of ring members (sequential layout)
    #[arg(long, default_value_t = DEFAULT_NODE_COUNT)]
    nodes: usize,

    /// This member's port (sequential layout)
    #[arg(long, default_value_t = 11108)]
    port: u16,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let config = match &args.config {
        Some(path) => DynamoConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            let config = DynamoConfig::sequential(args.host, args.base_port, args.nodes, args.stride, args.port)
                .context("invalid sequential layout")?;
            config.validate().context("invalid sequential layout")?;
            config
        }
    };

    let node = Arc::new(DynamoNode::new(config).context("failed to build node")?);
    let server = NetworkServer::new(Arc::clone(&node));

    // the endpoint is bound only once recovery has finished
    tokio::select! {
        result = server.start() => {
            result.with_context(|| format!("server on {} stopped", node.endpoint()))
        }
        result = run_console(&node) => result,
    }
}

async fn run_console(node: &DynamoNode) -> Result<()> {
    println!("{}", ConsoleCommand::help());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match ConsoleCommand::parse(&line) {
            Ok(ConsoleCommand::Get { key }) => match node.read(&key).await {
                Ok(records) if records.is_empty() => println!("{key} not found"),
                Ok(records) => print_records(records),
                Err(e) => println!("ERROR: {e}"),
            },
            Ok(ConsoleCommand::Put { key, value }) => match node.insert(&key, &value).await {
                Ok(()) => println!("OK"),
                Err(e) => println!("ERROR: {e}"),
            },
            Ok(ConsoleCommand::Delete { key }) => match node.delete(&key).await {
                Ok(affected) => println!("deleted {affected}"),
                Err(e) => println!("ERROR: {e}"),
            },
            Ok(ConsoleCommand::Help) => println!("{}", ConsoleCommand::help()),
            Ok(ConsoleCommand::Exit) => break,
            Err(e) => println!("ERROR: {e}"),
        }
    }

    Ok(())
}

fn print_records(mut records: Vec<Record>) {
    records.sort_by(|a, b| a.key.cmp(&b.key));
    for r in records {
        println!("{} = {} (v{})", r.key, r.value, r.version);
    }
}
