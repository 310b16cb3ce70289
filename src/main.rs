//! Ringchat - serverless encrypted group chat
//!
//! A CLI for joining or starting a peer-to-peer chat group whose members
//! agree a shared key with ring Diffie-Hellman.

mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use commands::{ChatCommand, CommandExecutor};

/// Ringchat - serverless encrypted group chat
///
/// Start a node, optionally join an existing member, then type to chat.
/// Lines starting with `/` are commands: /connect, /rekey, /peers, /quit.
#[derive(Parser)]
#[command(name = "ringchat")]
#[command(version)]
#[command(about = "Serverless P2P group chat with ring Diffie-Hellman key agreement")]
#[command(long_about = None)]
struct Cli {
    /// Log debug details to stderr (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    chat: ChatCommand,
}

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .ok();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    cli.chat.execute()
}
