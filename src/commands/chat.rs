//! Interactive chat session on stdin/stdout.
//!
//! ## Input
//!
//! - `/connect <addr>` - Join the ring of the member at `addr`
//! - `/rekey` - Start a fresh key agreement round
//! - `/peers` - Show ring members and the key fingerprint
//! - `/quit` - Leave the chat
//! - anything else - Send as chat text

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use ringchat::chat::{nickname_for_address, ChatNode, NodeConfig, RingSnapshot};

use super::CommandExecutor;

/// Join or start a group chat.
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Address to listen on (overrides the config file)
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Path to config file (default: <config_dir>/ringchat/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Member to join right after start-up
    #[arg(long)]
    pub connect: Option<String>,
}

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Connect(String),
    Rekey,
    Peers,
    Quit,
    Text(String),
    Empty,
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if !line.starts_with('/') {
        return Input::Text(line.to_string());
    }

    let (command, argument) = match line.split_once(char::is_whitespace) {
        Some((command, argument)) => (command, argument.trim()),
        None => (line, ""),
    };
    match command {
        "/connect" if !argument.is_empty() => Input::Connect(argument.to_string()),
        "/rekey" => Input::Rekey,
        "/peers" => Input::Peers,
        "/quit" | "/exit" => Input::Quit,
        _ => Input::Unknown(line.to_string()),
    }
}

impl CommandExecutor for ChatCommand {
    fn execute(&self) -> Result<()> {
        let config = self.load_config()?;
        let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
        rt.block_on(self.run(config))
    }
}

impl ChatCommand {
    fn load_config(&self) -> Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => NodeConfig::load_or_default().context("Failed to load default config")?,
        };
        if let Some(listen) = &self.listen {
            config.listen_addr = listen.clone();
        }
        if config.listen_addr.trim().is_empty() {
            bail!("Listen address must not be empty");
        }
        Ok(config)
    }

    async fn run(&self, config: NodeConfig) -> Result<()> {
        let (node, mut events) = ChatNode::start(config)
            .await
            .context("Failed to start chat node")?;

        if let Some(address) = &self.connect {
            connect(&node, address).await;
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => println!("{}", event),
                    None => break,
                },
                line = lines.next_line() => {
                    let Some(line) = line.context("Failed to read stdin")? else {
                        break;
                    };
                    match parse_input(&line) {
                        Input::Connect(address) => connect(&node, &address).await,
                        Input::Rekey => {
                            if let Err(e) = node.rekey().await {
                                println!("Rekey failed: {}", e);
                            }
                        }
                        Input::Peers => print_snapshot(&node.snapshot().await),
                        Input::Quit => break,
                        Input::Text(text) => {
                            if let Err(e) = node.send_message(&text).await {
                                println!("Send failed: {}", e);
                            }
                        }
                        Input::Empty => {}
                        Input::Unknown(command) => {
                            println!("Unknown command: {}", command);
                            println!("Commands: /connect <addr>, /rekey, /peers, /quit");
                        }
                    }
                }
            }
        }

        debug!("leaving chat");
        node.shutdown();
        Ok(())
    }
}

async fn connect(node: &ChatNode, address: &str) {
    if let Err(e) = node.connect(address).await {
        println!("Could not connect to {}: {}", address, e);
    }
}

fn print_snapshot(snapshot: &RingSnapshot) {
    match snapshot.own_index {
        Some(own) => println!("Ring of {} (you are #{})", snapshot.members.len(), own),
        None => {
            println!("Not connected to a ring");
            return;
        }
    }
    for member in &snapshot.members {
        println!(
            "  #{} {} ({})",
            member.index,
            nickname_for_address(&member.ip_address),
            member.ip_address
        );
    }
    match &snapshot.key_fingerprint {
        Some(fingerprint) => println!("Group key: {}", fingerprint),
        None => println!("Group key: not established"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_input("/connect 127.0.0.1:8090"),
            Input::Connect("127.0.0.1:8090".to_string())
        );
        assert_eq!(parse_input("  /rekey "), Input::Rekey);
        assert_eq!(parse_input("/peers"), Input::Peers);
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("/exit"), Input::Quit);
    }

    #[test]
    fn test_parse_text_and_blank() {
        assert_eq!(parse_input("hello there"), Input::Text("hello there".to_string()));
        assert_eq!(parse_input("   "), Input::Empty);
    }

    #[test]
    fn test_parse_unknown_and_incomplete() {
        assert_eq!(parse_input("/connect"), Input::Unknown("/connect".to_string()));
        assert_eq!(parse_input("/dance"), Input::Unknown("/dance".to_string()));
    }
}
