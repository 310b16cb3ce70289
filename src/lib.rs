//! # Ringchat - serverless encrypted group chat
//!
//! Ringchat connects every member of a chat group directly over TCP and
//! agrees a shared group key with a ring-based multi-party Diffie-Hellman
//! exchange. There is no server: any member can admit newcomers.
//!
//! ## Overview
//!
//! - A newcomer asks any member for the **roster** and receives its ring index
//! - It dials every listed member and asks to be **admitted**
//! - The member holding the highest index starts a **ring round**
//! - After `N` chains of `N - 1` hops every member holds the same secret
//! - Chat text is **encrypted** under that secret and sent to every member
//!
//! ## Example Usage
//!
//! ```no_run
//! use ringchat::chat::{ChatNode, NodeConfig};
//!
//! # async fn run() -> Result<(), ringchat::chat::ChatError> {
//! let (node, mut events) = ChatNode::start(NodeConfig::new("127.0.0.1:8091")).await?;
//! node.connect("127.0.0.1:8090").await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{}", event);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`crypto`]: Big-integer arithmetic, Diffie-Hellman keys, payload encryption
//! - [`chat`]: Wire protocol, membership directory, ring protocol, running node

pub mod chat;
pub mod crypto;

pub use chat::{ChatError, ChatEvent, ChatNode, NodeConfig};
pub use crypto::DhKey;
