//! # Ringchat Chat Module
//!
//! Serverless group chat over direct TCP links between every pair of members.
//!
//! Members join by asking any existing member for the roster, then dialing
//! everyone on it. Once a member holds a link to every lower index it starts
//! a ring key agreement; every member ends up with the same group secret and
//! chat payloads are encrypted under it.
//!
//! ## Security Model
//!
//! - **Group secret** agreed with ring Diffie-Hellman over a fresh safe prime
//! - **Payloads** sealed with ChaCha20-Poly1305 under a key derived via HKDF
//! - **Membership changes** discard the group secret until the next round
//! - **No authentication** of members: anyone who can reach a member can join

pub mod config;
pub mod directory;
mod error;
pub mod event;
pub mod nickname;
mod node;
mod peer;
pub mod protocol;
pub mod ring;
pub mod transport;

pub use config::NodeConfig;
pub use directory::{MembershipDirectory, PeerSlot};
pub use error::ChatError;
pub use event::ChatEvent;
pub use nickname::{nickname, nickname_for_address};
pub use node::{ChatNode, RingSnapshot};
pub use peer::PeerLink;
pub use protocol::{Command, PeerInfo, RingStep};
