//! Chat protocol types.
//!
//! Six commands drive the whole system:
//!
//! - **Join handshake**: `list peers`, `here are the peers`,
//!   `add to me to peers list`, `ok you're in`
//! - **Ring key agreement**: `calculate dh`
//! - **Payload**: `chat message`

mod command;

pub use command::{Command, PeerInfo, RingStep};
