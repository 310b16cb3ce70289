//! Events the node reports to its presentation layer.

use std::fmt;

/// Something worth showing to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Status line (joins, departures, errors).
    Status(String),
    /// Decrypted chat line.
    Message {
        /// Sender's display name.
        from: String,
        /// Plaintext.
        text: String,
    },
    /// A ring round finished locally and chat is available.
    KeyEstablished {
        /// Members sharing the key, this node included.
        ring_size: usize,
    },
}

impl ChatEvent {
    pub(crate) fn status(text: impl Into<String>) -> Self {
        Self::Status(text.into())
    }
}

impl fmt::Display for ChatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatEvent::Status(text) => write!(f, "{}", text),
            ChatEvent::Message { from, text } => write!(f, "{}: {}", from, text),
            ChatEvent::KeyEstablished { ring_size } => {
                write!(f, "Group key established with {} members", ring_size)
            }
        }
    }
}
