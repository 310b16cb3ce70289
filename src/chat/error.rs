//! Chat error types.

use thiserror::Error;

use crate::crypto::{ArithmeticError, SymmetricError};

/// Errors that can occur during chat operations.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Invalid arithmetic request while generating or deriving keys.
    #[error("Arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),

    /// Unparsable or out-of-sequence wire record. The link is closed.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The peer went away or the socket failed.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Payload encryption or decryption failed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] SymmetricError),

    /// Transport error (bind, connect, framing).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid configuration.
    #[error("Config error: {0}")]
    Config(String),
}

impl ChatError {
    /// Shorthand for building a [`ChatError::Protocol`].
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol(reason.into())
    }
}
