//! Transport layer for peer links.
//!
//! This module defines the async sink/source traits a peer link runs on and
//! the newline-delimited record framing every link uses.

mod tcp;

pub use tcp::{TcpConnection, TcpListener, TcpReceiver, TcpSender};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};

use crate::chat::error::ChatError;
use crate::chat::protocol::Command;

/// Default maximum length of one wire record (1 MiB).
pub const DEFAULT_MAX_RECORD_LEN: usize = 1024 * 1024;

/// Sending half of a peer link.
#[async_trait]
pub trait MessageSink: Send {
    /// Send a command.
    async fn send(&mut self, command: &Command) -> Result<(), ChatError>;

    /// Flush and shut down the sending side.
    async fn close(&mut self) -> Result<(), ChatError>;
}

/// Receiving half of a peer link.
#[async_trait]
pub trait MessageSource: Send {
    /// Receive the next command, or `None` once the peer closed the stream.
    async fn receive(&mut self) -> Result<Option<Command>, ChatError>;
}

/// Helper to write one command as a newline-terminated record.
pub async fn write_record<W: AsyncWrite + Unpin>(
    writer: &mut FramedWrite<W, LinesCodec>,
    command: &Command,
) -> Result<(), ChatError> {
    let line = command.encode()?;
    writer.send(line).await.map_err(codec_error)
}

/// Helper to read and decode one newline-terminated record.
///
/// Returns `Ok(None)` on a clean end of stream.
pub async fn read_record<R: AsyncRead + Unpin>(
    reader: &mut FramedRead<R, LinesCodec>,
) -> Result<Option<Command>, ChatError> {
    match reader.next().await {
        None => Ok(None),
        Some(Ok(line)) => Command::decode(&line).map(Some),
        Some(Err(e)) => Err(codec_error(e)),
    }
}

fn codec_error(error: LinesCodecError) -> ChatError {
    match error {
        LinesCodecError::MaxLineLengthExceeded => {
            ChatError::protocol("record exceeds maximum length")
        }
        LinesCodecError::Io(e) => ChatError::ConnectionLost(e.to_string()),
    }
}
