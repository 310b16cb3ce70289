//! TCP transport for peer links.
//!
//! This provides a TCP-based transport using tokio for async I/O. A
//! connection can be split so one task receives while others send.

use async_trait::async_trait;
use futures::SinkExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream, ToSocketAddrs};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use crate::chat::error::ChatError;
use crate::chat::protocol::Command;
use crate::chat::transport::{read_record, write_record, MessageSink, MessageSource};

/// Receiving half of a TCP connection.
pub struct TcpReceiver {
    lines: FramedRead<OwnedReadHalf, LinesCodec>,
}

#[async_trait]
impl MessageSource for TcpReceiver {
    async fn receive(&mut self) -> Result<Option<Command>, ChatError> {
        read_record(&mut self.lines).await
    }
}

/// Sending half of a TCP connection.
pub struct TcpSender {
    lines: FramedWrite<OwnedWriteHalf, LinesCodec>,
}

#[async_trait]
impl MessageSink for TcpSender {
    async fn send(&mut self, command: &Command) -> Result<(), ChatError> {
        write_record(&mut self.lines, command).await
    }

    async fn close(&mut self) -> Result<(), ChatError> {
        SinkExt::<String>::close(&mut self.lines)
            .await
            .map_err(|e| ChatError::Transport(format!("Failed to close: {}", e)))
    }
}

/// TCP connection wrapper using tokio.
pub struct TcpConnection {
    receiver: TcpReceiver,
    sender: TcpSender,
    peer_addr: String,
}

impl TcpConnection {
    /// Create a new TCP connection from a stream.
    pub fn new(stream: TcpStream, max_record_len: usize) -> Self {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let (read_half, write_half) = stream.into_split();

        Self {
            receiver: TcpReceiver {
                lines: FramedRead::new(read_half, LinesCodec::new_with_max_length(max_record_len)),
            },
            sender: TcpSender {
                lines: FramedWrite::new(write_half, LinesCodec::new()),
            },
            peer_addr,
        }
    }

    /// Connect to a remote address.
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        max_record_len: usize,
    ) -> Result<Self, ChatError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ChatError::Transport(format!("Failed to connect: {}", e)))?;
        Ok(Self::new(stream, max_record_len))
    }

    /// Remote address as reported by the socket.
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Split into independently owned halves.
    pub fn into_split(self) -> (TcpReceiver, TcpSender) {
        (self.receiver, self.sender)
    }
}

/// TCP listener for accepting peer links using tokio.
pub struct TcpListener {
    listener: TokioTcpListener,
    max_record_len: usize,
}

impl TcpListener {
    /// Bind to an address and start listening.
    pub async fn bind<A: ToSocketAddrs>(addr: A, max_record_len: usize) -> Result<Self, ChatError> {
        let listener = TokioTcpListener::bind(addr)
            .await
            .map_err(|e| ChatError::Transport(format!("Failed to bind: {}", e)))?;
        Ok(Self {
            listener,
            max_record_len,
        })
    }

    /// Accept a new connection.
    pub async fn accept(&self) -> Result<TcpConnection, ChatError> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| ChatError::Transport(format!("Failed to accept: {}", e)))?;
        Ok(TcpConnection::new(stream, self.max_record_len))
    }

    /// Get the local address.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ChatError> {
        self.listener
            .local_addr()
            .map_err(|e| ChatError::Transport(format!("Failed to get local addr: {}", e)))
    }
}
