//! One live connection to a ring neighbour.
//!
//! A [`PeerLink`] is a cheap handle: clones share the same socket. Sending
//! locks only this link's writer, so sends on different links never wait on
//! each other. Receiving happens in [`PeerLink::serve`], one task per link.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chat::error::ChatError;
use crate::chat::node::ChatNode;
use crate::chat::protocol::Command;
use crate::chat::transport::{MessageSink, MessageSource};

struct LinkInner {
    id: u64,
    remote_addr: String,
    sender: Mutex<Box<dyn MessageSink>>,
}

/// Handle to one peer connection.
#[derive(Clone)]
pub struct PeerLink {
    inner: Arc<LinkInner>,
}

/// Why a receive loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Cancelled,
    Closed,
}

impl PeerLink {
    pub(crate) fn new(
        id: u64,
        remote_addr: impl Into<String>,
        sender: Box<dyn MessageSink>,
    ) -> Self {
        Self {
            inner: Arc::new(LinkInner {
                id,
                remote_addr: remote_addr.into(),
                sender: Mutex::new(sender),
            }),
        }
    }

    /// Process-unique link id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Dialed address for outbound links, socket address for inbound ones.
    pub fn remote_addr(&self) -> &str {
        &self.inner.remote_addr
    }

    /// Send one command on this link.
    pub async fn send(&self, command: &Command) -> Result<(), ChatError> {
        debug!(link = self.id(), command = command.name(), "send");
        self.inner.sender.lock().await.send(command).await
    }

    async fn close(&self) {
        if let Err(e) = self.inner.sender.lock().await.close().await {
            debug!(link = self.id(), error = %e, "close failed");
        }
    }

    /// Receive loop: decode each record and hand it to the node.
    ///
    /// Ends on end of stream, socket error, protocol error or cancellation.
    /// The socket is shut down on every exit; unless cancelled, the node then
    /// runs its departure handling for this link.
    pub(crate) async fn serve(
        self,
        mut receiver: Box<dyn MessageSource>,
        node: ChatNode,
        shutdown: CancellationToken,
    ) {
        let exit = loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break Exit::Cancelled,
                next = receiver.receive() => next,
            };

            let command = match next {
                Ok(Some(command)) => command,
                Ok(None) => {
                    debug!(link = self.id(), "peer closed the connection");
                    break Exit::Closed;
                }
                Err(e) => {
                    warn!(link = self.id(), error = %e, "receive failed");
                    break Exit::Closed;
                }
            };

            debug!(link = self.id(), command = command.name(), "recv");
            match node.handle(&self, command).await {
                Ok(()) => {}
                Err(e @ (ChatError::Protocol(_) | ChatError::Arithmetic(_))) => {
                    warn!(link = self.id(), error = %e, "closing link");
                    break Exit::Closed;
                }
                Err(e) => warn!(link = self.id(), error = %e, "command failed"),
            }
        };

        self.close().await;
        if exit == Exit::Closed {
            info!(link = self.id(), remote = self.remote_addr(), "link closed");
            node.on_link_closed(&self).await;
        }
    }
}

impl PartialEq for PeerLink {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for PeerLink {}

impl fmt::Debug for PeerLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerLink")
            .field("id", &self.inner.id)
            .field("remote_addr", &self.inner.remote_addr)
            .finish()
    }
}
