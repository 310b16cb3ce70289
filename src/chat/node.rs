//! A running chat node.
//!
//! [`ChatNode`] owns the listener, the membership directory and every peer
//! link. Incoming records are dispatched by [`ChatNode::handle`]; state is
//! updated under the directory lock and the resulting sends happen after the
//! lock is released.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chat::config::NodeConfig;
use crate::chat::directory::MembershipDirectory;
use crate::chat::error::ChatError;
use crate::chat::event::ChatEvent;
use crate::chat::nickname::nickname_for_address;
use crate::chat::peer::PeerLink;
use crate::chat::protocol::{Command, PeerInfo, RingStep};
use crate::chat::ring::{self, Dispatch};
use crate::chat::transport::{TcpConnection, TcpListener};

/// Point-in-time view of a node's ring state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingSnapshot {
    /// This node's ring index.
    pub own_index: Option<usize>,
    /// Every member, this node included, ordered by index.
    pub members: Vec<PeerInfo>,
    /// Short SHA-256 fingerprint of the group secret, if one is established.
    pub key_fingerprint: Option<String>,
}

struct NodeInner {
    config: NodeConfig,
    listen_addr: String,
    directory: Mutex<MembershipDirectory<PeerLink>>,
    events: mpsc::UnboundedSender<ChatEvent>,
    shutdown: CancellationToken,
    next_link_id: AtomicU64,
}

/// Handle to a running node. Clones share the same node.
#[derive(Clone)]
pub struct ChatNode {
    inner: Arc<NodeInner>,
}

impl ChatNode {
    /// Bind the listener and start accepting peer links.
    ///
    /// Returns the node and the stream of events for the presentation layer.
    pub async fn start(
        config: NodeConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ChatEvent>), ChatError> {
        config.validate()?;
        let listener = TcpListener::bind(config.listen_addr.as_str(), config.max_record_len).await?;
        let listen_addr = listener.local_addr()?.to_string();
        let (events, receiver) = mpsc::unbounded_channel();

        let node = Self {
            inner: Arc::new(NodeInner {
                config,
                listen_addr,
                directory: Mutex::new(MembershipDirectory::new()),
                events,
                shutdown: CancellationToken::new(),
                next_link_id: AtomicU64::new(0),
            }),
        };

        info!(listen_addr = %node.listen_addr(), "node listening");
        node.emit(ChatEvent::status(format!(
            "You are {}",
            nickname_for_address(node.listen_addr())
        )));
        node.emit(ChatEvent::status("Please enter address of a peer..."));

        tokio::spawn(node.clone().accept_loop(listener));
        Ok((node, receiver))
    }

    /// Address this node listens on and advertises to peers.
    pub fn listen_addr(&self) -> &str {
        &self.inner.listen_addr
    }

    /// Dial a member of an existing ring and ask to join it.
    ///
    /// A node that already has a ring index only opens the link.
    pub async fn connect(&self, address: &str) -> Result<(), ChatError> {
        let link = self.open_link(address).await?;
        if self.inner.directory.lock().await.own_index().is_none() {
            link.send(&Command::ListPeers).await?;
        }
        Ok(())
    }

    /// Encrypt `text` under the group secret and send it to every member.
    ///
    /// Does nothing until a group secret is established.
    pub async fn send_message(&self, text: &str) -> Result<(), ChatError> {
        let (ciphertext, links) = {
            let directory = self.inner.directory.lock().await;
            let (Some(secret), Some(_)) = (directory.group_secret(), directory.own_index()) else {
                debug!("no group secret yet, message not sent");
                return Ok(());
            };
            let links: Vec<PeerLink> = directory.links().cloned().collect();
            (secret.encrypt(text.as_bytes())?, links)
        };

        let payload = Command::ChatPayload {
            base64_message: BASE64.encode(ciphertext),
        };
        for link in &links {
            if let Err(e) = link.send(&payload).await {
                warn!(link = link.id(), error = %e, "failed to deliver chat payload");
            }
        }

        self.emit(ChatEvent::Message {
            from: "You".to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    /// Start a fresh ring round from this node.
    pub async fn rekey(&self) -> Result<(), ChatError> {
        let dispatch = {
            let mut directory = self.inner.directory.lock().await;
            if directory.own_index().is_none() {
                self.emit(ChatEvent::status("Not connected to a ring"));
                return Ok(());
            }
            if directory.ring_size() < 2 {
                self.emit(ChatEvent::status("Nobody to agree a key with"));
                return Ok(());
            }
            ring::start_round(
                &mut *directory,
                self.inner.config.prime_bits,
                self.inner.config.primality_rounds,
            )?
        };
        self.dispatch(dispatch).await
    }

    /// Current ring state.
    pub async fn snapshot(&self) -> RingSnapshot {
        let directory = self.inner.directory.lock().await;
        RingSnapshot {
            own_index: directory.own_index(),
            members: directory.roster(self.listen_addr()),
            key_fingerprint: directory.group_secret().map(|secret| {
                let digest = Sha256::digest(secret.value().to_bytes_be());
                digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
            }),
        }
    }

    /// Stop accepting and close every link.
    pub fn shutdown(&self) {
        info!("shutting down node");
        self.inner.shutdown.cancel();
    }

    /// Handle one record received on `link`.
    pub(crate) async fn handle(&self, link: &PeerLink, command: Command) -> Result<(), ChatError> {
        match command {
            Command::ListPeers => self.on_list_peers(link).await,
            Command::HereAreThePeers {
                peers,
                your_index,
                my_index,
            } => self.on_peer_list(link, peers, your_index, my_index).await,
            Command::JoinRequest {
                my_index,
                my_ip_address,
            } => self.on_join_request(link, my_index, my_ip_address).await,
            Command::JoinAccepted { my_index } => self.on_join_accepted(link, my_index).await,
            Command::RingStep(step) => self.on_ring_step(step).await,
            Command::ChatPayload { base64_message } => {
                self.on_chat_payload(link, &base64_message).await
            }
        }
    }

    /// Departure handling after a link's receive loop ended.
    pub(crate) async fn on_link_closed(&self, link: &PeerLink) {
        let removed = self.inner.directory.lock().await.remove_link(link);
        if let Some(slot) = removed {
            info!(index = slot.index, address = %slot.address, "member left");
            self.emit(ChatEvent::status(format!(
                "{} left the conversation",
                nickname_for_address(&slot.address)
            )));
        }
    }

    async fn on_list_peers(&self, link: &PeerLink) -> Result<(), ChatError> {
        let reply = {
            let mut directory = self.inner.directory.lock().await;
            let my_index = directory.bootstrap();
            Command::HereAreThePeers {
                peers: directory.roster(self.listen_addr()),
                your_index: directory.ring_size(),
                my_index,
            }
        };
        link.send(&reply).await
    }

    async fn on_peer_list(
        &self,
        link: &PeerLink,
        peers: Vec<PeerInfo>,
        your_index: usize,
        my_index: usize,
    ) -> Result<(), ChatError> {
        if peers.iter().any(|peer| peer.index == your_index) {
            return Err(ChatError::protocol(format!(
                "proposed index {} is already taken",
                your_index
            )));
        }
        {
            let mut directory = self.inner.directory.lock().await;
            if directory.own_index().is_some() {
                return Err(ChatError::protocol("peer list received after joining"));
            }
            directory.set_own_index(your_index);
        }
        info!(own_index = your_index, members = peers.len(), "joining ring");

        let request = Command::JoinRequest {
            my_index: your_index,
            my_ip_address: self.listen_addr().to_string(),
        };
        for peer in &peers {
            let target = if peer.index == my_index {
                link.clone()
            } else {
                self.open_link(&peer.ip_address).await?
            };
            self.inner
                .directory
                .lock()
                .await
                .await_acceptance(target.clone(), peer.ip_address.clone());
            target.send(&request).await?;
        }

        let names: Vec<String> = peers
            .iter()
            .map(|peer| nickname_for_address(&peer.ip_address))
            .collect();
        self.emit(ChatEvent::status(format!(
            "You connected to {}",
            names.join(", ")
        )));
        Ok(())
    }

    async fn on_join_request(
        &self,
        link: &PeerLink,
        index: usize,
        address: String,
    ) -> Result<(), ChatError> {
        let reply = {
            let mut directory = self.inner.directory.lock().await;
            let own = directory
                .own_index()
                .ok_or_else(|| ChatError::protocol("join request received before having an index"))?;
            directory.admit(index, address.clone(), link.clone());
            Command::JoinAccepted { my_index: own }
        };
        link.send(&reply).await?;

        info!(index, address = %address, "member joined");
        self.emit(ChatEvent::status(format!(
            "{} has joined the chat",
            nickname_for_address(&address)
        )));
        Ok(())
    }

    async fn on_join_accepted(&self, link: &PeerLink, index: usize) -> Result<(), ChatError> {
        let dispatch = {
            let mut directory = self.inner.directory.lock().await;
            if !directory.accept_pending(link, index) {
                return Err(ChatError::protocol("join accepted on a link with no pending join"));
            }
            if directory.is_fully_connected() {
                ring::start_round(
                    &mut *directory,
                    self.inner.config.prime_bits,
                    self.inner.config.primality_rounds,
                )?
            } else {
                Dispatch::Idle
            }
        };
        self.dispatch(dispatch).await
    }

    async fn on_ring_step(&self, step: RingStep) -> Result<(), ChatError> {
        let (outcome, ring_size) = {
            let mut directory = self.inner.directory.lock().await;
            let outcome = ring::advance(&mut *directory, step)?;
            (outcome, directory.ring_size())
        };
        if outcome.established {
            info!(ring_size, "group key established");
            self.emit(ChatEvent::KeyEstablished { ring_size });
        }
        self.dispatch(outcome.dispatch).await
    }

    async fn on_chat_payload(&self, link: &PeerLink, base64_message: &str) -> Result<(), ChatError> {
        let (secret, sender) = {
            let directory = self.inner.directory.lock().await;
            let sender = directory
                .slots()
                .iter()
                .find(|slot| &slot.link == link)
                .map(|slot| slot.address.clone())
                .unwrap_or_else(|| link.remote_addr().to_string());
            (directory.group_secret().cloned(), sender)
        };
        let Some(secret) = secret else {
            debug!(link = link.id(), "chat payload before key agreement, dropped");
            return Ok(());
        };

        let ciphertext = BASE64
            .decode(base64_message)
            .map_err(|e| ChatError::protocol(format!("invalid base64 payload: {}", e)))?;
        match secret.decrypt(&ciphertext) {
            Ok(plaintext) => self.emit(ChatEvent::Message {
                from: nickname_for_address(&sender),
                text: String::from_utf8_lossy(&plaintext).into_owned(),
            }),
            Err(e) => warn!(link = link.id(), error = %e, "undecryptable chat payload dropped"),
        }
        Ok(())
    }

    async fn dispatch(&self, dispatch: Dispatch<PeerLink>) -> Result<(), ChatError> {
        match dispatch {
            Dispatch::Send(outgoing) => outgoing.link.send(&outgoing.command).await,
            Dispatch::Stalled { successor } => {
                warn!(successor, "no link to ring successor, round stalled");
                Ok(())
            }
            Dispatch::Idle => Ok(()),
        }
    }

    async fn open_link(&self, address: &str) -> Result<PeerLink, ChatError> {
        let connection = TcpConnection::connect(address, self.inner.config.max_record_len).await?;
        debug!(address, "dialed peer");
        Ok(self.attach(connection, address.to_string()))
    }

    fn attach(&self, connection: TcpConnection, remote_addr: String) -> PeerLink {
        let id = self.inner.next_link_id.fetch_add(1, Ordering::Relaxed);
        let (receiver, sender) = connection.into_split();
        let link = PeerLink::new(id, remote_addr, Box::new(sender));
        tokio::spawn(link.clone().serve(
            Box::new(receiver),
            self.clone(),
            self.inner.shutdown.child_token(),
        ));
        link
    }

    async fn accept_loop(self, listener: TcpListener) {
        loop {
            let accepted = tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok(connection) => {
                    let remote = connection.peer_addr().to_string();
                    debug!(remote = %remote, "accepted peer link");
                    self.attach(connection, remote);
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
        debug!("accept loop stopped");
    }

    fn emit(&self, event: ChatEvent) {
        if self.inner.events.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> NodeConfig {
        NodeConfig::new("127.0.0.1:0").with_prime_bits(48)
    }

    #[tokio::test]
    async fn test_start_reports_identity() {
        let (node, mut events) = ChatNode::start(test_config()).await.unwrap();
        assert!(!node.listen_addr().ends_with(":0"));

        let first = events.recv().await.unwrap();
        assert_eq!(
            first,
            ChatEvent::status(format!("You are {}", nickname_for_address(node.listen_addr())))
        );
        node.shutdown();
    }

    #[tokio::test]
    async fn test_unjoined_node_does_not_send() {
        let (node, _events) = ChatNode::start(test_config()).await.unwrap();
        node.send_message("hello").await.unwrap();

        let snapshot = node.snapshot().await;
        assert_eq!(snapshot.own_index, None);
        assert!(snapshot.members.is_empty());
        assert_eq!(snapshot.key_fingerprint, None);
        node.shutdown();
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let config = NodeConfig::new("127.0.0.1:0").with_prime_bits(4);
        assert!(matches!(ChatNode::start(config).await, Err(ChatError::Config(_))));
    }
}
