//! Per-node view of the ring membership.
//!
//! The directory holds the ordered peer slots, this node's own index and the
//! Diffie-Hellman state of the current round. It is generic over the link
//! handle so the join and ring logic can run without sockets.
//!
//! Invariant: `own_index` together with every slot index is a permutation of
//! `0..N` where `N = slots.len() + 1`, once the node is fully joined.

use crate::chat::protocol::PeerInfo;
use crate::crypto::DhKey;

/// One connected ring member.
#[derive(Debug, Clone)]
pub struct PeerSlot<L> {
    /// Ring position.
    pub index: usize,
    /// Listen address, `host:port`.
    pub address: String,
    /// Link used to reach this member.
    pub link: L,
}

/// Shared membership and key state of one node.
#[derive(Debug)]
pub struct MembershipDirectory<L> {
    own_index: Option<usize>,
    slots: Vec<PeerSlot<L>>,
    awaiting: Vec<(L, String)>,
    individual_secret: Option<DhKey>,
    group_secret: Option<DhKey>,
}

impl<L> Default for MembershipDirectory<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L> MembershipDirectory<L> {
    /// Create an empty directory for an unjoined node.
    pub fn new() -> Self {
        Self {
            own_index: None,
            slots: Vec::new(),
            awaiting: Vec::new(),
            individual_secret: None,
            group_secret: None,
        }
    }

    /// This node's ring index, if assigned.
    pub fn own_index(&self) -> Option<usize> {
        self.own_index
    }

    /// Assign this node's ring index.
    pub fn set_own_index(&mut self, index: usize) {
        self.own_index = Some(index);
    }

    /// Assign index 0 if this node has none yet, returning the index.
    ///
    /// The first member asked for a roster bootstraps the ring.
    pub fn bootstrap(&mut self) -> usize {
        *self.own_index.get_or_insert(0)
    }

    /// Connected slots in insertion order.
    pub fn slots(&self) -> &[PeerSlot<L>] {
        &self.slots
    }

    /// Number of ring members, this node included.
    pub fn ring_size(&self) -> usize {
        self.slots.len() + 1
    }

    /// True once this node holds a slot for every lower index.
    pub fn is_fully_connected(&self) -> bool {
        self.own_index == Some(self.slots.len())
    }

    /// Index of the ring successor.
    pub fn next_index(&self) -> Option<usize> {
        let n = self.ring_size();
        self.own_index.map(|own| (own + 1) % n)
    }

    /// Index of the ring predecessor.
    pub fn previous_index(&self) -> Option<usize> {
        let n = self.ring_size();
        self.own_index.map(|own| (own + n - 1) % n)
    }

    /// Link of the member at `index`.
    pub fn link_at(&self, index: usize) -> Option<&L> {
        self.slots
            .iter()
            .find(|slot| slot.index == index)
            .map(|slot| &slot.link)
    }

    /// Every held link.
    pub fn links(&self) -> impl Iterator<Item = &L> {
        self.slots.iter().map(|slot| &slot.link)
    }

    /// Roster of every member, this node included, ordered by index.
    pub fn roster(&self, own_address: &str) -> Vec<PeerInfo> {
        let mut peers: Vec<PeerInfo> = self
            .slots
            .iter()
            .map(|slot| PeerInfo::new(slot.index, slot.address.clone()))
            .collect();
        if let Some(own) = self.own_index {
            peers.push(PeerInfo::new(own, own_address));
        }
        peers.sort_by_key(|peer| peer.index);
        peers
    }

    /// Record a new member. Any negotiated key becomes stale.
    pub fn admit(&mut self, index: usize, address: impl Into<String>, link: L) {
        self.slots.push(PeerSlot {
            index,
            address: address.into(),
            link,
        });
        self.clear_secrets();
    }

    /// Remember that a join request went out on `link` to the member listening
    /// at `address`.
    pub fn await_acceptance(&mut self, link: L, address: impl Into<String>) {
        self.awaiting.push((link, address.into()));
    }

    /// Admit the member that accepted our join on `link` at `index`.
    ///
    /// The slot takes the address the roster advertised for that member.
    /// Returns false if no join request is pending on `link`.
    pub fn accept_pending(&mut self, link: &L, index: usize) -> bool
    where
        L: PartialEq,
    {
        let Some(position) = self.awaiting.iter().position(|(held, _)| held == link) else {
            return false;
        };
        let (link, address) = self.awaiting.remove(position);
        self.admit(index, address, link);
        true
    }

    /// Remove the slot holding `link` and close the gap in the numbering.
    ///
    /// Every slot above the departed index, and `own_index` if above it, moves
    /// down by one. Returns the removed slot.
    pub fn remove_link(&mut self, link: &L) -> Option<PeerSlot<L>>
    where
        L: PartialEq,
    {
        self.awaiting.retain(|(held, _)| held != link);
        let position = self.slots.iter().position(|slot| &slot.link == link)?;
        let removed = self.slots.remove(position);

        for slot in self.slots.iter_mut() {
            if slot.index > removed.index {
                slot.index -= 1;
            }
        }
        if let Some(own) = self.own_index.as_mut() {
            if *own > removed.index {
                *own -= 1;
            }
        }
        self.clear_secrets();

        Some(removed)
    }

    /// Individual secret of the current round.
    pub fn individual_secret(&self) -> Option<&DhKey> {
        self.individual_secret.as_ref()
    }

    /// Start a new round with a fresh individual secret.
    ///
    /// The previous round's group secret is dropped.
    pub fn begin_round(&mut self, secret: DhKey) {
        self.individual_secret = Some(secret);
        self.group_secret = None;
    }

    /// Negotiated group secret, present only after a completed round.
    pub fn group_secret(&self) -> Option<&DhKey> {
        self.group_secret.as_ref()
    }

    /// Store the final value of a round.
    pub fn set_group_secret(&mut self, secret: DhKey) {
        self.group_secret = Some(secret);
    }

    fn clear_secrets(&mut self) {
        self.individual_secret = None;
        self.group_secret = None;
    }
}
