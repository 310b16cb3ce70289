//! Ring-based group Diffie-Hellman (Ingemarsson style).
//!
//! Every member raises the value it receives to its own private exponent and
//! hands the result to its ring successor. A chain addressed to member `i`
//! starts at `i + 1` and ends at `i`, so by the time it arrives every other
//! member has applied its exponent once and `i` applies its own last. Each
//! member that receives its final value starts the next chain with its own
//! public value, addressed to its predecessor. After `N` chains every member
//! holds `g^(a0 * a1 * ... * a(N-1)) mod p`.
//!
//! The functions here only mutate the directory and return the command to
//! send; the caller does the I/O after releasing the directory lock.

use tracing::debug;

use crate::chat::directory::MembershipDirectory;
use crate::chat::error::ChatError;
use crate::chat::protocol::{Command, RingStep};
use crate::crypto::DhKey;

/// A command bound for a specific link.
#[derive(Debug, Clone)]
pub struct Outgoing<L> {
    /// Link to send on.
    pub link: L,
    /// Command to send.
    pub command: Command,
}

/// What the caller should do after a ring transition.
#[derive(Debug, Clone)]
pub enum Dispatch<L> {
    /// Send the command to the ring successor.
    Send(Outgoing<L>),
    /// The successor has no link; the chain stops here.
    Stalled {
        /// Index of the missing successor.
        successor: usize,
    },
    /// Nothing to send.
    Idle,
}

/// Result of handling one incoming ring step.
#[derive(Debug, Clone)]
pub struct StepOutcome<L> {
    /// Follow-up for the ring successor.
    pub dispatch: Dispatch<L>,
    /// True when this step delivered this node's group secret.
    pub established: bool,
}

/// Start a new round as initiator.
///
/// Generates fresh `(p, g)` and an individual secret, and addresses the first
/// chain to this node's predecessor. A node alone in the ring has nobody to
/// agree with and returns [`Dispatch::Idle`].
pub fn start_round<L: Clone>(
    directory: &mut MembershipDirectory<L>,
    prime_bits: u64,
    primality_rounds: usize,
) -> Result<Dispatch<L>, ChatError> {
    let own = directory
        .own_index()
        .ok_or_else(|| ChatError::protocol("cannot start a round without a ring index"))?;
    if directory.ring_size() < 2 {
        return Ok(Dispatch::Idle);
    }

    let secret = DhKey::create_with_bits(prime_bits, primality_rounds)?;
    let step = RingStep {
        p: secret.prime().clone(),
        g: secret.generator().clone(),
        base: secret.value().clone(),
        shared_for: predecessor(directory, own),
        peers_finished_count: 1,
    };
    directory.begin_round(secret);

    debug!(own, ring_size = directory.ring_size(), "starting ring round");
    Ok(toward_successor(directory, Command::RingStep(step)))
}

/// Apply one incoming ring step.
pub fn advance<L: Clone>(
    directory: &mut MembershipDirectory<L>,
    step: RingStep,
) -> Result<StepOutcome<L>, ChatError> {
    let own = directory
        .own_index()
        .ok_or_else(|| ChatError::protocol("ring step received before joining"))?;
    let ring_size = directory.ring_size();
    if step.shared_for >= ring_size {
        debug!(
            shared_for = step.shared_for,
            ring_size, "dropping ring step addressed outside the ring"
        );
        return Ok(StepOutcome {
            dispatch: Dispatch::Idle,
            established: false,
        });
    }

    let reusable = directory
        .individual_secret()
        .filter(|secret| secret.shares_parameters(&step.p, &step.g))
        .cloned();
    let secret = match reusable {
        Some(secret) => secret,
        None => {
            let secret = DhKey::create_from_known_parameters(step.p.clone(), step.g.clone())?;
            directory.begin_round(secret.clone());
            secret
        }
    };
    let powered = secret.derive_from_public(&step.base)?;

    if step.shared_for != own {
        let forward = RingStep {
            base: powered.value().clone(),
            ..step
        };
        return Ok(StepOutcome {
            dispatch: toward_successor(directory, Command::RingStep(forward)),
            established: false,
        });
    }

    directory.set_group_secret(powered);
    debug!(own, finished = step.peers_finished_count, ring_size, "group secret established");

    let dispatch = if step.peers_finished_count < ring_size {
        let next_chain = RingStep {
            p: step.p,
            g: step.g,
            base: secret.value().clone(),
            shared_for: predecessor(directory, own),
            peers_finished_count: step.peers_finished_count + 1,
        };
        toward_successor(directory, Command::RingStep(next_chain))
    } else {
        Dispatch::Idle
    };

    Ok(StepOutcome {
        dispatch,
        established: true,
    })
}

fn predecessor<L>(directory: &MembershipDirectory<L>, own: usize) -> usize {
    directory.previous_index().unwrap_or(own)
}

fn toward_successor<L: Clone>(directory: &MembershipDirectory<L>, command: Command) -> Dispatch<L> {
    let Some(successor) = directory.next_index() else {
        return Dispatch::Idle;
    };
    match directory.link_at(successor) {
        Some(link) => Dispatch::Send(Outgoing {
            link: link.clone(),
            command,
        }),
        None => Dispatch::Stalled { successor },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    const TEST_BITS: u64 = 48;
    const TEST_ROUNDS: usize = 20;

    /// `n` fully joined directories; link handles are the peer's ring index.
    fn members(n: usize) -> Vec<MembershipDirectory<usize>> {
        (0..n)
            .map(|own| {
                let mut dir = MembershipDirectory::new();
                dir.set_own_index(own);
                for index in (0..n).filter(|&i| i != own) {
                    dir.admit(index, format!("127.0.0.1:{}", 9000 + index), index);
                }
                dir
            })
            .collect()
    }

    /// Deliver every queued step until the ring goes quiet. Returns hop count.
    fn run(members: &mut [MembershipDirectory<usize>], first: Dispatch<usize>) -> usize {
        let mut queue = VecDeque::new();
        if let Dispatch::Send(out) = first {
            queue.push_back(out);
        }

        let mut hops = 0;
        while let Some(Outgoing { link, command }) = queue.pop_front() {
            let Command::RingStep(step) = command else {
                panic!("only ring steps travel during a round");
            };
            hops += 1;
            match advance(&mut members[link], step).unwrap().dispatch {
                Dispatch::Send(out) => queue.push_back(out),
                Dispatch::Idle => {}
                Dispatch::Stalled { successor } => panic!("stalled at {}", successor),
            }
        }
        hops
    }

    fn assert_converged(members: &[MembershipDirectory<usize>]) {
        let first = members[0].group_secret().expect("member 0 has a group secret");
        for (i, member) in members.iter().enumerate() {
            let secret = member
                .group_secret()
                .unwrap_or_else(|| panic!("member {} has no group secret", i));
            assert_eq!(secret.value(), first.value(), "member {} diverged", i);
        }
    }

    #[test]
    fn test_ring_converges_for_various_sizes() {
        for n in [2, 3, 5] {
            let mut ring = members(n);
            let initiator = n - 1;
            let first = start_round(&mut ring[initiator], TEST_BITS, TEST_ROUNDS).unwrap();
            let hops = run(&mut ring, first);

            assert_converged(&ring);
            // N chains of N - 1 hops each
            assert_eq!(hops, n * (n - 1));
        }
    }

    #[test]
    fn test_any_member_can_initiate() {
        let mut ring = members(4);
        let first = start_round(&mut ring[1], TEST_BITS, TEST_ROUNDS).unwrap();
        run(&mut ring, first);
        assert_converged(&ring);
    }

    #[test]
    fn test_group_secret_differs_from_every_public_value() {
        let mut ring = members(3);
        let first = start_round(&mut ring[2], TEST_BITS, TEST_ROUNDS).unwrap();
        run(&mut ring, first);

        let group = ring[0].group_secret().unwrap().value().clone();
        for member in &ring {
            assert_ne!(member.individual_secret().unwrap().value(), &group);
        }
    }

    #[test]
    fn test_new_round_replaces_stale_parameters() {
        let mut ring = members(3);
        let first = start_round(&mut ring[2], TEST_BITS, TEST_ROUNDS).unwrap();
        run(&mut ring, first);
        let old = ring[0].group_secret().unwrap().value().clone();

        // Same membership, fresh round from another member.
        let first = start_round(&mut ring[0], TEST_BITS, TEST_ROUNDS).unwrap();
        run(&mut ring, first);

        assert_converged(&ring);
        assert_ne!(ring[1].group_secret().unwrap().value(), &old);
    }

    #[test]
    fn test_single_member_never_starts_a_round() {
        let mut alone: MembershipDirectory<usize> = MembershipDirectory::new();
        alone.set_own_index(0);

        let dispatch = start_round(&mut alone, TEST_BITS, TEST_ROUNDS).unwrap();
        assert!(matches!(dispatch, Dispatch::Idle));
        assert!(alone.group_secret().is_none());
    }

    #[test]
    fn test_round_requires_an_index() {
        let mut dir: MembershipDirectory<usize> = MembershipDirectory::new();
        assert!(matches!(
            start_round(&mut dir, TEST_BITS, TEST_ROUNDS),
            Err(ChatError::Protocol(_))
        ));
    }

    #[test]
    fn test_step_before_joining_is_protocol_error() {
        let mut source = members(2);
        let Dispatch::Send(out) = start_round(&mut source[1], TEST_BITS, TEST_ROUNDS).unwrap() else {
            panic!("expected a step");
        };
        let Command::RingStep(step) = out.command else {
            panic!("expected a ring step");
        };

        let mut stranger: MembershipDirectory<usize> = MembershipDirectory::new();
        assert!(matches!(advance(&mut stranger, step), Err(ChatError::Protocol(_))));
    }

    #[test]
    fn test_step_for_unknown_index_is_dropped() {
        let mut ring = members(2);
        let step = RingStep {
            p: 23u32.into(),
            g: 5u32.into(),
            base: 8u32.into(),
            shared_for: 7,
            peers_finished_count: 1,
        };
        let outcome = advance(&mut ring[0], step).unwrap();

        assert!(!outcome.established);
        assert!(matches!(outcome.dispatch, Dispatch::Idle));
        assert!(ring[0].individual_secret().is_none());
    }

    #[test]
    fn test_stale_step_after_departure_is_dropped() {
        // Member 2 of a three-member ring loses member 1 and becomes index 1
        // of two, while a step addressed to the old index 2 is in flight.
        let mut dir: MembershipDirectory<usize> = MembershipDirectory::new();
        dir.set_own_index(2);
        dir.admit(0, "127.0.0.1:9000", 0);
        dir.admit(1, "127.0.0.1:9001", 1);
        dir.remove_link(&1).unwrap();
        assert_eq!(dir.own_index(), Some(1));

        let step = RingStep {
            p: 23u32.into(),
            g: 5u32.into(),
            base: 8u32.into(),
            shared_for: 2,
            peers_finished_count: 1,
        };
        let outcome = advance(&mut dir, step).unwrap();

        assert!(!outcome.established);
        assert!(matches!(outcome.dispatch, Dispatch::Idle));
        assert!(dir.group_secret().is_none());
        assert_eq!(dir.ring_size(), 2);
    }

    #[test]
    fn test_missing_successor_stalls() {
        // Holds a link to index 2 but none to its successor 1.
        let mut dir: MembershipDirectory<usize> = MembershipDirectory::new();
        dir.set_own_index(0);
        dir.admit(2, "127.0.0.1:9002", 2);

        let step = RingStep {
            p: 23u32.into(),
            g: 5u32.into(),
            base: 8u32.into(),
            shared_for: 1,
            peers_finished_count: 1,
        };
        let outcome = advance(&mut dir, step).unwrap();

        assert!(!outcome.established);
        assert!(matches!(outcome.dispatch, Dispatch::Stalled { successor: 1 }));
    }
}
