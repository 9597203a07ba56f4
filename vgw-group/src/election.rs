#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Role election.
//!
//! Evaluated on every tick and after every inbound Hello that touches the
//! peer set. The input is the local candidate plus a consistent snapshot of
//! the live peers; the output is the one role the node holds until the next
//! evaluation. The rules are monotone in priority with the higher IPv4 as
//! tie-break, so a stable partition settles on exactly one active gateway.

use std::net::Ipv4Addr;

use vgw_core::{Peer, Role};

/// The local node's election inputs.
#[derive(Debug, Clone, Copy)]
pub struct LocalNode {
    pub ip: Ipv4Addr,
    pub priority: u8,
    /// Whether this node may take the active role away from a live,
    /// lower-priority active gateway.
    pub preempt: bool,
}

/// Compute the local role from the live peer snapshot.
///
/// The result only depends on the *set* of peers, never on slice order:
/// both the best candidate and the active peer are reduced with the same
/// `(priority, ip)` maximum.
pub fn evaluate(local: &LocalNode, peers: &[Peer]) -> Role {
    let mut best = (local.priority, local.ip);
    let mut best_is_local = true;
    let mut active_peer: Option<&Peer> = None;

    for peer in peers {
        if peer.role == Role::Active {
            active_peer = match active_peer {
                Some(current) if (current.priority, current.ip) > (peer.priority, peer.ip) => {
                    Some(current)
                }
                _ => Some(peer),
            };
        }
        if (peer.priority, peer.ip) > best {
            best = (peer.priority, peer.ip);
            best_is_local = false;
        }
    }

    match active_peer {
        None => {
            if best_is_local {
                Role::Active
            } else {
                Role::Standby
            }
        }
        Some(active) => {
            if local.preempt && local.priority > active.priority {
                Role::Active
            } else if best_is_local {
                Role::Standby
            } else {
                Role::Listen
            }
        }
    }
}
