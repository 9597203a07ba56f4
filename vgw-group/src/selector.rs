#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Forwarder selection strategies.
//!
//! The selector is handed the live forwarder set sorted by ascending id and
//! returns the one whose MAC goes into the next ARP reply. Strategies are a
//! closed set of variants; the daemon default is round-robin.

use std::{
    collections::HashMap,
    hash::{Hash, Hasher},
    net::Ipv4Addr,
};

use vgw_core::Forwarder;

/// Pick-one-forwarder strategy with whatever cursor state it needs.
///
/// Callers must pass the live set sorted by ascending forwarder id so the
/// cyclic order stays stable while the set changes at the tail.
#[derive(Debug)]
pub enum ForwarderSelector {
    /// Cycle through the sorted set, one per request.
    RoundRobin { cursor: usize },
    /// Smooth weighted rotation: each forwarder is visited in proportion to
    /// its advertised weight. A zero weight counts as one so a
    /// misconfigured forwarder still rotates.
    Weighted { credit: HashMap<u8, i64> },
    /// Stable mapping from requester IPv4 to forwarder, so one host keeps
    /// resolving the VIP to the same MAC while the set is unchanged.
    HostHash,
}

impl ForwarderSelector {
    pub fn round_robin() -> Self {
        Self::RoundRobin { cursor: 0 }
    }

    pub fn weighted() -> Self {
        Self::Weighted {
            credit: HashMap::new(),
        }
    }

    pub fn host_hash() -> Self {
        Self::HostHash
    }

    /// Short stable strategy name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoundRobin { .. } => "round_robin",
            Self::Weighted { .. } => "weighted",
            Self::HostHash => "host_hash",
        }
    }

    /// Choose a forwarder for one request from `client`, or nothing when the
    /// live set is empty.
    pub fn select<'a>(
        &mut self,
        live: &'a [Forwarder],
        client: Ipv4Addr,
    ) -> Option<&'a Forwarder> {
        if live.is_empty() {
            return None;
        }
        match self {
            Self::RoundRobin { cursor } => {
                *cursor = (*cursor + 1) % live.len();
                live.get(*cursor)
            }
            Self::Weighted { credit } => {
                credit.retain(|id, _| live.iter().any(|f| f.id == *id));
                let mut total: i64 = 0;
                for f in live {
                    let w = i64::from(f.weight).max(1);
                    total += w;
                    *credit.entry(f.id).or_insert(0) += w;
                }
                let winner = live
                    .iter()
                    .max_by_key(|f| (credit.get(&f.id).copied().unwrap_or(0), std::cmp::Reverse(f.id)))?;
                if let Some(c) = credit.get_mut(&winner.id) {
                    *c -= total;
                }
                Some(winner)
            }
            Self::HostHash => {
                let mut hasher = std::collections::hash_map::DefaultHasher::new();
                client.octets().hash(&mut hasher);
                let idx = (hasher.finish() % live.len() as u64) as usize;
                live.get(idx)
            }
        }
    }
}

impl Default for ForwarderSelector {
    fn default() -> Self {
        Self::round_robin()
    }
}
