#![cfg_attr(test, allow(clippy::unwrap_used))]

//! In-memory peer/forwarder store with freshness pruning.
//!
//! An entry is live while `now - last_seen <= hold`. Peers and remotely
//! owned forwarders appear on their first Hello, are overwritten by every
//! subsequent one (last Hello wins on id conflicts), and drop out once
//! unheard for longer than the hold time. Locally-owned forwarders are
//! republished with a fresh timestamp on every tick and so never expire.

use std::{
    collections::HashMap,
    net::Ipv4Addr,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use vgw_core::{Forwarder, Peer};

/// Serialisable store of observed peers and forwarders.
///
/// All operations take the lock for their full duration, so they are atomic
/// with respect to each other; the list operations hand back independent
/// snapshots the caller may sort or index freely.
#[derive(Debug, Default)]
pub struct Registry {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    peers: HashMap<Ipv4Addr, Peer>,
    forwarders: HashMap<u8, Forwarder>,
}

fn live(last_seen: Instant, now: Instant, hold: Duration) -> bool {
    now.saturating_duration_since(last_seen) <= hold
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a peer, keyed by its IPv4.
    pub fn upsert_peer(&self, peer: Peer) {
        self.inner.lock().peers.insert(peer.ip, peer);
    }

    /// Insert or overwrite a forwarder, keyed by its id.
    pub fn upsert_forwarder(&self, forwarder: Forwarder) {
        self.inner.lock().forwarders.insert(forwarder.id, forwarder);
    }

    /// Snapshot of the peers still inside the freshness window.
    pub fn list_peers(&self, now: Instant, hold: Duration) -> Vec<Peer> {
        self.inner
            .lock()
            .peers
            .values()
            .filter(|p| live(p.last_seen, now, hold))
            .copied()
            .collect()
    }

    /// Snapshot of the forwarders still inside the freshness window.
    pub fn list_forwarders(&self, now: Instant, hold: Duration) -> Vec<Forwarder> {
        self.inner
            .lock()
            .forwarders
            .values()
            .filter(|f| live(f.last_seen, now, hold))
            .copied()
            .collect()
    }

    /// Evict every entry outside the freshness window.
    pub fn remove_stale(&self, now: Instant, hold: Duration) {
        let mut inner = self.inner.lock();
        inner.peers.retain(|_, p| live(p.last_seen, now, hold));
        inner.forwarders.retain(|_, f| live(f.last_seen, now, hold));
    }
}
