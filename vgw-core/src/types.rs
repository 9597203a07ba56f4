#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Typed values shared by the codec, the group logic and the daemon.

use std::{
    fmt,
    net::Ipv4Addr,
    str::FromStr,
    sync::atomic::{AtomicU8, Ordering},
    time::Instant,
};

/// Gateway role of a node within its group.
///
/// Wire values are fixed by the Hello frame layout: Listen=0, Active=1,
/// Standby=2. Exactly one role is current at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    /// Passive member: a valid active gateway exists and this node does not
    /// qualify to take over.
    #[default]
    Listen,
    /// Active virtual gateway: the one node answering ARP for the VIP.
    Active,
    /// Next in line for the active role.
    Standby,
}

impl Role {
    /// Wire encoding of the role.
    pub fn to_wire(self) -> u8 {
        match self {
            Role::Listen => 0,
            Role::Active => 1,
            Role::Standby => 2,
        }
    }

    /// Decode a wire role byte. Unknown values map to [`Role::Listen`], the
    /// passive default, so a decodable frame never fails on this field.
    pub fn from_wire(value: u8) -> Self {
        match value {
            1 => Role::Active,
            2 => Role::Standby,
            _ => Role::Listen,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Listen => "listen",
            Role::Active => "active",
            Role::Standby => "standby",
        };
        f.write_str(name)
    }
}

/// Current-role cache shared between the event loop and observers.
///
/// A plain atomic so a reader can never observe a torn value.
#[derive(Debug)]
pub struct RoleCell(AtomicU8);

impl RoleCell {
    pub fn new(role: Role) -> Self {
        Self(AtomicU8::new(role.to_wire()))
    }

    pub fn store(&self, role: Role) {
        self.0.store(role.to_wire(), Ordering::Release);
    }

    pub fn load(&self) -> Role {
        Role::from_wire(self.0.load(Ordering::Acquire))
    }
}

impl Default for RoleCell {
    fn default() -> Self {
        Self::new(Role::Listen)
    }
}

/// A 48-bit Ethernet hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| crate::Error::interface(format!("bad MAC {s:?}")))?;
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| crate::Error::interface(format!("bad MAC {s:?}")))?;
        }
        if parts.next().is_some() {
            return Err(crate::Error::interface(format!("bad MAC {s:?}")));
        }
        Ok(Self(octets))
    }
}

/// Advertised forwarder record as carried in a Hello frame (8 octets on the
/// wire) and as returned by the local-info collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwarderTlv {
    pub id: u8,
    pub weight: u8,
    pub mac: MacAddr,
}

/// Logical Hello message exchanged between group members.
///
/// The frame version is a codec concern and not stored here; see `vgw-proto`
/// for the wire layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloFrame {
    pub role: Role,
    pub group_id: u16,
    pub priority: u8,
    pub weight: u8,
    pub virtual_ip: Ipv4Addr,
    pub forwarders: Vec<ForwarderTlv>,
}

/// A group member as observed through its Hellos, keyed by source IPv4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    pub ip: Ipv4Addr,
    pub priority: u8,
    pub weight: u8,
    pub role: Role,
    /// Monotonic receipt time of the most recent Hello from this peer.
    pub last_seen: Instant,
}

/// A live forwarder the active gateway may hand out in ARP replies,
/// keyed by forwarder id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Forwarder {
    pub id: u8,
    /// The advertising peer, or the local node for locally-owned entries.
    pub owner_ip: Ipv4Addr,
    pub mac: MacAddr,
    pub weight: u8,
    pub last_seen: Instant,
}
