#![forbid(unsafe_code)]

//! Network collaborators for the vgw gateway daemon.
//!
//! * `hello_udp` — the group Hello bus over IPv4 UDP multicast.
//! * `arp` — ARP request capture and reply injection over a raw socket.
//! * `ifinfo` — interface address and MAC discovery.
//!
//! Everything here implements the capability traits from `vgw-core`; the
//! orchestrator never sees a socket.

pub mod arp;
pub mod hello_udp;
#[cfg(unix)]
pub mod ifinfo;

#[cfg(unix)]
pub use arp::RawArpBus;
pub use hello_udp::UdpHelloBus;
#[cfg(unix)]
pub use ifinfo::NetInfo;
