//! Capability seams between the group core and its I/O collaborators.
//!
//! The orchestrator never touches a socket: decoded Hellos and parsed ARP
//! requests arrive through `mpsc` senders handed to the bus `run` loops, so
//! every registry write funnels through a single consumer task. A bus `run`
//! returns `Ok(())` only on cancellation; any other return is a fatal
//! transport failure the caller escalates.

use std::{net::Ipv4Addr, time::Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    types::{ForwarderTlv, HelloFrame, MacAddr},
    Result,
};

/// A decoded Hello with its receive context.
#[derive(Debug, Clone)]
pub struct HelloEvent {
    /// Source IPv4 of the datagram.
    pub src: Ipv4Addr,
    /// Monotonic receipt time.
    pub seen_at: Instant,
    /// The decoded message.
    pub frame: HelloFrame,
}

/// An ARP who-has observed on the segment.
#[derive(Debug, Clone, Copy)]
pub struct ArpRequest {
    /// Sender protocol address of the request.
    pub src_ip: Ipv4Addr,
    /// Sender hardware address of the request.
    pub src_mac: MacAddr,
    /// Target protocol address being resolved.
    pub dst_ip: Ipv4Addr,
}

/// Hello transport: periodic TX plus a continuous RX loop.
#[async_trait]
pub trait HelloBus: Send + Sync + 'static {
    /// Deliver decoded Hellos into `events` until `cancel` fires.
    ///
    /// Undecodable frames and frames for other groups are dropped before
    /// they reach the channel. Checks cancellation at least once per second.
    async fn run(&self, events: mpsc::Sender<HelloEvent>, cancel: CancellationToken) -> Result<()>;

    /// Best-effort multicast send of one encoded Hello.
    async fn send(&self, frame: &HelloFrame) -> Result<()>;
}

/// ARP transport: request delivery plus reply emission.
#[async_trait]
pub trait ArpBus: Send + Sync + 'static {
    /// Deliver ARP requests into `requests` until `cancel` fires.
    async fn run(&self, requests: mpsc::Sender<ArpRequest>, cancel: CancellationToken)
        -> Result<()>;

    /// Emit an ARP reply claiming `vip` is at `vmac`, addressed to the
    /// requester recorded in `request`.
    async fn reply(&self, request: &ArpRequest, vip: Ipv4Addr, vmac: MacAddr) -> Result<()>;
}

/// Node-local interface facts.
pub trait LocalInfo: Send + Sync + 'static {
    /// Primary IPv4 of the group interface.
    fn local_ip(&self) -> Result<Ipv4Addr>;

    /// The locally-owned forwarders with their resolved MACs.
    fn local_forwarders(&self) -> Result<Vec<ForwarderTlv>>;
}
