#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Hello bus over IPv4 UDP multicast.
//!
//! One socket per daemon, bound to the group port with the membership joined
//! on the node's interface address. The receive loop decodes every datagram
//! through `vgw-proto` and forwards the survivors; undecodable frames,
//! frames for other groups, and the node's own looped-back frames are
//! dropped without comment beyond a trace line.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Type};
use tokio::{net::UdpSocket, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use vgw_core::{Error, HelloBus, HelloEvent, HelloFrame, Result};

/// Maximum Hello datagram: fixed prefix plus a full forwarder section.
const MAX_DATAGRAM: usize = vgw_proto::HEADER_LEN + vgw_proto::TLV_LEN * 255;

/// Multicast Hello transport.
pub struct UdpHelloBus {
    socket: Arc<UdpSocket>,
    group: SocketAddrV4,
    group_id: u16,
    local_ip: Ipv4Addr,
}

impl UdpHelloBus {
    /// Bind the group socket on `interface_ip` and join the multicast group.
    ///
    /// Fails with [`Error::Socket`] when the bind or membership setup is
    /// refused; that is fatal at startup.
    pub fn open(interface_ip: Ipv4Addr, group: SocketAddrV4, group_id: u16) -> Result<Self> {
        let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), group.port());
        let socket = socket2::Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| Error::socket(format!("udp socket: {e}")))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| Error::socket(format!("reuse address: {e}")))?;
        #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
        socket
            .set_reuse_port(true)
            .map_err(|e| Error::socket(format!("reuse port: {e}")))?;
        socket
            .bind(&bind_addr.into())
            .map_err(|e| Error::socket(format!("bind {bind_addr}: {e}")))?;
        socket
            .join_multicast_v4(group.ip(), &interface_ip)
            .map_err(|e| Error::socket(format!("join {}: {e}", group.ip())))?;
        socket
            .set_multicast_if_v4(&interface_ip)
            .map_err(|e| Error::socket(format!("multicast if {interface_ip}: {e}")))?;
        socket
            .set_multicast_loop_v4(false)
            .map_err(|e| Error::socket(format!("multicast loop: {e}")))?;
        // Best-effort; a burst of full-size Hellos is still tiny.
        let _ = socket.set_recv_buffer_size(1 << 20);

        let std_sock: std::net::UdpSocket = socket.into();
        std_sock
            .set_nonblocking(true)
            .map_err(|e| Error::socket(format!("nonblocking: {e}")))?;
        let socket = UdpSocket::from_std(std_sock)
            .map_err(|e| Error::socket(format!("register socket: {e}")))?;

        Ok(Self {
            socket: Arc::new(socket),
            group,
            group_id,
            local_ip: interface_ip,
        })
    }

    fn accept(&self, src: SocketAddr, data: &[u8]) -> Option<HelloEvent> {
        let src = match src.ip() {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => return None,
        };
        // The kernel loop filter is off, but a multihomed host can still
        // hear itself through another membership.
        if src == self.local_ip {
            return None;
        }
        let frame = match vgw_proto::decode(data) {
            Ok(frame) => frame,
            Err(e) => {
                trace!(%src, error = %e, "dropping undecodable hello");
                return None;
            }
        };
        if frame.group_id != self.group_id {
            trace!(%src, group = frame.group_id, "dropping hello for foreign group");
            return None;
        }
        Some(HelloEvent {
            src,
            seen_at: tokio::time::Instant::now().into_std(),
            frame,
        })
    }
}

#[async_trait]
impl HelloBus for UdpHelloBus {
    async fn run(&self, events: mpsc::Sender<HelloEvent>, cancel: CancellationToken) -> Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM + 1];
        loop {
            let (len, src) = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                recv = self.socket.recv_from(&mut buf) => match recv {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "hello receive failed");
                        continue;
                    }
                },
            };
            if let Some(event) = self.accept(src, &buf[..len]) {
                match events.try_send(event) {
                    Ok(()) => {}
                    // Consumer is gone; shutdown is under way.
                    Err(mpsc::error::TrySendError::Closed(_)) => return Ok(()),
                    // Hello is best-effort; the next one is seconds away.
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        trace!("hello queue full, dropping frame");
                    }
                }
            }
        }
    }

    async fn send(&self, frame: &HelloFrame) -> Result<()> {
        let bytes = vgw_proto::encode(frame);
        self.socket
            .send_to(&bytes, SocketAddr::V4(self.group))
            .await
            .map_err(|e| Error::send(format!("hello to {}: {e}", self.group)))?;
        Ok(())
    }
}
