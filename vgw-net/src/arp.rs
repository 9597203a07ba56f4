#![cfg_attr(test, allow(clippy::unwrap_used))]

//! ARP capture and reply injection.
//!
//! The bus watches the group interface through a raw Ethernet socket,
//! surfaces every ARP who-has as an [`ArpRequest`], and injects replies
//! built from the forwarder MAC the dispatcher selected. Frame layout work
//! is delegated to `smoltcp::wire`; the daemon decides, this module only
//! parses and emits.

use std::net::Ipv4Addr;

use smoltcp::wire::{
    ArpOperation, ArpPacket, ArpRepr, EthernetAddress, EthernetFrame, EthernetProtocol,
    EthernetRepr, Ipv4Address,
};

use vgw_core::{ArpRequest, MacAddr};

/// Extract an ARP who-has from one Ethernet frame.
///
/// Anything that is not a well-formed ARP request over Ethernet/IPv4 is
/// discarded here so the dispatcher only ever sees requests.
pub fn parse_request(frame: &[u8]) -> Option<ArpRequest> {
    let eth = EthernetFrame::new_checked(frame).ok()?;
    if eth.ethertype() != EthernetProtocol::Arp {
        return None;
    }
    let packet = ArpPacket::new_checked(eth.payload()).ok()?;
    let ArpRepr::EthernetIpv4 {
        operation,
        source_hardware_addr,
        source_protocol_addr,
        target_protocol_addr,
        ..
    } = ArpRepr::parse(&packet).ok()?
    else {
        return None;
    };
    if operation != ArpOperation::Request {
        return None;
    }
    Some(ArpRequest {
        src_ip: Ipv4Addr::from(source_protocol_addr.0),
        src_mac: MacAddr::new(source_hardware_addr.0),
        dst_ip: Ipv4Addr::from(target_protocol_addr.0),
    })
}

/// Build the Ethernet frame answering `request`: `vip` is-at `vmac`,
/// unicast back to the requester, sourced from the forwarder MAC itself so
/// learning switches bind the VIP traffic to that port.
pub fn build_reply(request: &ArpRequest, vip: Ipv4Addr, vmac: MacAddr) -> Vec<u8> {
    let arp = ArpRepr::EthernetIpv4 {
        operation: ArpOperation::Reply,
        source_hardware_addr: EthernetAddress(vmac.octets()),
        source_protocol_addr: Ipv4Address(vip.octets()),
        target_hardware_addr: EthernetAddress(request.src_mac.octets()),
        target_protocol_addr: Ipv4Address(request.src_ip.octets()),
    };
    let eth = EthernetRepr {
        src_addr: EthernetAddress(vmac.octets()),
        dst_addr: EthernetAddress(request.src_mac.octets()),
        ethertype: EthernetProtocol::Arp,
    };
    let mut buf = vec![0u8; EthernetFrame::<&[u8]>::buffer_len(arp.buffer_len())];
    let mut frame = EthernetFrame::new_unchecked(&mut buf);
    eth.emit(&mut frame);
    let mut packet = ArpPacket::new_unchecked(frame.payload_mut());
    arp.emit(&mut packet);
    buf
}

#[cfg(unix)]
pub use self::raw::RawArpBus;

#[cfg(unix)]
mod raw {
    use std::net::Ipv4Addr;
    use std::os::unix::io::AsRawFd;

    use async_trait::async_trait;
    use smoltcp::phy::{wait as phy_wait, Device, Medium, RawSocket, RxToken, TxToken};
    use smoltcp::time::{Duration as PhyDuration, Instant as PhyInstant};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use tracing::{error, warn};

    use vgw_core::{ArpBus, ArpRequest, Error, MacAddr, Result};

    use super::{build_reply, parse_request};

    /// Outbound reply queue depth; replies are single frames and drain fast.
    const REPLY_QUEUE: usize = 64;

    /// ARP bus over raw Ethernet sockets bound to the group interface.
    ///
    /// The raw socket handle is not `Send`, so each worker opens its own:
    /// the capture loop inside `run`, and a dedicated writer thread behind a
    /// channel for reply injection so a pending 1-second receive wait never
    /// delays a reply. `open` probes the interface once up front; a socket
    /// that cannot be opened is fatal at startup.
    pub struct RawArpBus {
        interface: String,
        outbound: mpsc::Sender<Vec<u8>>,
    }

    fn open_socket(interface: &str) -> Result<RawSocket> {
        RawSocket::new(interface, Medium::Ethernet)
            .map_err(|e| Error::socket(format!("raw socket on {interface}: {e}")))
    }

    impl RawArpBus {
        /// Probe the raw socket on `interface` (needs CAP_NET_RAW) and start
        /// the reply writer.
        pub fn open(interface: &str) -> Result<Self> {
            drop(open_socket(interface)?);

            let (outbound, mut pending) = mpsc::channel::<Vec<u8>>(REPLY_QUEUE);
            let name = interface.to_string();
            std::thread::spawn(move || {
                let mut socket = match open_socket(&name) {
                    Ok(socket) => socket,
                    Err(e) => {
                        error!(error = %e, "arp writer failed to open socket");
                        return;
                    }
                };
                // Exits when the bus (and with it every sender) is dropped.
                while let Some(frame) = pending.blocking_recv() {
                    if let Some(token) = socket.transmit(PhyInstant::now()) {
                        token.consume(frame.len(), |buf| buf.copy_from_slice(&frame));
                    }
                }
            });

            Ok(Self {
                interface: interface.to_string(),
                outbound,
            })
        }
    }

    #[async_trait]
    impl ArpBus for RawArpBus {
        async fn run(
            &self,
            requests: mpsc::Sender<ArpRequest>,
            cancel: CancellationToken,
        ) -> Result<()> {
            let interface = self.interface.clone();
            let handle = tokio::task::spawn_blocking(move || -> Result<()> {
                let mut socket = open_socket(&interface)?;
                let fd = socket.as_raw_fd();
                while !cancel.is_cancelled() {
                    // Blocking receive as "wait with a 1-second deadline,
                    // loop on timeout" so cancellation is honored.
                    if let Err(e) = phy_wait(fd, Some(PhyDuration::from_secs(1))) {
                        warn!(%interface, error = %e, "arp socket wait failed");
                        continue;
                    }
                    let now = PhyInstant::now();
                    while let Some((rx, _tx)) = socket.receive(now) {
                        if let Some(request) = rx.consume(|frame| parse_request(frame)) {
                            match requests.try_send(request) {
                                Ok(()) => {}
                                Err(mpsc::error::TrySendError::Closed(_)) => return Ok(()),
                                // Overloaded dispatcher: requests drop on
                                // the floor, the requester retries.
                                Err(mpsc::error::TrySendError::Full(_)) => {}
                            }
                        }
                    }
                }
                Ok(())
            });
            handle
                .await
                .map_err(|e| Error::socket(format!("arp capture loop: {e}")))?
        }

        async fn reply(&self, request: &ArpRequest, vip: Ipv4Addr, vmac: MacAddr) -> Result<()> {
            let frame = build_reply(request, vip, vmac);
            self.outbound
                .try_send(frame)
                .map_err(|e| Error::send(format!("arp reply queue: {e}")))?;
            Ok(())
        }
    }
}
