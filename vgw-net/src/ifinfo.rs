//! Node-local interface facts via `getifaddrs`.
//!
//! Resolves the group interface's primary IPv4 and the MAC behind each
//! configured forwarder. Lookups happen at startup and on every tick's
//! republish; a vanished interface surfaces as [`Error::Interface`].

use std::net::Ipv4Addr;

use nix::ifaddrs::getifaddrs;

use vgw_core::{DaemonConfig, Error, ForwarderConfig, ForwarderTlv, LocalInfo, MacAddr, Result};

/// `LocalInfo` provider backed by the operating system's interface table.
pub struct NetInfo {
    interface: String,
    forwarders: Vec<ForwarderConfig>,
}

impl NetInfo {
    pub fn new(cfg: &DaemonConfig) -> Self {
        Self {
            interface: cfg.interface.clone(),
            forwarders: cfg.forwarders.clone(),
        }
    }
}

impl LocalInfo for NetInfo {
    fn local_ip(&self) -> Result<Ipv4Addr> {
        interface_ipv4(&self.interface)
    }

    fn local_forwarders(&self) -> Result<Vec<ForwarderTlv>> {
        self.forwarders
            .iter()
            .map(|fwd| {
                Ok(ForwarderTlv {
                    id: fwd.id,
                    weight: fwd.weight,
                    mac: interface_mac(&fwd.iface)?,
                })
            })
            .collect()
    }
}

/// First IPv4 address bound to `name`.
pub fn interface_ipv4(name: &str) -> Result<Ipv4Addr> {
    let addrs =
        getifaddrs().map_err(|e| Error::interface(format!("interface table: {e}")))?;
    for ifaddr in addrs {
        if ifaddr.interface_name != name {
            continue;
        }
        if let Some(sin) = ifaddr.address.as_ref().and_then(|a| a.as_sockaddr_in()) {
            return Ok(Ipv4Addr::from(sin.ip()));
        }
    }
    Err(Error::interface(format!("no IPv4 address on {name}")))
}

/// Hardware address of `name`.
pub fn interface_mac(name: &str) -> Result<MacAddr> {
    let addrs =
        getifaddrs().map_err(|e| Error::interface(format!("interface table: {e}")))?;
    for ifaddr in addrs {
        if ifaddr.interface_name != name {
            continue;
        }
        if let Some(mac) = ifaddr
            .address
            .as_ref()
            .and_then(|a| a.as_link_addr())
            .and_then(|link| link.addr())
        {
            return Ok(MacAddr::new(mac));
        }
    }
    Err(Error::interface(format!("no usable MAC on {name}")))
}
