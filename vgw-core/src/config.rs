#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Daemon configuration. Parses a TOML file into a strongly-typed structure,
//! fills defaults, and validates the result before the daemon starts. A
//! configuration that fails validation is fatal at startup.

use std::{
    fs,
    net::{Ipv4Addr, SocketAddrV4},
    path::Path,
    time::Duration,
};

use serde::Deserialize;

use crate::{Error, Result};

/// A locally-owned forwarder as declared in the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct ForwarderConfig {
    /// Forwarder id, unique across the whole group and never zero.
    pub id: u8,
    /// Interface whose MAC this forwarder advertises.
    pub iface: String,
    /// Load-balancing weight.
    #[serde(default = "default_weight")]
    pub weight: u8,
}

/// Primary daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Interface carrying the group (Hello multicast and ARP).
    pub interface: String,
    /// The virtual IP this group answers ARP for.
    pub virtual_ip: Ipv4Addr,
    /// Group identifier; widened to u16 on the wire.
    pub group_id: u8,
    /// Election priority of this node.
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Advertised node weight.
    #[serde(default = "default_weight")]
    pub weight: u8,
    /// Whether a higher-priority node may take over from a healthy active.
    #[serde(default)]
    pub preempt: bool,
    /// Seconds between emitted Hellos.
    #[serde(default = "default_hello_time")]
    pub hello_time_sec: u64,
    /// Seconds after which an unheard peer or forwarder is dead.
    #[serde(default = "default_hold_time")]
    pub hold_time_sec: u64,
    /// Hello multicast group.
    #[serde(default = "default_multicast_group")]
    pub multicast_group: Ipv4Addr,
    /// Hello multicast port.
    #[serde(default = "default_multicast_port")]
    pub multicast_port: u16,
    /// Locally-owned forwarders.
    #[serde(default)]
    pub forwarders: Vec<ForwarderConfig>,
    /// Logging verbosity (`error`, `warn`, `info`, `debug`, `trace`).
    pub log_level: Option<String>,
}

fn default_priority() -> u8 {
    100
}

fn default_weight() -> u8 {
    100
}

fn default_hello_time() -> u64 {
    3
}

fn default_hold_time() -> u64 {
    10
}

fn default_multicast_group() -> Ipv4Addr {
    Ipv4Addr::new(224, 0, 0, 102)
}

fn default_multicast_port() -> u16 {
    3222
}

impl DaemonConfig {
    /// Load, normalize and validate a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(&path)?;
        Self::from_toml(&data)
    }

    /// Parse, normalize and validate configuration text.
    pub fn from_toml(data: &str) -> Result<Self> {
        let mut cfg: DaemonConfig = toml::from_str(data)?;
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    // A written-out weight of zero means "unset"; replace with the default.
    fn normalize(&mut self) {
        if self.weight == 0 {
            self.weight = default_weight();
        }
        for fwd in &mut self.forwarders {
            if fwd.weight == 0 {
                fwd.weight = default_weight();
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.interface.is_empty() {
            return Err(Error::config("interface is required"));
        }
        if self.hello_time_sec == 0 {
            return Err(Error::config("hello_time_sec must be positive"));
        }
        if self.hold_time_sec == 0 {
            return Err(Error::config("hold_time_sec must be positive"));
        }
        if self.hold_time_sec < 2 * self.hello_time_sec {
            return Err(Error::config(format!(
                "hold_time_sec ({}) must be at least twice hello_time_sec ({})",
                self.hold_time_sec, self.hello_time_sec
            )));
        }
        if !self.multicast_group.is_multicast() {
            return Err(Error::config(format!(
                "multicast_group {} is not a multicast address",
                self.multicast_group
            )));
        }
        let mut seen = [false; 256];
        for fwd in &self.forwarders {
            if fwd.id == 0 {
                return Err(Error::config("forwarder id 0 is reserved"));
            }
            if fwd.iface.is_empty() {
                return Err(Error::config(format!("forwarder {} needs an iface", fwd.id)));
            }
            if seen[fwd.id as usize] {
                return Err(Error::config(format!("duplicate forwarder id {}", fwd.id)));
            }
            seen[fwd.id as usize] = true;
        }
        Ok(())
    }

    /// Interval between emitted Hellos.
    pub fn hello_interval(&self) -> Duration {
        Duration::from_secs(self.hello_time_sec)
    }

    /// Peer/forwarder freshness window.
    pub fn hold_time(&self) -> Duration {
        Duration::from_secs(self.hold_time_sec)
    }

    /// Destination for emitted Hellos.
    pub fn multicast_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.multicast_group, self.multicast_port)
    }
}
