//! Error taxonomy shared across the workspace.
//!
//! Startup failures (config, interface, socket) abort the process; everything
//! that happens per-packet is either dropped where it occurs or logged and
//! retried, and never surfaces through this type past an activity boundary.

use thiserror::Error;

/// Workspace-wide result alias.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Daemon error kinds.
#[derive(Debug, Error)]
pub enum Error {
    /// Generic I/O failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid or missing configuration. Fatal at startup.
    #[error("config: {0}")]
    Config(String),
    /// Named NIC missing, without IPv4, or with an unusable MAC. Fatal at startup.
    #[error("interface: {0}")]
    Interface(String),
    /// Multicast bind or raw-socket open failure. Fatal at startup.
    #[error("socket: {0}")]
    Socket(String),
    /// Transient wire write failure. Logged and retried on the next opportunity.
    #[error("send: {0}")]
    Send(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
    pub fn interface(msg: impl Into<String>) -> Self {
        Self::Interface(msg.into())
    }
    pub fn socket(msg: impl Into<String>) -> Self {
        Self::Socket(msg.into())
    }
    pub fn send(msg: impl Into<String>) -> Self {
        Self::Send(msg.into())
    }
}

// Map TOML deserialization errors into the config error domain without adding a new variant
impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
