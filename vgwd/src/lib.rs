#![forbid(unsafe_code)]

//! Daemon orchestration for vgw.
//!
//! The binary in `main.rs` wires configuration, logging, signals and the
//! network collaborators; the [`daemon`] module owns the event loop that
//! drives election, freshness and ARP dispatch.

pub mod daemon;

pub use daemon::{Daemon, GroupSettings};
