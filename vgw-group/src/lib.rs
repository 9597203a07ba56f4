#![forbid(unsafe_code)]

//! Group state for the vgw gateway daemon: the peer/forwarder registry with
//! freshness semantics, the forwarder selection strategies, and the role
//! election. Everything here is synchronous and I/O-free; the orchestrator
//! in `vgwd` drives it from packet and timer events.

pub mod election;
pub mod registry;
pub mod selector;

pub use election::{evaluate, LocalNode};
pub use registry::Registry;
pub use selector::ForwarderSelector;
