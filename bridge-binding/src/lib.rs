//! Network bridge binding hook sidecar.
//!
//! Rewrites the domain of a virtual machine instance so its bridge-bound
//! interface is backed by a tap device, and hands the interface's MAC address
//! to the DHCP responder serving the guest.

#[cfg(not(unix))]
compile_error!("network-bridge-binding is Unix-only");

pub mod domain;
pub mod handoff;
pub mod mac;
pub mod service;
pub mod vmi;

pub use service::{HookServer, StopReason};
