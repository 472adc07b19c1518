//! Hook service implementations.
//!
//! This module contains the gRPC server and service implementations:
//! - `info`: hook point negotiation (Info RPC)
//! - `callbacks`: v1alpha3 hook points (OnDefineDomain, PreCloudInitIso, Shutdown RPCs)
//! - `server`: serving and the lifecycle coordinator
//! - `shutdown`: the Shutdown RPC to coordinator signal

mod callbacks;
mod info;
pub mod server;
pub mod shutdown;

pub use info::SIDECAR_NAME;
pub use server::{termination_signals, HookServer, StopReason};
