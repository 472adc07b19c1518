//! Hook protocol shared code
//!
//! This crate contains the generated hook protocol types, the hook point
//! constants and the error type used by hook sidecars.

pub mod constants;
pub mod errors;
pub mod transport;

// Generated protobuf types
pub mod info {
    #![allow(clippy::all, unused_qualifications)]
    tonic::include_proto!("kubevirt.hooks.info");
}

pub mod v1alpha3 {
    #![allow(clippy::all, unused_qualifications)]
    tonic::include_proto!("kubevirt.hooks.v1alpha3");
}

pub use errors::{HookError, HookResult};
pub use transport::Transport;

// Info service
pub use info::info_client::InfoClient;
pub use info::info_server::{Info, InfoServer};
pub use info::{HookPoint, InfoParams, InfoResult};

// Callbacks service
pub use v1alpha3::callbacks_client::CallbacksClient;
pub use v1alpha3::callbacks_server::{Callbacks, CallbacksServer};
pub use v1alpha3::{
    OnDefineDomainParams, OnDefineDomainResult, PreCloudInitIsoParams, PreCloudInitIsoResult,
    ShutdownParams, ShutdownResult,
};
