//! Hook protocol constants
//!
//! These names must be identical on both sides of the host-sidecar boundary.

/// Hook point names advertised through `Info`.
pub mod hook_points {
    /// Called with the generated domain XML before the domain is defined.
    pub const ON_DEFINE_DOMAIN: &str = "onDefineDomain";

    /// Called when the host is about to stop the sidecar.
    pub const SHUTDOWN: &str = "shutdown";

    /// Priority used when a sidecar has no ordering requirement.
    pub const DEFAULT_PRIORITY: i32 = 0;
}

/// Callbacks API versions
pub mod versions {
    pub const V1ALPHA3: &str = "v1alpha3";
}
