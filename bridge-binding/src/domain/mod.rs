//! Network configurators that rewrite the interface elements of a domain.
//!
//! The callback handler only sees the two traits below; the bridge
//! implementation lives in [`bridge`].

pub mod bridge;

use crate::vmi::{Interface, Network};
use hooks_shared::HookResult;

pub use bridge::{BridgeConfiguratorFactory, BridgeNetworkConfigurator};

/// Per-call options derived from the instance spec.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetworkConfiguratorOptions {
    pub use_virtio_transitional: bool,
    /// Generated address, set only when the interface carries none.
    pub mac: Option<String>,
}

/// Rewrites a serialized domain.
pub trait NetworkConfigurator: Send {
    /// Return the mutated domain XML. The input is never partially rewritten:
    /// on error nothing is returned.
    fn mutate(&self, domain_xml: &[u8]) -> HookResult<Vec<u8>>;
}

/// Builds a configurator for one instance's interfaces and networks.
pub trait NetworkConfiguratorFactory: Send + Sync {
    fn build(
        &self,
        interfaces: &[Interface],
        networks: &[Network],
        options: NetworkConfiguratorOptions,
    ) -> HookResult<Box<dyn NetworkConfigurator>>;
}
