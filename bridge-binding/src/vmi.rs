//! VirtualMachineInstance model.
//!
//! Only the parts of the instance spec the bridge binding reads are modeled.
//! Unknown fields are ignored so newer hosts can send richer payloads.

use serde::Deserialize;

/// A virtual machine instance as sent by the host in hook callbacks.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineInstance {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: VirtualMachineInstanceSpec,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineInstanceSpec {
    pub domain: DomainSpec,
    #[serde(default)]
    pub networks: Vec<Network>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainSpec {
    #[serde(default)]
    pub devices: Devices,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Devices {
    #[serde(default)]
    pub interfaces: Vec<Interface>,
    /// Use virtio-transitional device models so legacy guests can drive them.
    #[serde(default)]
    pub use_virtio_transitional: Option<bool>,
}

impl Devices {
    pub fn virtio_transitional(&self) -> bool {
        self.use_virtio_transitional.unwrap_or(false)
    }
}

/// A guest network interface.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interface {
    pub name: String,
    /// Empty when the host leaves the address to the binding.
    #[serde(default)]
    pub mac_address: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Core bridge binding marker.
    #[serde(default)]
    pub bridge: Option<InterfaceBridge>,
    /// Network binding plugin reference.
    #[serde(default)]
    pub binding: Option<PluginBinding>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct InterfaceBridge {}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct PluginBinding {
    pub name: String,
}

/// A network an interface is attached to.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub name: String,
    #[serde(default)]
    pub pod: Option<PodNetwork>,
    #[serde(default)]
    pub multus: Option<MultusNetwork>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodNetwork {
    #[serde(default)]
    pub vm_network_cidr: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultusNetwork {
    pub network_name: String,
    #[serde(default)]
    pub default: bool,
}
