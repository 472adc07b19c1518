//! Bridge binding configurator.
//!
//! Injects an `ethernet` interface backed by a pre-created tap device into the
//! domain's `<devices>` element:
//!
//! ```text
//! <interface type="ethernet">
//!   <alias name="ua-{iface}"/>
//!   <target dev="{tap}" managed="no"/>
//!   <model type="{model}"/>
//!   <mac address="{mac}"/>
//! </interface>
//! ```

use super::{NetworkConfigurator, NetworkConfiguratorFactory, NetworkConfiguratorOptions};
use crate::vmi::{Interface, Network};
use hooks_shared::{HookError, HookResult};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Binding plugin name that selects this configurator.
pub const BINDING_NAME: &str = "bridge";

/// Prefix libvirt aliases must carry to be user-defined.
const USER_ALIAS_PREFIX: &str = "ua-";

/// Tap device of the pod network interface.
const POD_TAP_DEVICE: &str = "tap0";

const VIRTIO_MODEL: &str = "virtio";

/// Builds [`BridgeNetworkConfigurator`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct BridgeConfiguratorFactory;

impl NetworkConfiguratorFactory for BridgeConfiguratorFactory {
    fn build(
        &self,
        interfaces: &[Interface],
        networks: &[Network],
        options: NetworkConfiguratorOptions,
    ) -> HookResult<Box<dyn NetworkConfigurator>> {
        let configurator = BridgeNetworkConfigurator::new(interfaces, networks, options)?;
        Ok(Box::new(configurator))
    }
}

/// Configurator for the single interface bound by bridge.
#[derive(Clone, Debug, PartialEq)]
pub struct BridgeNetworkConfigurator {
    interface: Interface,
    tap_device: String,
    options: NetworkConfiguratorOptions,
}

impl BridgeNetworkConfigurator {
    pub fn new(
        interfaces: &[Interface],
        networks: &[Network],
        options: NetworkConfiguratorOptions,
    ) -> HookResult<Self> {
        let interface = interfaces
            .iter()
            .find(|iface| is_bridge_bound(iface))
            .ok_or_else(|| {
                HookError::ConfiguratorConstruction(format!(
                    "no interface with {} binding found",
                    BINDING_NAME
                ))
            })?;

        let network = networks
            .iter()
            .find(|net| net.name == interface.name)
            .ok_or_else(|| {
                HookError::ConfiguratorConstruction(format!(
                    "network {:?} not found for interface {:?}",
                    interface.name, interface.name
                ))
            })?;

        let tap_device = tap_device_name(network)?;

        Ok(Self {
            interface: interface.clone(),
            tap_device,
            options,
        })
    }

    fn alias(&self) -> String {
        format!("{}{}", USER_ALIAS_PREFIX, self.interface.name)
    }

    fn model(&self) -> &str {
        match self.interface.model.as_deref() {
            Some(model) if !model.is_empty() && model != VIRTIO_MODEL => model,
            _ if self.options.use_virtio_transitional => "virtio-transitional",
            _ => "virtio-non-transitional",
        }
    }

    /// Address from the interface, else the generated one.
    fn mac(&self) -> Option<&str> {
        if !self.interface.mac_address.is_empty() {
            Some(self.interface.mac_address.as_str())
        } else {
            self.options.mac.as_deref()
        }
    }

    fn write_interface<W: std::io::Write>(&self, writer: &mut Writer<W>) -> HookResult<()> {
        let alias = self.alias();
        let mut events = vec![
            Event::Start(BytesStart::new("interface").with_attributes([("type", "ethernet")])),
            Event::Empty(BytesStart::new("alias").with_attributes([("name", alias.as_str())])),
            Event::Empty(BytesStart::new("target").with_attributes([
                ("dev", self.tap_device.as_str()),
                ("managed", "no"),
            ])),
            Event::Empty(BytesStart::new("model").with_attributes([("type", self.model())])),
        ];
        if let Some(mac) = self.mac() {
            events.push(Event::Empty(
                BytesStart::new("mac").with_attributes([("address", mac)]),
            ));
        }
        events.push(Event::End(BytesEnd::new("interface")));

        for event in events {
            writer.write_event(event).map_err(mutation_error)?;
        }
        Ok(())
    }

    /// Whether `<devices>` already holds an interface with our alias.
    fn has_interface(&self, domain_xml: &[u8]) -> HookResult<bool> {
        let alias = self.alias();
        let mut reader = Reader::from_reader(domain_xml);
        let mut path: Vec<Vec<u8>> = Vec::new();

        loop {
            match reader.read_event().map_err(mutation_error)? {
                Event::Start(e) => {
                    if is_interface_alias(&path, &e, &alias)? {
                        return Ok(true);
                    }
                    path.push(e.name().as_ref().to_vec());
                }
                Event::Empty(e) => {
                    if is_interface_alias(&path, &e, &alias)? {
                        return Ok(true);
                    }
                }
                Event::End(_) => {
                    path.pop();
                }
                Event::Eof => return Ok(false),
                _ => {}
            }
        }
    }
}

impl NetworkConfigurator for BridgeNetworkConfigurator {
    fn mutate(&self, domain_xml: &[u8]) -> HookResult<Vec<u8>> {
        if self.has_interface(domain_xml)? {
            debug!(alias = %self.alias(), "Interface already defined, domain unchanged");
            return Ok(domain_xml.to_vec());
        }

        let mut reader = Reader::from_reader(domain_xml);
        let mut writer = Writer::new(Vec::with_capacity(domain_xml.len() + 256));
        let mut path: Vec<Vec<u8>> = Vec::new();
        let mut injected = false;

        loop {
            let event = reader.read_event().map_err(mutation_error)?;
            match event {
                Event::Start(e) => {
                    path.push(e.name().as_ref().to_vec());
                    writer.write_event(Event::Start(e)).map_err(mutation_error)?;
                }
                Event::End(e) => {
                    if !injected && is_domain_devices(&path) {
                        self.write_interface(&mut writer)?;
                        injected = true;
                    }
                    path.pop();
                    writer.write_event(Event::End(e)).map_err(mutation_error)?;
                }
                Event::Empty(e) if !injected && is_devices_child(&path, &e) => {
                    // <devices/> is expanded so the interface can be nested.
                    let end = e.to_end().into_owned();
                    writer.write_event(Event::Start(e)).map_err(mutation_error)?;
                    self.write_interface(&mut writer)?;
                    writer.write_event(Event::End(end)).map_err(mutation_error)?;
                    injected = true;
                }
                Event::Eof => break,
                other => writer.write_event(other).map_err(mutation_error)?,
            }
        }

        if !injected {
            return Err(HookError::ConfiguratorMutation(
                "domain has no devices element".to_string(),
            ));
        }

        debug!(
            alias = %self.alias(),
            tap = %self.tap_device,
            "Injected bridge interface into domain"
        );
        Ok(writer.into_inner())
    }
}

fn is_bridge_bound(iface: &Interface) -> bool {
    iface.bridge.is_some()
        || iface
            .binding
            .as_ref()
            .is_some_and(|binding| binding.name == BINDING_NAME)
}

/// `tap0` for the pod network, a hash of the network name otherwise.
fn tap_device_name(network: &Network) -> HookResult<String> {
    if network.pod.is_some() {
        return Ok(POD_TAP_DEVICE.to_string());
    }
    if network.multus.is_some() {
        let digest = Sha256::digest(network.name.as_bytes());
        let hash = hex::encode(digest);
        return Ok(format!("tap{}", &hash[..11]));
    }
    Err(HookError::ConfiguratorConstruction(format!(
        "network {:?} is neither a pod nor a multus network",
        network.name
    )))
}

fn is_domain_devices(path: &[Vec<u8>]) -> bool {
    matches!(path, [domain, devices] if domain == b"domain" && devices == b"devices")
}

fn is_devices_child(path: &[Vec<u8>], e: &BytesStart<'_>) -> bool {
    matches!(path, [domain] if domain == b"domain") && e.name().as_ref() == b"devices"
}

fn is_interface_alias(path: &[Vec<u8>], e: &BytesStart<'_>, alias: &str) -> HookResult<bool> {
    let under_interface = matches!(
        path,
        [.., devices, interface] if devices == b"devices" && interface == b"interface"
    );
    if !under_interface || e.name().as_ref() != b"alias" {
        return Ok(false);
    }
    let name = e.try_get_attribute("name").map_err(mutation_error)?;
    match name {
        Some(attr) => Ok(attr.unescape_value().map_err(mutation_error)? == alias),
        None => Ok(false),
    }
}

fn mutation_error(err: impl std::fmt::Display) -> HookError {
    HookError::ConfiguratorMutation(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vmi::{MultusNetwork, PluginBinding, PodNetwork};

    const DOMAIN: &str = r#"<domain type="kvm"><name>default_testvmi</name><devices><disk type="file"/></devices></domain>"#;

    fn bridge_iface(mac: &str) -> Interface {
        Interface {
            name: "default".to_string(),
            mac_address: mac.to_string(),
            binding: Some(PluginBinding {
                name: BINDING_NAME.to_string(),
            }),
            ..Default::default()
        }
    }

    fn pod_network() -> Network {
        Network {
            name: "default".to_string(),
            pod: Some(PodNetwork::default()),
            ..Default::default()
        }
    }

    fn configurator(mac: &str, options: NetworkConfiguratorOptions) -> BridgeNetworkConfigurator {
        BridgeNetworkConfigurator::new(&[bridge_iface(mac)], &[pod_network()], options).unwrap()
    }

    fn mutate_to_string(configurator: &BridgeNetworkConfigurator, domain: &str) -> String {
        String::from_utf8(configurator.mutate(domain.as_bytes()).unwrap()).unwrap()
    }

    #[test]
    fn injects_interface_with_generated_mac() {
        let configurator = configurator(
            "",
            NetworkConfiguratorOptions {
                use_virtio_transitional: false,
                mac: Some("02:00:00:00:00:01".to_string()),
            },
        );

        let domain = mutate_to_string(&configurator, DOMAIN);
        assert_eq!(
            domain,
            concat!(
                r#"<domain type="kvm"><name>default_testvmi</name><devices><disk type="file"/>"#,
                r#"<interface type="ethernet"><alias name="ua-default"/>"#,
                r#"<target dev="tap0" managed="no"/><model type="virtio-non-transitional"/>"#,
                r#"<mac address="02:00:00:00:00:01"/></interface></devices></domain>"#,
            )
        );
    }

    #[test]
    fn interface_mac_wins_and_transitional_model_is_used() {
        let configurator = configurator(
            "02:aa:bb:cc:dd:ee",
            NetworkConfiguratorOptions {
                use_virtio_transitional: true,
                mac: None,
            },
        );

        let domain = mutate_to_string(&configurator, DOMAIN);
        assert!(domain.contains(r#"<mac address="02:aa:bb:cc:dd:ee"/>"#));
        assert!(domain.contains(r#"<model type="virtio-transitional"/>"#));
    }

    #[test]
    fn expands_empty_devices_element() {
        let configurator = configurator("", NetworkConfiguratorOptions::default());
        let domain = mutate_to_string(&configurator, "<domain><devices/></domain>");
        assert!(domain.starts_with(r#"<domain><devices><interface type="ethernet">"#));
        assert!(domain.ends_with("</interface></devices></domain>"));
        assert!(!domain.contains("<mac"));
    }

    #[test]
    fn existing_alias_leaves_domain_unchanged() {
        let configurator = configurator("", NetworkConfiguratorOptions::default());
        let input = r#"<domain><devices><interface type="ethernet"><alias name="ua-default"/></interface></devices></domain>"#;
        assert_eq!(mutate_to_string(&configurator, input), input);
    }

    #[test]
    fn domain_without_devices_is_rejected() {
        let configurator = configurator("", NetworkConfiguratorOptions::default());
        let err = configurator.mutate(b"<domain><name>x</name></domain>").unwrap_err();
        assert!(matches!(err, HookError::ConfiguratorMutation(_)));
    }

    #[test]
    fn malformed_domain_is_rejected() {
        let configurator = configurator("", NetworkConfiguratorOptions::default());
        let err = configurator.mutate(b"<domain><devices></domain>").unwrap_err();
        assert!(matches!(err, HookError::ConfiguratorMutation(_)));
    }

    #[test]
    fn multus_network_gets_hashed_tap_name() {
        let network = Network {
            name: "default".to_string(),
            multus: Some(MultusNetwork {
                network_name: "br-net".to_string(),
                default: false,
            }),
            ..Default::default()
        };
        let configurator = BridgeNetworkConfigurator::new(
            &[bridge_iface("")],
            &[network],
            NetworkConfiguratorOptions::default(),
        )
        .unwrap();
        assert!(configurator.tap_device.starts_with("tap"));
        assert_eq!(configurator.tap_device.len(), 14);
        assert_ne!(configurator.tap_device, POD_TAP_DEVICE);
    }

    #[test]
    fn construction_requires_bridge_interface_and_network() {
        let masquerade = Interface {
            name: "default".to_string(),
            ..Default::default()
        };
        let err = BridgeNetworkConfigurator::new(
            &[masquerade],
            &[pod_network()],
            NetworkConfiguratorOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, HookError::ConfiguratorConstruction(_)));

        let err = BridgeNetworkConfigurator::new(
            &[bridge_iface("")],
            &[],
            NetworkConfiguratorOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, HookError::ConfiguratorConstruction(_)));

        let unsupported = Network {
            name: "default".to_string(),
            ..Default::default()
        };
        let err = BridgeNetworkConfigurator::new(
            &[bridge_iface("")],
            &[unsupported],
            NetworkConfiguratorOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, HookError::ConfiguratorConstruction(_)));
    }
}
