//! MAC address generation for interfaces without an explicit address.

use crate::vmi::VirtualMachineInstance;
use macaddr::MacAddr6;
use sha2::{Digest, Sha256};

/// Produces a hardware address for an instance whose first interface has none.
///
/// Implementations must be pure: the same instance always yields the same
/// address, and no state is shared between calls.
pub trait MacGenerator: Send + Sync {
    fn generate(&self, vmi: &VirtualMachineInstance) -> MacAddr6;
}

/// Derives the address from the instance's namespaced name.
///
/// The first six bytes of SHA-256("{namespace}/{name}") are used with the
/// locally-administered bit set and the multicast bit cleared, so restarts of
/// the same instance keep their address.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeterministicMacGenerator;

impl MacGenerator for DeterministicMacGenerator {
    fn generate(&self, vmi: &VirtualMachineInstance) -> MacAddr6 {
        let digest = Sha256::new()
            .chain_update(vmi.metadata.namespace.as_bytes())
            .chain_update(b"/")
            .chain_update(vmi.metadata.name.as_bytes())
            .finalize();

        let mut bytes = [0u8; 6];
        bytes.copy_from_slice(&digest[..6]);
        bytes[0] = (bytes[0] | 0x02) & 0xfe;
        MacAddr6::from(bytes)
    }
}

/// Format an address the way the host writes it: lowercase, colon separated.
pub fn format_mac(mac: &MacAddr6) -> String {
    mac.as_bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}
