//! MAC address handoff to the DHCP responder.
//!
//! The callback handler offers the address of the most recently defined
//! instance over a rendezvous channel. The offer only lands when the
//! responder is already waiting for it; otherwise the address is dropped and
//! the event is logged, so a busy or absent responder cannot stall domain
//! definition and never receives a stale address later.

use tracing::{error, info};

/// Create the handoff channel. Called once per process.
pub fn channel() -> (AddressHandoff, AddressReceiver) {
    // Zero capacity: an address is only handed over to a waiting receiver.
    let (tx, rx) = flume::bounded(0);
    (AddressHandoff { tx }, AddressReceiver { rx })
}

/// Sending half, owned by the callbacks service.
#[derive(Clone, Debug)]
pub struct AddressHandoff {
    tx: flume::Sender<String>,
}

impl AddressHandoff {
    /// Offer `mac` to the consumer without waiting.
    ///
    /// Returns whether a waiting consumer took it. A failed handoff is not an
    /// error for the caller.
    pub fn publish(&self, mac: &str) -> bool {
        match self.tx.try_send(mac.to_string()) {
            Ok(()) => {
                info!(mac = %mac, "Sent MAC address to DHCPd");
                true
            }
            Err(flume::TrySendError::Full(_)) => {
                error!(
                    mac = %mac,
                    reason = "receiver not waiting",
                    "Failed to send MAC address to DHCPd"
                );
                false
            }
            Err(flume::TrySendError::Disconnected(_)) => {
                error!(
                    mac = %mac,
                    reason = "receiver closed",
                    "Failed to send MAC address to DHCPd"
                );
                false
            }
        }
    }
}

/// Receiving half, owned by the DHCP responder.
#[derive(Debug)]
pub struct AddressReceiver {
    rx: flume::Receiver<String>,
}

impl AddressReceiver {
    /// Wait for the next offered address. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv_async().await.ok()
    }
}

/// Consume handed-off addresses until the senders are dropped.
///
/// Stands in for the DHCP responder: it records the address the responder
/// would lease to the guest.
pub async fn run_consumer(mut receiver: AddressReceiver) {
    while let Some(mac) = receiver.recv().await {
        info!(mac = %mac, "DHCP responder received guest MAC address");
    }
    info!("MAC address handoff closed");
}
