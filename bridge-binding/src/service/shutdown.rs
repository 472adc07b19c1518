//! Shutdown request from the host.
//!
//! The Shutdown callback hands a single value to the lifecycle coordinator,
//! which then drains the server. The channel holds one request, so the
//! sender returns once the request is queued, not once the coordinator has
//! taken it. A coordinator already draining for a signal never takes it.

use tokio::sync::mpsc;
use tracing::warn;

/// Create the shutdown channel. Called once per process.
pub fn channel() -> (ShutdownSender, ShutdownReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (ShutdownSender { tx }, ShutdownReceiver { rx })
}

/// Sending half, owned by the callbacks service.
///
/// [`request`](Self::request) returns after the request is queued for the
/// coordinator; the Shutdown RPC therefore answers before the drain starts.
#[derive(Clone, Debug)]
pub struct ShutdownSender {
    tx: mpsc::Sender<()>,
}

impl ShutdownSender {
    /// Queue a stop request for the coordinator. Waits only while an earlier
    /// request is still queued.
    pub async fn request(&self) {
        if self.tx.send(()).await.is_err() {
            warn!("Lifecycle coordinator is gone, shutdown request dropped");
        }
    }
}

/// Receiving half, owned by the lifecycle coordinator.
#[derive(Debug)]
pub struct ShutdownReceiver {
    rx: mpsc::Receiver<()>,
}

impl ShutdownReceiver {
    /// Wait for a shutdown request. Returns `false` if every sender was
    /// dropped without requesting one.
    pub async fn requested(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}
