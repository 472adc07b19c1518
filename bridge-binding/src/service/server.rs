use crate::domain::{BridgeConfiguratorFactory, NetworkConfiguratorFactory};
use crate::handoff::AddressHandoff;
use crate::mac::{DeterministicMacGenerator, MacGenerator};
use crate::service::shutdown::{ShutdownReceiver, ShutdownSender};
use hooks_shared::{CallbacksServer, HookError, HookResult, InfoServer, Transport};
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::oneshot;
use tokio_stream::{Stream, StreamExt};
use tonic::transport::server::Connected;
use tonic::transport::Server;
use tracing::{error, info, warn};

/// Hook sidecar server.
///
/// Implements two gRPC services:
/// - Info: hook point negotiation
/// - Callbacks: v1alpha3 hook points (OnDefineDomain, PreCloudInitIso, Shutdown)
///
/// Every call is independent. The only state shared between calls are the
/// address handoff and shutdown senders.
pub struct HookServer {
    version: String,
    handoff: AddressHandoff,
    shutdown: ShutdownSender,
    mac_generator: Arc<dyn MacGenerator>,
    configurators: Arc<dyn NetworkConfiguratorFactory>,
}

/// Why the server stopped serving.
#[derive(Debug)]
pub enum StopReason {
    /// An OS termination signal arrived; the server was drained.
    Signal(String),
    /// The host called Shutdown; the server was drained.
    Shutdown,
    /// The serve loop failed; no drain was attempted.
    ServeError(HookError),
    /// The serve loop ended on its own; no drain was attempted.
    ServeExited,
}

impl HookServer {
    /// Create a server with the deterministic MAC generator and the bridge
    /// configurator.
    pub fn new(
        version: impl Into<String>,
        handoff: AddressHandoff,
        shutdown: ShutdownSender,
    ) -> Self {
        Self {
            version: version.into(),
            handoff,
            shutdown,
            mac_generator: Arc::new(DeterministicMacGenerator),
            configurators: Arc::new(BridgeConfiguratorFactory),
        }
    }

    pub fn with_mac_generator(mut self, mac_generator: Arc<dyn MacGenerator>) -> Self {
        self.mac_generator = mac_generator;
        self
    }

    pub fn with_configurators(
        mut self,
        configurators: Arc<dyn NetworkConfiguratorFactory>,
    ) -> Self {
        self.configurators = configurators;
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub(crate) fn handoff(&self) -> &AddressHandoff {
        &self.handoff
    }

    pub(crate) fn shutdown_sender(&self) -> &ShutdownSender {
        &self.shutdown
    }

    pub(crate) fn mac_generator(&self) -> &dyn MacGenerator {
        self.mac_generator.as_ref()
    }

    pub(crate) fn configurators(&self) -> &dyn NetworkConfiguratorFactory {
        self.configurators.as_ref()
    }

    /// Bind the transport and serve until a termination signal, a serve
    /// failure or a Shutdown call.
    pub async fn run(
        self,
        transport: Transport,
        shutdown: ShutdownReceiver,
    ) -> HookResult<StopReason> {
        let signals = termination_signals()?;

        match transport {
            Transport::Unix { socket_path } => {
                use tokio_stream::wrappers::UnixListenerStream;

                // Remove socket if it exists
                if socket_path.exists() {
                    std::fs::remove_file(&socket_path)?;
                }

                // Ensure parent directory exists
                if let Some(parent) = socket_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }

                let listener = tokio::net::UnixListener::bind(&socket_path).map_err(|e| {
                    HookError::Transport(format!(
                        "failed to bind {}: {}",
                        socket_path.display(),
                        e
                    ))
                })?;
                info!(path = %socket_path.display(), transport = "unix", "Hook server listening");

                Ok(self
                    .serve(UnixListenerStream::new(listener), shutdown, signals)
                    .await)
            }

            Transport::Tcp { port } => {
                use tokio_stream::wrappers::TcpListenerStream;

                let addr = format!("127.0.0.1:{}", port);
                let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
                    HookError::Transport(format!("failed to bind {}: {}", addr, e))
                })?;
                info!(%addr, transport = "tcp", "Hook server listening");

                Ok(self
                    .serve(TcpListenerStream::new(listener), shutdown, signals)
                    .await)
            }
        }
    }

    /// Serve on a pre-bound listener.
    ///
    /// Races three events and acts on whichever comes first:
    /// - `signals` resolves: drain the server
    /// - a Shutdown call arrives on `shutdown`: drain the server
    /// - the listener fails or the serve loop ends: no drain, the server is
    ///   already unusable
    ///
    /// Draining stops accepting connections and lets in-flight calls finish.
    /// Later events are ignored.
    pub async fn serve<I, IO, IE, S>(
        self,
        incoming: I,
        mut shutdown: ShutdownReceiver,
        signals: S,
    ) -> StopReason
    where
        I: Stream<Item = Result<IO, IE>> + Send + 'static,
        IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
        IO::ConnectInfo: Clone + Send + Sync + 'static,
        IE: Into<Box<dyn std::error::Error + Send + Sync>> + Send + 'static,
        S: Future<Output = String>,
    {
        let server = Arc::new(self);
        let (drain_tx, drain_rx) = oneshot::channel::<()>();
        let (failed_tx, mut listener_failed) = oneshot::channel::<HookError>();
        let incoming = stop_on_listener_error(incoming, failed_tx);

        let router = Server::builder()
            .add_service(InfoServer::from_arc(server.clone()))
            .add_service(CallbacksServer::from_arc(server));

        let mut serve_task = tokio::spawn(router.serve_with_incoming_shutdown(
            incoming,
            async move {
                let _ = drain_rx.await;
            },
        ));

        tokio::pin!(signals);

        // The listener failure is reported before the stream ends, so it is
        // polled ahead of the serve task.
        let reason = tokio::select! {
            biased;

            name = &mut signals => {
                info!(signal = %name, "bridge sidecar received signal");
                StopReason::Signal(name)
            }
            true = shutdown.requested() => {
                info!("Exiting");
                StopReason::Shutdown
            }
            Ok(e) = &mut listener_failed => {
                error!(error = %e, "Failed to run grpc server");
                serve_task.abort();
                return StopReason::ServeError(e);
            }
            outcome = &mut serve_task => {
                return match outcome {
                    Ok(Ok(())) => {
                        warn!("gRPC server stopped without a shutdown request");
                        StopReason::ServeExited
                    }
                    Ok(Err(e)) => {
                        error!(error = %e, "Failed to run grpc server");
                        StopReason::ServeError(e.into())
                    }
                    Err(e) => {
                        error!(error = %e, "gRPC server task failed");
                        StopReason::ServeError(HookError::Transport(e.to_string()))
                    }
                };
            }
        };

        // Graceful stop: refuse new calls, finish in-flight ones.
        let _ = drain_tx.send(());
        match serve_task.await {
            Ok(Ok(())) => info!("gRPC server stopped gracefully"),
            Ok(Err(e)) => warn!(error = %e, "gRPC server failed while draining"),
            Err(e) => warn!(error = %e, "gRPC server task failed while draining"),
        }

        reason
    }
}

/// Pass connections through until the listener fails.
///
/// The serve loop skips accept errors, so a broken listener would never stop
/// it. The first error that is not tied to a single connection is sent on
/// `failed` and ends the stream.
fn stop_on_listener_error<I, IO, IE>(
    incoming: I,
    failed: oneshot::Sender<HookError>,
) -> impl Stream<Item = Result<IO, io::Error>> + Send + 'static
where
    I: Stream<Item = Result<IO, IE>> + Send + 'static,
    IO: Send + 'static,
    IE: Into<Box<dyn std::error::Error + Send + Sync>> + Send + 'static,
{
    let mut failed = Some(failed);
    incoming.map_while(move |conn| {
        let err: Box<dyn std::error::Error + Send + Sync> = match conn {
            Ok(io) => return Some(Ok(io)),
            Err(e) => e.into(),
        };
        let err = match err.downcast::<io::Error>() {
            Ok(err) if is_connection_error(&err) => return Some(Err(*err)),
            Ok(err) => HookError::Transport(err.to_string()),
            Err(err) => HookError::Transport(err.to_string()),
        };
        if let Some(failed) = failed.take() {
            let _ = failed.send(err);
        }
        None
    })
}

/// Accept errors that only affect the connection being accepted.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

/// Install handlers for SIGHUP, SIGINT, SIGTERM and SIGQUIT.
///
/// The returned future resolves with the name of the first signal received.
/// Handlers are installed before returning so no signal is missed between
/// installation and the first poll.
pub fn termination_signals() -> HookResult<impl Future<Output = String>> {
    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    Ok(async move {
        let name = tokio::select! {
            _ = hangup.recv() => "SIGHUP",
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
            _ = quit.recv() => "SIGQUIT",
        };
        name.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff;
    use crate::service::shutdown;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_stream::wrappers::TcpListenerStream;

    fn server() -> (HookServer, ShutdownSender, ShutdownReceiver) {
        let (handoff, _) = handoff::channel();
        let (sender, receiver) = shutdown::channel();
        (HookServer::new("v1alpha3", handoff, sender.clone()), sender, receiver)
    }

    async fn listener() -> TcpListenerStream {
        TcpListenerStream::new(TcpListener::bind("127.0.0.1:0").await.unwrap())
    }

    #[tokio::test]
    async fn signal_drains_server() {
        let (server, _sender, receiver) = server();
        let (signal_tx, signal_rx) = oneshot::channel::<()>();

        let coordinator = tokio::spawn(server.serve(listener().await, receiver, async move {
            let _ = signal_rx.await;
            "SIGTERM".to_string()
        }));

        signal_tx.send(()).unwrap();
        let reason = tokio::time::timeout(Duration::from_secs(5), coordinator)
            .await
            .expect("coordinator should stop")
            .unwrap();
        assert!(matches!(reason, StopReason::Signal(ref name) if name == "SIGTERM"));
    }

    #[tokio::test]
    async fn shutdown_request_drains_server() {
        let (server, sender, receiver) = server();

        let coordinator = tokio::spawn(server.serve(
            listener().await,
            receiver,
            std::future::pending::<String>(),
        ));

        sender.request().await;
        let reason = tokio::time::timeout(Duration::from_secs(5), coordinator)
            .await
            .expect("coordinator should stop")
            .unwrap();
        assert!(matches!(reason, StopReason::Shutdown));
    }

    #[tokio::test]
    async fn exhausted_listener_is_reported() {
        let (server, _sender, receiver) = server();
        let incoming = tokio_stream::empty::<Result<tokio::net::TcpStream, std::io::Error>>();

        let reason = tokio::time::timeout(
            Duration::from_secs(5),
            server.serve(incoming, receiver, std::future::pending::<String>()),
        )
        .await
        .expect("coordinator should stop");
        assert!(matches!(reason, StopReason::ServeExited));
    }

    #[tokio::test]
    async fn listener_failure_stops_without_drain() {
        let (server, _sender, receiver) = server();
        let incoming = tokio_stream::iter(vec![Err::<TcpStream, _>(io::Error::other(
            "listener broke",
        ))]);

        let reason = tokio::time::timeout(
            Duration::from_secs(5),
            server.serve(incoming, receiver, std::future::pending::<String>()),
        )
        .await
        .expect("coordinator should stop");
        assert!(matches!(
            reason,
            StopReason::ServeError(HookError::Transport(ref msg)) if msg.contains("listener broke")
        ));
    }

    #[tokio::test]
    async fn connection_errors_do_not_stop_server() {
        let (server, _sender, receiver) = server();
        let incoming = tokio_stream::iter(vec![
            Err::<TcpStream, _>(io::Error::from(io::ErrorKind::ConnectionAborted)),
            Err(io::Error::from(io::ErrorKind::ConnectionReset)),
        ]);

        let reason = tokio::time::timeout(
            Duration::from_secs(5),
            server.serve(incoming, receiver, std::future::pending::<String>()),
        )
        .await
        .expect("coordinator should stop");
        assert!(matches!(reason, StopReason::ServeExited));
    }

    #[tokio::test]
    async fn listener_failure_after_signal_is_ignored() {
        let (server, _sender, receiver) = server();
        let incoming = tokio_stream::iter(vec![Err::<TcpStream, _>(io::Error::other(
            "listener broke",
        ))]);

        let reason = tokio::time::timeout(
            Duration::from_secs(5),
            server.serve(incoming, receiver, async { "SIGINT".to_string() }),
        )
        .await
        .expect("coordinator should stop");
        assert!(matches!(reason, StopReason::Signal(ref name) if name == "SIGINT"));
    }

    #[test]
    fn per_connection_errors_are_not_listener_failures() {
        assert!(is_connection_error(&io::ErrorKind::ConnectionReset.into()));
        assert!(is_connection_error(&io::ErrorKind::Interrupted.into()));
        assert!(!is_connection_error(&io::Error::other("EMFILE")));
        assert!(!is_connection_error(&io::ErrorKind::PermissionDenied.into()));
    }

    #[tokio::test]
    async fn tcp_port_in_use_is_a_transport_error() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = occupied.local_addr().unwrap().port();
        let (server, _sender, receiver) = server();

        let err = server.run(Transport::tcp(port), receiver).await.unwrap_err();
        assert!(matches!(err, HookError::Transport(_)));
    }
}
