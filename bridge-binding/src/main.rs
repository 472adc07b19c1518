//! Entry point for the network bridge binding hook sidecar.

use anyhow::Context;
use bridge_binding::service::shutdown;
use bridge_binding::{handoff, HookServer, StopReason};
use clap::Parser;
use hooks_shared::constants::versions;
use hooks_shared::Transport;
use tracing::{error, info};

/// Network bridge binding - hook sidecar for bridged VM networking
#[derive(Parser, Debug)]
#[command(author, about = "Network bridge binding hook sidecar")]
struct Args {
    /// Listen URI the host connects to
    ///
    /// Examples:
    ///   --listen unix:///var/run/kubevirt-hooks/network-bridge-binding.sock
    ///   --listen tcp://127.0.0.1:9090
    #[arg(
        short,
        long,
        env = "BRIDGE_BINDING_LISTEN",
        default_value = "unix:///var/run/kubevirt-hooks/network-bridge-binding.sock"
    )]
    listen: String,

    /// Hook callbacks version advertised to the host
    #[arg(long, env = "BRIDGE_BINDING_HOOK_VERSION", default_value = versions::V1ALPHA3)]
    version: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Respects RUST_LOG, defaults to info
    if let Err(e) = tracing_subscriber::fmt()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
    {
        eprintln!("[ERROR] Failed to initialize tracing: {}", e);
    }

    let args = Args::parse();
    let transport = Transport::from_uri(&args.listen)
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("invalid listen URI '{}'", args.listen))?;

    info!(version = %args.version, listen = %transport, "Starting network bridge binding");

    let (address_handoff, addresses) = handoff::channel();
    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    tokio::spawn(handoff::run_consumer(addresses));

    let server = HookServer::new(args.version, address_handoff, shutdown_tx);
    match server.run(transport, shutdown_rx).await? {
        StopReason::ServeError(e) => {
            error!(error = %e, "Hook server failed");
            Err(e.into())
        }
        reason => {
            info!(?reason, "Hook server stopped");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_hooks_socket_and_v1alpha3() {
        let args = Args::try_parse_from(["network-bridge-binding"]).unwrap();
        assert_eq!(
            args.listen,
            "unix:///var/run/kubevirt-hooks/network-bridge-binding.sock"
        );
        assert_eq!(args.version, "v1alpha3");
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "network-bridge-binding",
            "--listen",
            "tcp://127.0.0.1:9090",
            "--version",
            "v1alpha2",
        ])
        .unwrap();
        assert_eq!(args.listen, "tcp://127.0.0.1:9090");
        assert_eq!(args.version, "v1alpha2");
    }
}
