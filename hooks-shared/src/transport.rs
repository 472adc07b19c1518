//! Listen address of a hook sidecar.

use std::fmt;
use std::path::PathBuf;

/// Where a sidecar accepts connections from the host.
///
/// The host discovers sidecars through Unix sockets in its hooks directory;
/// loopback TCP is only meant for local debugging.
#[derive(Clone, Debug, PartialEq)]
pub enum Transport {
    Unix { socket_path: PathBuf },
    Tcp { port: u16 },
}

impl Transport {
    pub fn unix(socket_path: impl Into<PathBuf>) -> Self {
        Self::Unix {
            socket_path: socket_path.into(),
        }
    }

    pub fn tcp(port: u16) -> Self {
        Self::Tcp { port }
    }

    /// Parse `unix:///path/to.sock` or `tcp://host:port`.
    ///
    /// The host part of a TCP URI is ignored: the sidecar always binds the
    /// loopback interface.
    pub fn from_uri(uri: &str) -> Result<Self, String> {
        if let Some(path) = uri.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(format!("invalid unix URI '{}': missing socket path", uri));
            }
            return Ok(Self::unix(path));
        }

        let Some(rest) = uri.strip_prefix("tcp://") else {
            return Err(format!(
                "invalid listen URI '{}': expected unix:// or tcp://",
                uri
            ));
        };
        let (_, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| format!("invalid TCP URI '{}': missing port", uri))?;
        port.parse::<u16>()
            .map(Self::tcp)
            .map_err(|e| format!("invalid TCP port in '{}': {}", uri, e))
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Unix { socket_path } => write!(f, "unix://{}", socket_path.display()),
            Transport::Tcp { port } => write!(f, "tcp://127.0.0.1:{}", port),
        }
    }
}
