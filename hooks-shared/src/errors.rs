//! Error types shared by hook sidecars.

use thiserror::Error;

/// Errors produced while serving hook callbacks.
#[derive(Debug, Error)]
pub enum HookError {
    /// The VirtualMachineInstance payload did not match the expected schema.
    #[error("failed to unmarshal VMI: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The VirtualMachineInstance declares no network interfaces.
    #[error("VMI has no network interfaces")]
    NoInterfaces,

    /// The network configurator could not be built for the given interfaces.
    #[error("failed to create bridge configurator: {0}")]
    ConfiguratorConstruction(String),

    /// The domain XML could not be rewritten.
    #[error("failed to mutate domain: {0}")]
    ConfiguratorMutation(String),

    /// Listener or server failure.
    #[error("transport: {0}")]
    Transport(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type HookResult<T> = Result<T, HookError>;

impl From<tonic::transport::Error> for HookError {
    fn from(err: tonic::transport::Error) -> Self {
        HookError::Transport(err.to_string())
    }
}

/// Hook callback failures are reported to the host as plain call failures.
impl From<HookError> for tonic::Status {
    fn from(err: HookError) -> Self {
        tonic::Status::unknown(err.to_string())
    }
}
