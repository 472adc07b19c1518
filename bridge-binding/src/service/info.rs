//! Info service implementation.
//!
//! Tells the host which hook points this sidecar wants to be called for.

use crate::service::server::HookServer;
use hooks_shared::constants::hook_points;
use hooks_shared::{HookPoint, Info as InfoService, InfoParams, InfoResult};
use tonic::{Request, Response, Status};
use tracing::debug;

/// Name the sidecar registers under.
pub const SIDECAR_NAME: &str = "network-bridge-binding";

impl HookServer {
    /// Static capability descriptor.
    pub fn info_result(&self) -> InfoResult {
        InfoResult {
            name: SIDECAR_NAME.to_string(),
            versions: vec![self.version().to_string()],
            hook_points: vec![
                HookPoint {
                    name: hook_points::ON_DEFINE_DOMAIN.to_string(),
                    priority: hook_points::DEFAULT_PRIORITY,
                },
                HookPoint {
                    name: hook_points::SHUTDOWN.to_string(),
                    priority: hook_points::DEFAULT_PRIORITY,
                },
            ],
        }
    }
}

#[tonic::async_trait]
impl InfoService for HookServer {
    async fn info(&self, _request: Request<InfoParams>) -> Result<Response<InfoResult>, Status> {
        debug!("Received info request");
        Ok(Response::new(self.info_result()))
    }
}
