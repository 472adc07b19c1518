//! Callbacks service implementation.
//!
//! Handles the v1alpha3 hook points (OnDefineDomain, PreCloudInitIso,
//! Shutdown).

use crate::domain::NetworkConfiguratorOptions;
use crate::mac::format_mac;
use crate::service::server::HookServer;
use crate::vmi::VirtualMachineInstance;
use hooks_shared::{
    Callbacks as CallbacksService, HookError, HookResult, OnDefineDomainParams,
    OnDefineDomainResult, PreCloudInitIsoParams, PreCloudInitIsoResult, ShutdownParams,
    ShutdownResult,
};
use tonic::{Request, Response, Status};
use tracing::{debug, error, info};

impl HookServer {
    /// Rewrite the domain so the bridge-bound interface is backed by its tap
    /// device.
    ///
    /// The address of the first interface is handed to the DHCP responder on
    /// every call. An interface without an address gets a generated one,
    /// which is passed to the configurator for injection.
    pub fn define_domain(&self, vmi: &[u8], domain_xml: &[u8]) -> HookResult<Vec<u8>> {
        let vmi: VirtualMachineInstance = serde_json::from_slice(vmi)?;
        let devices = &vmi.spec.domain.devices;

        let mut opts = NetworkConfiguratorOptions {
            use_virtio_transitional: devices.virtio_transitional(),
            mac: None,
        };

        let first = devices.interfaces.first().ok_or(HookError::NoInterfaces)?;
        let vmi_mac = if first.mac_address.is_empty() {
            let generated = format_mac(&self.mac_generator().generate(&vmi));
            info!(mac = %generated, "Evaluated VMI mac");
            opts.mac = Some(generated.clone());
            generated
        } else {
            first.mac_address.clone()
        };

        self.handoff().publish(&vmi_mac);

        let configurator =
            self.configurators()
                .build(&devices.interfaces, &vmi.spec.networks, opts)?;

        configurator.mutate(domain_xml)
    }
}

#[tonic::async_trait]
impl CallbacksService for HookServer {
    async fn on_define_domain(
        &self,
        request: Request<OnDefineDomainParams>,
    ) -> Result<Response<OnDefineDomainResult>, Status> {
        let params = request.into_inner();
        debug!("Received onDefineDomain request");

        match self.define_domain(&params.vmi, &params.domain_xml) {
            Ok(domain_xml) => Ok(Response::new(OnDefineDomainResult { domain_xml })),
            Err(e) => {
                error!(error = %e, "onDefineDomain failed");
                Err(e.into())
            }
        }
    }

    async fn pre_cloud_init_iso(
        &self,
        request: Request<PreCloudInitIsoParams>,
    ) -> Result<Response<PreCloudInitIsoResult>, Status> {
        let params = request.into_inner();
        Ok(Response::new(PreCloudInitIsoResult {
            cloud_init_data: params.cloud_init_data,
        }))
    }

    async fn shutdown(
        &self,
        _request: Request<ShutdownParams>,
    ) -> Result<Response<ShutdownResult>, Status> {
        info!("Shutdown bridge network binding");
        self.shutdown_sender().request().await;
        Ok(Response::new(ShutdownResult {}))
    }
}
