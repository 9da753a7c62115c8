use async_trait::async_trait;

use super::errors::PlatformResult;
use super::vm::{BootstrapConfig, MachineHandle, NetworkDevice, VmInfo};

/// The virtualization platform as seen by the provisioning pipeline.
///
/// Every method is an independent remote call. Implementations are shared by
/// reference across concurrently polled futures, so they must not rely on
/// exclusive access.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Exact-name lookup. Returns every match; callers decide what more than
    /// one match means.
    async fn find_by_name(&self, name: &str) -> PlatformResult<Vec<MachineHandle>>;

    /// Creates a machine from `template` inside `cluster`. Resolves once the
    /// platform has accepted the request.
    async fn create_vm(
        &self,
        name: &str,
        cluster: &str,
        template: &str,
    ) -> PlatformResult<MachineHandle>;

    /// Requests a start with first-boot configuration.
    async fn start_vm(&self, vm: &MachineHandle, bootstrap: &BootstrapConfig)
        -> PlatformResult<()>;

    async fn vm_info(&self, vm: &MachineHandle) -> PlatformResult<VmInfo>;

    /// Devices reported by the guest agent, in platform order.
    async fn reported_devices(&self, vm: &MachineHandle) -> PlatformResult<Vec<NetworkDevice>>;

    /// Every machine visible to the caller.
    async fn list_vms(&self) -> PlatformResult<Vec<MachineHandle>>;

    /// Releases the session. Safe to call once after all requests completed.
    async fn close(&self) -> PlatformResult<()>;
}
