pub mod errors;
pub mod ovirt;
pub mod platform;
pub mod vm;

pub use errors::{PlatformError, PlatformResult};
pub use ovirt::OvirtClient;
pub use platform::Platform;
pub use vm::{
    BootstrapConfig, DeviceAddress, IpVersion, MachineHandle, MachineState, NetworkDevice, VmInfo,
};
