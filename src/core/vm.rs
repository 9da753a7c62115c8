use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Reference to a machine the platform knows about.
///
/// Bound to a machine name once the machine is known to exist, either because
/// it was found by the inventory lookup or because we just created it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineHandle {
    pub id: String,
    pub name: String,
}

impl MachineHandle {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for MachineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Runtime state as reported by the platform. Never cached, every decision
/// re-reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    Unknown,
    Down,
    Starting,
    Up,
}

impl MachineState {
    /// Maps an oVirt `vm.status` string onto the states the pipeline cares about.
    pub fn from_platform_status(status: &str) -> Self {
        match status {
            "down" => MachineState::Down,
            "up" => MachineState::Up,
            "powering_up" | "wait_for_launch" | "reboot_in_progress" | "restoring_state" => {
                MachineState::Starting
            }
            _ => MachineState::Unknown,
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineState::Unknown => write!(f, "unknown"),
            MachineState::Down => write!(f, "down"),
            MachineState::Starting => write!(f, "starting"),
            MachineState::Up => write!(f, "up"),
        }
    }
}

/// One fresh read of a machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInfo {
    pub handle: MachineHandle,
    pub state: MachineState,
    pub fqdn: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpVersion {
    V4,
    V6,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAddress {
    pub address: String,
    pub version: IpVersion,
}

/// A network device as reported by the guest agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDevice {
    pub name: String,
    pub addresses: Vec<DeviceAddress>,
}

impl NetworkDevice {
    /// First IPv4 address on this device that actually parses as one.
    pub fn first_ipv4(&self) -> Option<Ipv4Addr> {
        self.addresses
            .iter()
            .filter(|a| a.version == IpVersion::V4)
            .find_map(|a| a.address.parse().ok())
    }
}

/// Data injected at first boot through cloud-init.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub authorized_ssh_keys: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_status_mapping() {
        assert_eq!(MachineState::from_platform_status("down"), MachineState::Down);
        assert_eq!(MachineState::from_platform_status("up"), MachineState::Up);
        assert_eq!(
            MachineState::from_platform_status("powering_up"),
            MachineState::Starting
        );
        assert_eq!(
            MachineState::from_platform_status("wait_for_launch"),
            MachineState::Starting
        );
        assert_eq!(
            MachineState::from_platform_status("image_locked"),
            MachineState::Unknown
        );
    }

    #[test]
    fn first_ipv4_skips_v6_and_garbage() {
        let dev = NetworkDevice {
            name: "eth0".into(),
            addresses: vec![
                DeviceAddress {
                    address: "fe80::1".into(),
                    version: IpVersion::V6,
                },
                DeviceAddress {
                    address: "not-an-ip".into(),
                    version: IpVersion::V4,
                },
                DeviceAddress {
                    address: "10.0.0.7".into(),
                    version: IpVersion::V4,
                },
            ],
        };
        assert_eq!(dev.first_ipv4(), Some(Ipv4Addr::new(10, 0, 0, 7)));
    }
}
