use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use tracing::{debug, info};

use super::PollBudget;
use crate::core::{MachineHandle, NetworkDevice, Platform};
use crate::errors::{ProvisionError, ProvisionResult};

/// Machine name to resolved address.
pub type AddressMap = BTreeMap<String, Ipv4Addr>;

/// First IPv4 address on the device called `interface`.
pub fn find_ipv4(devices: &[NetworkDevice], interface: &str) -> Option<Ipv4Addr> {
    devices
        .iter()
        .filter(|dev| dev.name == interface)
        .find_map(NetworkDevice::first_ipv4)
}

/// Waits for every machine's primary interface to report an IPv4 address.
pub async fn resolve_addresses<P>(
    platform: &P,
    machines: &BTreeMap<String, MachineHandle>,
    interface: &str,
    budget: PollBudget,
) -> ProvisionResult<AddressMap>
where
    P: Platform + ?Sized,
{
    let mut addresses = AddressMap::new();

    for (name, handle) in machines {
        let address = budget
            .poll(|attempt| async move {
                let devices = platform.reported_devices(handle).await?;
                let found = find_ipv4(&devices, interface);
                if found.is_none() {
                    debug!(
                        vm = %name,
                        attempt,
                        of = budget.iterations,
                        "Waiting for ip"
                    );
                }
                Ok::<_, ProvisionError>(found)
            })
            .await?;

        match address {
            Some(ip) => {
                info!(vm = %name, %ip, "Address resolved");
                addresses.insert(name.clone(), ip);
            }
            None => {
                return Err(ProvisionError::AddressBudgetExhausted {
                    name: name.clone(),
                    retries: budget.iterations,
                })
            }
        }
    }

    Ok(addresses)
}
