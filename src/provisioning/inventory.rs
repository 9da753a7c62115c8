use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::core::{MachineHandle, Platform};
use crate::errors::{ProvisionError, ProvisionResult};

/// Result of comparing the desired machine names with what already exists.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Inventory {
    pub existing: BTreeMap<String, MachineHandle>,
    /// Names with no machine yet, in the order they were requested.
    pub missing: Vec<String>,
}

impl Inventory {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Looks up every name exactly once. Read-only.
///
/// Zero matches means the machine must be created; more than one is an
/// inconsistency we refuse to guess about.
pub async fn partition<P>(platform: &P, names: &[String]) -> ProvisionResult<Inventory>
where
    P: Platform + ?Sized,
{
    let mut inventory = Inventory::default();

    for name in names {
        let mut matches = platform.find_by_name(name).await?;
        debug!(vm = %name, matches = matches.len(), "Inventory lookup");
        match matches.len() {
            0 => inventory.missing.push(name.clone()),
            1 => {
                info!(vm = %name, "VM was found, skipping creation");
                let handle = matches.remove(0);
                inventory.existing.insert(name.clone(), handle);
            }
            count => {
                return Err(ProvisionError::AmbiguousInventory {
                    name: name.clone(),
                    count,
                })
            }
        }
    }

    Ok(inventory)
}
