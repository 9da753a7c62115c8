use std::collections::BTreeMap;
use tracing::{debug, info};

use super::PollBudget;
use crate::core::{MachineHandle, MachineState, Platform};
use crate::errors::{ProvisionError, ProvisionResult};

/// Polls each machine in turn until it reports `Up`. Fails on the first
/// machine whose budget runs out.
pub async fn wait_until_up<P>(
    platform: &P,
    machines: &BTreeMap<String, MachineHandle>,
    budget: PollBudget,
) -> ProvisionResult<()>
where
    P: Platform + ?Sized,
{
    for (name, handle) in machines {
        let up = budget
            .poll(|attempt| async move {
                let info = platform.vm_info(handle).await?;
                debug!(
                    vm = %name,
                    status = %info.state,
                    fqdn = info.fqdn.as_deref().unwrap_or(""),
                    attempt,
                    "VM status"
                );
                Ok::<_, ProvisionError>((info.state == MachineState::Up).then_some(()))
            })
            .await?;

        if up.is_none() {
            return Err(ProvisionError::ConvergenceBudgetExhausted {
                name: name.clone(),
                retries: budget.iterations,
            });
        }
        info!(vm = %name, "VM is up");
    }
    Ok(())
}
