use futures_util::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::PollBudget;
use crate::core::{BootstrapConfig, MachineHandle, MachineState, Platform};
use crate::errors::{ProvisionError, ProvisionResult};

/// Which machines got a start request and which were already running.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StartupReport {
    pub started: BTreeSet<String>,
    pub already_running: BTreeSet<String>,
    pub rounds: usize,
}

/// Hands every machine a start request, exactly once.
///
/// Each round reads fresh state for every machine not yet handled: `Down`
/// machines get a start request, `Up` machines are marked handled without
/// one. The round's start requests run concurrently and are all awaited
/// before the next round.
///
/// A round in which no machine could be handled is a stall and fails the run
/// right away. Otherwise the loop runs at most `iterations * machines` rounds,
/// since the budget has to cover the whole set.
pub async fn start_all<P>(
    platform: &P,
    machines: &BTreeMap<String, MachineHandle>,
    bootstrap: &BootstrapConfig,
    budget: PollBudget,
) -> ProvisionResult<StartupReport>
where
    P: Platform + ?Sized,
{
    let mut report = StartupReport::default();
    if machines.is_empty() {
        return Ok(report);
    }

    let max_rounds = budget.iterations.saturating_mul(machines.len());

    for round in 1..=max_rounds {
        report.rounds = round;
        let mut requests = Vec::new();
        let mut progressed = false;

        for (name, handle) in machines {
            if report.started.contains(name) || report.already_running.contains(name) {
                continue;
            }
            let info = platform.vm_info(handle).await?;
            debug!(vm = %name, status = %info.state, round, "VM status");
            match info.state {
                MachineState::Down => {
                    info!(vm = %name, "Starting VM");
                    requests.push(async move {
                        platform
                            .start_vm(handle, bootstrap)
                            .await
                            .map_err(|source| ProvisionError::StartRejected {
                                name: name.clone(),
                                source,
                            })
                    });
                    report.started.insert(name.clone());
                    progressed = true;
                }
                MachineState::Up => {
                    info!(vm = %name, "VM already running, not starting it");
                    report.already_running.insert(name.clone());
                    progressed = true;
                }
                MachineState::Starting | MachineState::Unknown => {}
            }
        }

        debug!(round, batch_size = requests.len(), "Waiting for start requests");
        for result in join_all(requests).await {
            result?;
        }

        if report.started.len() + report.already_running.len() == machines.len() {
            info!(rounds = round, "Start requested for every VM");
            return Ok(report);
        }

        if !progressed {
            warn!(round, "No VM became startable this round, giving up");
            break;
        }

        if round < max_rounds {
            tokio::time::sleep(budget.settle_delay).await;
        }
    }

    let not_started = machines
        .keys()
        .filter(|name| !report.started.contains(*name) && !report.already_running.contains(*name))
        .cloned()
        .collect();

    Err(ProvisionError::StartBudgetExhausted {
        not_started,
        rounds: report.rounds,
        budget: wait_budget(budget.settle_delay, max_rounds),
    })
}

fn wait_budget(settle_delay: Duration, rounds: usize) -> Duration {
    settle_delay.saturating_mul(u32::try_from(rounds).unwrap_or(u32::MAX))
}
