//! The provisioning pipeline.
//!
//! naming -> inventory -> batch creation -> startup -> convergence ->
//! address resolution -> report. Every stage either hands its output to the
//! next one or aborts the whole run.

pub mod address;
pub mod batch;
pub mod convergence;
pub mod inventory;
pub mod naming;
pub mod report;
pub mod startup;

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::info;

use crate::core::{BootstrapConfig, MachineHandle, Platform};
use crate::errors::{ProvisionError, ProvisionResult};

pub use address::AddressMap;
pub use inventory::Inventory;
pub use naming::{ClusterTopology, MachineSpec, Role, TopologyCounts};
pub use report::AddressReport;
pub use startup::StartupReport;

/// How many times to look and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub iterations: usize,
    pub settle_delay: Duration,
}

impl PollBudget {
    /// Runs `check` up to `iterations` times, sleeping between attempts but
    /// not after the last one. `Ok(None)` means the budget ran out.
    pub async fn poll<T, F, Fut>(&self, mut check: F) -> ProvisionResult<Option<T>>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = ProvisionResult<Option<T>>>,
    {
        for attempt in 1..=self.iterations {
            if let Some(value) = check(attempt).await? {
                return Ok(Some(value));
            }
            if attempt < self.iterations {
                tokio::time::sleep(self.settle_delay).await;
            }
        }
        Ok(None)
    }
}

/// Where new machines go and what they boot with.
#[derive(Debug, Clone)]
pub struct CreationTarget {
    pub cluster: String,
    pub template: String,
    pub bootstrap: BootstrapConfig,
}

/// Everything a run needs besides the platform and the topology.
///
/// `creation` is only needed by [`Provisioner::provision`]; info runs leave
/// it out.
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    pub creation: Option<CreationTarget>,
    pub batch_size: usize,
    pub budget: PollBudget,
    pub primary_interface: String,
}

impl ProvisionOptions {
    pub fn validate(&self) -> ProvisionResult<()> {
        if let Some(target) = &self.creation {
            if target.cluster.trim().is_empty() {
                return Err(ProvisionError::Config("cluster can't be empty".into()));
            }
            if target.template.trim().is_empty() {
                return Err(ProvisionError::Config("template can't be empty".into()));
            }
        }
        if self.batch_size == 0 {
            return Err(ProvisionError::Config("batch size must be positive".into()));
        }
        if self.budget.iterations == 0 {
            return Err(ProvisionError::Config(
                "number of iterations must be positive".into(),
            ));
        }
        if self.primary_interface.trim().is_empty() {
            return Err(ProvisionError::Config("primary interface can't be empty".into()));
        }
        Ok(())
    }
}

/// What a successful run did and found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    pub created: Vec<String>,
    pub startup: StartupReport,
    pub addresses: AddressMap,
    pub report: AddressReport,
}

/// Drives the pipeline against one platform session.
pub struct Provisioner<'a, P: Platform + ?Sized> {
    platform: &'a P,
    options: ProvisionOptions,
}

impl<'a, P: Platform + ?Sized> Provisioner<'a, P> {
    pub fn new(platform: &'a P, options: ProvisionOptions) -> ProvisionResult<Self> {
        options.validate()?;
        Ok(Self { platform, options })
    }

    /// Makes sure every machine of `topology` exists, is running and has an
    /// address. Machines that already exist are reused as they are.
    pub async fn provision(&self, topology: &ClusterTopology) -> ProvisionResult<ProvisionOutcome> {
        let target = self.options.creation.as_ref().ok_or_else(|| {
            ProvisionError::Config("cluster, template and public key are required to provision".into())
        })?;
        let names = topology.names();
        info!(machines = names.len(), "Provisioning cluster");

        let Inventory {
            mut existing,
            missing,
        } = inventory::partition(self.platform, &names).await?;

        let created = batch::create_missing(
            self.platform,
            &missing,
            &target.cluster,
            &target.template,
            self.options.batch_size,
            self.options.budget.settle_delay,
        )
        .await?;
        existing.extend(created);
        let machines = existing;

        let startup = startup::start_all(
            self.platform,
            &machines,
            &target.bootstrap,
            self.options.budget,
        )
        .await?;

        convergence::wait_until_up(self.platform, &machines, self.options.budget).await?;
        let addresses = self.resolve(topology, &machines).await?;

        Ok(ProvisionOutcome {
            created: missing,
            startup,
            report: AddressReport::from_addresses(&addresses),
            addresses,
        })
    }

    /// Resolves and reports addresses of an already provisioned topology
    /// without creating or starting anything.
    pub async fn info(&self, topology: &ClusterTopology) -> ProvisionResult<AddressReport> {
        let inventory = inventory::partition(self.platform, &topology.names()).await?;
        if !inventory.is_complete() {
            return Err(ProvisionError::InventoryMismatch {
                missing: inventory.missing,
            });
        }
        let addresses = self.resolve(topology, &inventory.existing).await?;
        Ok(AddressReport::from_addresses(&addresses))
    }

    async fn resolve(
        &self,
        topology: &ClusterTopology,
        machines: &BTreeMap<String, MachineHandle>,
    ) -> ProvisionResult<AddressMap> {
        let addresses = address::resolve_addresses(
            self.platform,
            machines,
            &self.options.primary_interface,
            self.options.budget,
        )
        .await?;

        if addresses.len() != topology.len() {
            let missing = topology
                .names()
                .into_iter()
                .filter(|name| !addresses.contains_key(name))
                .collect();
            return Err(ProvisionError::InventoryMismatch { missing });
        }
        Ok(addresses)
    }
}
