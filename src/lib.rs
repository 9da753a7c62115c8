pub mod cli;
pub mod cluster;
pub mod config;
pub mod core;
pub mod errors;
pub mod provisioning;

// Re-exports
pub use crate::core::{OvirtClient, Platform};
pub use errors::{ProvisionError, ProvisionResult};
pub use provisioning::{
    AddressReport, ClusterTopology, CreationTarget, PollBudget, ProvisionOptions, ProvisionOutcome,
    Provisioner, TopologyCounts,
};
