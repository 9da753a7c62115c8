use std::time::Duration;
use thiserror::Error;

use crate::core::PlatformError;

/// Every way a provisioning run can fail. Each one aborts the whole run.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Platform Error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Ambiguous inventory: {count} machines are named '{name}'")]
    AmbiguousInventory { name: String, count: usize },

    #[error("Not all machines were found on the platform, missing: {}", .missing.join(", "))]
    InventoryMismatch { missing: Vec<String> },

    #[error("Failed to create VM {name}: {source}")]
    CreationRejected {
        name: String,
        #[source]
        source: PlatformError,
    },

    #[error("Failed to start VM {name}: {source}")]
    StartRejected {
        name: String,
        #[source]
        source: PlatformError,
    },

    #[error(
        "VMs {} still not started after {rounds} rounds (wait budget {}s)",
        .not_started.join(", "),
        .budget.as_secs()
    )]
    StartBudgetExhausted {
        not_started: Vec<String>,
        rounds: usize,
        budget: Duration,
    },

    #[error("VM {name} still not up after {retries} retries")]
    ConvergenceBudgetExhausted { name: String, retries: usize },

    #[error("VM {name} still has no IP after {retries} retries")]
    AddressBudgetExhausted { name: String, retries: usize },
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;
