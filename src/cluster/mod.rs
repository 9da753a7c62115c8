use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::debug;

use crate::core::Platform;
use crate::errors::ProvisionResult;

static CLUSTER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^(.*)-(?:infra|compute|master)[0-9]+").expect("valid cluster pattern")
});
static POOL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^(.*)-[0-9]+").expect("valid pool pattern"));

/// Cluster (or VM pool) prefix a machine name belongs to, if any.
pub fn cluster_of(vm_name: &str) -> Option<&str> {
    CLUSTER_PATTERN
        .captures(vm_name)
        .or_else(|| POOL_PATTERN.captures(vm_name))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Every cluster prefix that currently has at least one machine.
pub async fn discover_clusters<P>(platform: &P) -> ProvisionResult<BTreeSet<String>>
where
    P: Platform + ?Sized,
{
    let vms = platform.list_vms().await?;
    let clusters: BTreeSet<String> = vms
        .iter()
        .filter_map(|vm| cluster_of(&vm.name))
        .map(str::to_string)
        .collect();
    debug!(vms = vms.len(), clusters = clusters.len(), "Discovered clusters");
    Ok(clusters)
}

/// Entries (e.g. per-cluster directories on a shared mount) whose cluster is
/// gone from the platform.
pub fn stale_clusters<I, S>(live: &BTreeSet<String>, entries: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let stale: BTreeSet<String> = entries
        .into_iter()
        .map(Into::into)
        .filter(|entry| !live.contains(entry))
        .collect();
    stale.into_iter().collect()
}
