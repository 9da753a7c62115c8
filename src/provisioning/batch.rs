use futures_util::future::try_join_all;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

use crate::core::{MachineHandle, Platform};
use crate::errors::{ProvisionError, ProvisionResult};

/// Creates `missing` in groups of at most `batch_size`, in input order.
///
/// All creates of one group are in flight together; the next group is not
/// issued until every request of the current one has settled and
/// `settle_delay` has passed. The first rejected create fails the run as soon
/// as it comes back; the other requests of its group are dropped, so the
/// engine may still finish creating them and the next run picks them up as
/// existing machines. Nothing is retried here.
pub async fn create_missing<P>(
    platform: &P,
    missing: &[String],
    cluster: &str,
    template: &str,
    batch_size: usize,
    settle_delay: Duration,
) -> ProvisionResult<BTreeMap<String, MachineHandle>>
where
    P: Platform + ?Sized,
{
    if batch_size == 0 {
        return Err(ProvisionError::Config("batch size must be positive".into()));
    }

    let mut created = BTreeMap::new();
    let total = missing.len().div_ceil(batch_size);

    for (index, batch) in missing.chunks(batch_size).enumerate() {
        info!(batch = index + 1, of = total, size = batch.len(), "Creating VM batch");

        let requests = batch.iter().map(|name| async move {
            platform
                .create_vm(name, cluster, template)
                .await
                .map(|handle| (name.clone(), handle))
                .map_err(|source| ProvisionError::CreationRejected {
                    name: name.clone(),
                    source,
                })
        });

        for (name, handle) in try_join_all(requests).await? {
            info!(vm = %name, id = %handle.id, "VM created");
            created.insert(name, handle);
        }

        tokio::time::sleep(settle_delay).await;
    }

    Ok(created)
}
