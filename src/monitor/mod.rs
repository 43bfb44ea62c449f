//! Polling the cluster and turning RRD data into rankings

pub mod filter;
pub mod ranking;
pub mod stats;

pub use filter::GuestFilter;
pub use ranking::RankedEntry;
pub use stats::{MetricStats, UsageSummary};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::api::ProxmoxClient;
use crate::error::{ProxtopError, Result};
use crate::models::{ClusterResource, ConsolidationFunction, Metric, ResourceSet, RrdPoint, Timeframe};

/// A guest together with its usage over the timeframe
#[derive(Debug, Clone, Serialize)]
pub struct GuestUsage {
    pub resource: ClusterResource,
    pub summary: UsageSummary,
}

/// A guest whose history could not be fetched
#[derive(Debug, Clone, Serialize)]
pub struct GuestFailure {
    pub id: String,
    pub name: String,
    pub error: String,
}

impl GuestFailure {
    fn new(resource: &ClusterResource, error: String) -> Self {
        Self {
            id: resource.id.clone(),
            name: resource.display_name(),
            error,
        }
    }
}

/// Result of one polling round
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub timeframe: Timeframe,
    pub nodes: Vec<ClusterResource>,
    pub storages: Vec<ClusterResource>,
    pub guests: Vec<GuestUsage>,
    pub failures: Vec<GuestFailure>,
}

impl Snapshot {
    /// Ranking of all guests for a metric
    pub fn top(&self, metric: Metric, limit: usize) -> Vec<RankedEntry<'_>> {
        ranking::top(&self.guests, metric, limit)
    }

    /// Ranking per node for a metric
    pub fn top_by_node(&self, metric: Metric, limit: usize) -> Vec<(String, Vec<RankedEntry<'_>>)> {
        ranking::by_node(&self.guests, metric, limit)
    }
}

/// Progress callback: (finished, total)
pub type ProgressFn = dyn Fn(usize, usize) + Send + Sync;

type FetchResult = (ClusterResource, Result<Vec<RrdPoint>>);

/// Collects snapshots with a bounded number of requests in flight
pub struct Collector {
    client: Arc<ProxmoxClient>,
    concurrency: usize,
}

impl Collector {
    /// Create a collector; `concurrency` is clamped to at least one
    pub fn new(client: Arc<ProxmoxClient>, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
        }
    }

    /// Client used by this collector
    pub fn client(&self) -> &Arc<ProxmoxClient> {
        &self.client
    }

    /// Run one polling round.
    ///
    /// Only the resource listing is fatal; per-guest failures end up in
    /// [`Snapshot::failures`].
    pub async fn collect(
        &self,
        filter: &GuestFilter,
        timeframe: Timeframe,
        cf: ConsolidationFunction,
        progress: Option<&ProgressFn>,
    ) -> Result<Snapshot> {
        let resources = self.client.cluster_resources(None).await?;

        for name in filter.unmatched_names(&resources) {
            match filter::suggest(&name, &resources) {
                Some(close) => warn!("No guest named '{}', did you mean '{}'?", name, close),
                None => warn!("No guest named '{}'", name),
            }
        }

        let set = ResourceSet::partition(resources);
        let selected = filter.apply(set.guests);
        let total = selected.len();
        debug!("Fetching {} history for {} guests", timeframe, total);

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut pending = BTreeMap::new();

        for guest in selected {
            let client = Arc::clone(&self.client);
            let semaphore = Arc::clone(&semaphore);
            pending.insert(guest.id.clone(), guest.clone());
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(permit) => {
                        let points = fetch_history(&client, &guest, timeframe, cf).await;
                        drop(permit);
                        points
                    }
                    Err(e) => Err(ProxtopError::other(e.to_string())),
                };
                (guest, result)
            });
        }

        let (mut guests, mut failures) = gather(tasks, pending, total, progress).await;

        guests.sort_by_key(|g| g.resource.sort_key());
        failures.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Snapshot {
            taken_at: Utc::now(),
            timeframe,
            nodes: set.nodes,
            storages: set.storages,
            guests,
            failures,
        })
    }
}

/// Drain finished fetches. Guests whose task died are reported as failures.
async fn gather(
    mut tasks: JoinSet<FetchResult>,
    mut pending: BTreeMap<String, ClusterResource>,
    total: usize,
    progress: Option<&ProgressFn>,
) -> (Vec<GuestUsage>, Vec<GuestFailure>) {
    let mut guests = Vec::with_capacity(total);
    let mut failures = Vec::new();
    let mut finished = 0;

    while let Some(joined) = tasks.join_next().await {
        finished += 1;
        match joined {
            Ok((resource, result)) => {
                pending.remove(&resource.id);
                match result {
                    Ok(points) => guests.push(GuestUsage {
                        summary: stats::summarize(&points),
                        resource,
                    }),
                    Err(e) => {
                        warn!("Failed to fetch history of {}: {}", resource.id, e);
                        failures.push(GuestFailure::new(&resource, e.to_string()));
                    }
                }
            }
            Err(e) => warn!("Collector task failed: {}", e),
        }
        if let Some(report) = progress {
            report(finished, total);
        }
    }

    for resource in pending.into_values() {
        failures.push(GuestFailure::new(&resource, "history task did not finish".to_string()));
    }

    (guests, failures)
}

async fn fetch_history(
    client: &ProxmoxClient,
    guest: &ClusterResource,
    timeframe: Timeframe,
    cf: ConsolidationFunction,
) -> Result<Vec<RrdPoint>> {
    let (Some(node), Some(vmid), Some(kind)) =
        (guest.node.as_deref(), guest.vmid, guest.guest_kind())
    else {
        return Err(ProxtopError::other(format!(
            "resource {} lacks node or vmid",
            guest.id
        )));
    };
    client.guest_rrddata(node, kind, vmid, timeframe, cf).await
}
