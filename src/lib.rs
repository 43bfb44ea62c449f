//! Proxtop - Proxmox resource monitor
//!
//! Proxtop polls a Proxmox VE cluster through its HTTP API and lists the
//! guests that use the most CPU, memory, disk and network I/O over a chosen
//! RRD timeframe, in the spirit of `top`.
//!
//! # Quick Start
//!
//! ```bash
//! # Top 10 users per metric over the last hour
//! PROXTOP_PASSWORD=... proxtop -H pve.example.com -u monitor@pve
//!
//! # Busiest guests per node over the last day
//! proxtop top -T day -g
//!
//! # Live view refreshing every 5 seconds
//! proxtop watch -i 5
//!
//! # Node and storage overview
//! proxtop nodes --status
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod monitor;
pub mod report;
#[cfg(feature = "tui")]
pub mod tui;

// Re-export commonly used types
pub use api::ProxmoxClient;
pub use error::{ProxtopError, Result};
pub use models::{ClusterResource, Metric, RrdPoint, Timeframe};
pub use monitor::{Collector, GuestFilter, Snapshot};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Collect a single snapshot with default filtering
///
/// # Example
///
/// ```no_run
/// use proxtop::config::Config;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut config = Config::load(None)?;
///     config.apply_env();
///
///     let snapshot = proxtop::snapshot(&config).await?;
///     for entry in snapshot.top(proxtop::Metric::Cpu, 5) {
///         println!("{} {:.2}", entry.guest.resource.display_name(), entry.stats.avg);
///     }
///     Ok(())
/// }
/// ```
pub async fn snapshot(config: &config::Config) -> Result<Snapshot> {
    let client = std::sync::Arc::new(ProxmoxClient::new(&config.cluster, &config.network)?);
    let collector = Collector::new(client, config.network.concurrency);
    collector
        .collect(
            &GuestFilter::new(),
            config.display.timeframe,
            models::ConsolidationFunction::Average,
            None,
        )
        .await
}
