//! Text and JSON rendering of snapshots and resource lists

use std::fmt::Write as _;

use clap::ValueEnum;
use console::style;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::Result;
use crate::models::units::{format_bytes, format_percent, format_uptime};
use crate::models::{ClusterResource, Metric, NodeStatus, Timeframe};
use crate::monitor::{GuestFailure, RankedEntry, Snapshot, UsageSummary};

/// Output format shared by all commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables
    #[default]
    Pretty,
    /// JSON output
    Json,
}

/// Sort order of the guest list
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GuestSort {
    Vmid,
    Name,
    Cpu,
    Mem,
}

fn guest_label(resource: &ClusterResource) -> String {
    format!(
        "{} ({}) @ {}",
        resource.display_name(),
        resource.vmid.map_or_else(|| "-".to_string(), |id| id.to_string()),
        resource.node.as_deref().unwrap_or("?")
    )
}

fn write_entries(out: &mut String, metric: Metric, entries: &[RankedEntry<'_>]) {
    for entry in entries {
        let _ = writeln!(
            out,
            "{:>4}  {:>12}  {:>12}  {}",
            entry.rank,
            metric.format(entry.stats.avg),
            metric.format(entry.stats.max),
            guest_label(&entry.guest.resource)
        );
    }
}

/// Render one section per metric
pub fn render_top(snapshot: &Snapshot, metrics: &[Metric], limit: usize, group_by_node: bool) -> String {
    let mut out = String::new();

    for (idx, metric) in metrics.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        let _ = writeln!(
            out,
            "{} {}",
            style(metric.label()).bold().cyan(),
            style(format!("(last {})", snapshot.timeframe)).dim()
        );
        let _ = writeln!(
            out,
            "{}",
            style(format!("{:>4}  {:>12}  {:>12}  {}", "#", "AVG", "MAX", "GUEST")).dim()
        );

        if group_by_node {
            let groups = snapshot.top_by_node(*metric, limit);
            if groups.is_empty() {
                let _ = writeln!(out, "  (no data)");
            }
            for (node, entries) in groups {
                let _ = writeln!(out, "  {}", style(node).bold());
                write_entries(&mut out, *metric, &entries);
            }
        } else {
            let entries = snapshot.top(*metric, limit);
            if entries.is_empty() {
                let _ = writeln!(out, "  (no data)");
            }
            write_entries(&mut out, *metric, &entries);
        }
    }

    out.push_str(&render_failures(&snapshot.failures));
    out
}

fn entry_json(entry: &RankedEntry<'_>) -> Value {
    let res = &entry.guest.resource;
    json!({
        "rank": entry.rank,
        "id": res.id,
        "name": res.display_name(),
        "vmid": res.vmid,
        "node": res.node,
        "avg": entry.stats.avg,
        "max": entry.stats.max,
        "samples": entry.stats.count,
    })
}

/// The serialized snapshot with a `rankings` member added
pub fn top_json(snapshot: &Snapshot, metrics: &[Metric], limit: usize, group_by_node: bool) -> Result<String> {
    let mut rankings = serde_json::Map::new();

    for metric in metrics {
        let value = if group_by_node {
            let groups: serde_json::Map<String, Value> = snapshot
                .top_by_node(*metric, limit)
                .into_iter()
                .map(|(node, entries)| (node, Value::Array(entries.iter().map(entry_json).collect())))
                .collect();
            Value::Object(groups)
        } else {
            Value::Array(snapshot.top(*metric, limit).iter().map(entry_json).collect())
        };
        rankings.insert(metric.short_name().to_string(), value);
    }

    let mut doc = serde_json::to_value(snapshot)?;
    if let Value::Object(ref mut members) = doc {
        members.insert("rankings".to_string(), Value::Object(rankings));
    }
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Warnings for guests whose history could not be fetched
pub fn render_failures(failures: &[GuestFailure]) -> String {
    let mut out = String::new();
    if failures.is_empty() {
        return out;
    }

    let _ = writeln!(
        out,
        "\n{} history unavailable for {} guest(s):",
        style("Warning:").yellow().bold(),
        failures.len()
    );
    for failure in failures {
        let _ = writeln!(out, "  {} ({}): {}", failure.name, failure.id, failure.error);
    }
    out
}

fn cpu_percent(resource: &ClusterResource) -> String {
    resource
        .cpu
        .map_or_else(|| "-".to_string(), format_percent)
}

fn used_of(used: Option<u64>, max: Option<u64>, ratio: Option<f64>) -> String {
    match (used, max) {
        (Some(used), Some(max)) if max > 0 => format!(
            "{} / {} ({})",
            format_bytes(used as f64),
            format_bytes(max as f64),
            ratio.map_or_else(|| "-".to_string(), format_percent)
        ),
        _ => "-".to_string(),
    }
}

fn uptime(resource: &ClusterResource) -> String {
    match resource.uptime {
        Some(secs) if secs > 0 => format_uptime(secs),
        _ => "-".to_string(),
    }
}

/// Node and storage overview
pub fn render_nodes(nodes: &[ClusterResource], storages: &[ClusterResource]) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", style("NODES").bold().cyan());
    let _ = writeln!(
        out,
        "{}",
        style(format!(
            "{:<16} {:<8} {:>6} {:>8}  {:<32} {:>10}",
            "NODE", "STATUS", "CORES", "CPU", "MEMORY", "UPTIME"
        ))
        .dim()
    );
    for node in nodes {
        let status = node.status.clone().unwrap_or_else(|| "unknown".into());
        let status = if node.is_running() {
            style(format!("{:<8}", status)).green()
        } else {
            style(format!("{:<8}", status)).red()
        };
        let _ = writeln!(
            out,
            "{:<16} {} {:>6} {:>8}  {:<32} {:>10}",
            node.display_name(),
            status,
            node.maxcpu.map_or_else(|| "-".to_string(), |c| format!("{:.0}", c)),
            cpu_percent(node),
            used_of(node.mem, node.maxmem, node.mem_ratio()),
            uptime(node)
        );
    }

    if !storages.is_empty() {
        let _ = writeln!(out, "\n{}", style("STORAGE").bold().cyan());
        let _ = writeln!(
            out,
            "{}",
            style(format!("{:<16} {:<20} {:<12} {}", "NODE", "STORAGE", "STATUS", "USAGE")).dim()
        );
        for storage in storages {
            let _ = writeln!(
                out,
                "{:<16} {:<20} {:<12} {}",
                storage.node.as_deref().unwrap_or("-"),
                storage.display_name(),
                storage.status.as_deref().unwrap_or("-"),
                used_of(storage.disk, storage.maxdisk, storage.disk_ratio())
            );
        }
    }

    out
}

/// Status and usage history of one node
#[derive(Debug, Clone, Serialize)]
pub struct NodeDetail {
    pub name: String,
    pub status: NodeStatus,
    /// Summary of `/nodes/{node}/rrddata`, absent when it could not be fetched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<UsageSummary>,
}

/// Extra detail lines from `/nodes/{node}/status` and the node history
pub fn render_node_details(details: &[NodeDetail], timeframe: Timeframe) -> String {
    let mut out = String::new();
    if details.is_empty() {
        return out;
    }

    let _ = writeln!(out, "\n{}", style("NODE DETAILS").bold().cyan());
    for detail in details {
        let status = &detail.status;
        let _ = writeln!(out, "{}", style(&detail.name).bold());
        let _ = writeln!(out, "  load average: {}", status.loadavg_display());
        if let Some(wait) = status.wait {
            let _ = writeln!(out, "  io delay:     {}", format_percent(wait));
        }
        if let Some(ref swap) = status.swap {
            let _ = writeln!(
                out,
                "  swap:         {} / {}",
                format_bytes(swap.used as f64),
                format_bytes(swap.total as f64)
            );
        }
        if let Some(ref cpuinfo) = status.cpuinfo {
            let _ = writeln!(out, "  cpu:          {} ({} threads)", cpuinfo.model, cpuinfo.cpus);
        }
        if let Some(ref kversion) = status.kversion {
            let _ = writeln!(out, "  kernel:       {}", kversion);
        }
        if let Some(ref pveversion) = status.pveversion {
            let _ = writeln!(out, "  pve:          {}", pveversion);
        }
        if let Some(ref history) = detail.history {
            for (metric, label) in [(Metric::Cpu, "cpu cores"), (Metric::Mem, "memory")] {
                if let Some(stats) = history.get(metric) {
                    let _ = writeln!(
                        out,
                        "  {:<13} avg {} / max {} (last {})",
                        format!("{}:", label),
                        metric.format(stats.avg),
                        metric.format(stats.max),
                        timeframe
                    );
                }
            }
        }
    }
    out
}

/// Sort guests in place for the guest list
pub fn sort_guests(guests: &mut [ClusterResource], sort: GuestSort) {
    match sort {
        GuestSort::Vmid => guests.sort_by_key(|g| g.vmid.unwrap_or(0)),
        GuestSort::Name => guests.sort_by_key(|g| g.sort_key()),
        GuestSort::Cpu => guests.sort_by(|a, b| {
            let a_cores = a.cpu.unwrap_or(0.0) * a.maxcpu.unwrap_or(1.0);
            let b_cores = b.cpu.unwrap_or(0.0) * b.maxcpu.unwrap_or(1.0);
            b_cores
                .partial_cmp(&a_cores)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.sort_key().cmp(&b.sort_key()))
        }),
        GuestSort::Mem => guests.sort_by(|a, b| {
            b.mem
                .unwrap_or(0)
                .cmp(&a.mem.unwrap_or(0))
                .then_with(|| a.sort_key().cmp(&b.sort_key()))
        }),
    }
}

/// Current status of each guest
pub fn render_guests(guests: &[ClusterResource]) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{}",
        style(format!(
            "{:>6} {:<24} {:<5} {:<12} {:<8} {:>7}  {:<32} {:>10}",
            "VMID", "NAME", "KIND", "NODE", "STATUS", "CPU", "MEMORY", "UPTIME"
        ))
        .dim()
    );
    for guest in guests {
        let _ = writeln!(
            out,
            "{:>6} {:<24} {:<5} {:<12} {:<8} {:>7}  {:<32} {:>10}",
            guest.vmid.map_or_else(|| "-".to_string(), |id| id.to_string()),
            guest.display_name(),
            guest.guest_kind().map_or_else(|| "-".to_string(), |k| k.to_string()),
            guest.node.as_deref().unwrap_or("-"),
            guest.status.as_deref().unwrap_or("-"),
            cpu_percent(guest),
            used_of(guest.mem, guest.maxmem, guest.mem_ratio()),
            uptime(guest)
        );
    }
    if guests.is_empty() {
        let _ = writeln!(out, "  (no guests)");
    }
    out
}
