//! Top-N selection per metric

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use super::stats::MetricStats;
use super::GuestUsage;
use crate::models::Metric;

/// One row of a ranking
#[derive(Debug, Clone, Serialize)]
pub struct RankedEntry<'a> {
    /// 1-based position
    pub rank: usize,
    pub guest: &'a GuestUsage,
    pub stats: MetricStats,
}

fn compare(a: &(&GuestUsage, MetricStats), b: &(&GuestUsage, MetricStats)) -> Ordering {
    b.1.avg
        .partial_cmp(&a.1.avg)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.0.resource.sort_key().cmp(&b.0.resource.sort_key()))
}

/// Guests with data for `metric`, highest average first. `limit == 0` means all.
pub fn top<'a, I>(guests: I, metric: Metric, limit: usize) -> Vec<RankedEntry<'a>>
where
    I: IntoIterator<Item = &'a GuestUsage>,
{
    let mut candidates: Vec<(&GuestUsage, MetricStats)> = guests
        .into_iter()
        .filter_map(|g| g.summary.get(metric).map(|s| (g, *s)))
        .collect();

    candidates.sort_by(compare);
    if limit > 0 {
        candidates.truncate(limit);
    }

    candidates
        .into_iter()
        .enumerate()
        .map(|(idx, (guest, stats))| RankedEntry {
            rank: idx + 1,
            guest,
            stats,
        })
        .collect()
}

/// Ranking per node, nodes in name order
pub fn by_node(guests: &[GuestUsage], metric: Metric, limit: usize) -> Vec<(String, Vec<RankedEntry<'_>>)> {
    let mut grouped: BTreeMap<String, Vec<&GuestUsage>> = BTreeMap::new();
    for guest in guests {
        let node = guest.resource.node.clone().unwrap_or_else(|| "?".to_string());
        grouped.entry(node).or_default().push(guest);
    }

    grouped
        .into_iter()
        .map(|(node, members)| (node, top(members, metric, limit)))
        .filter(|(_, ranked)| !ranked.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClusterResource, ResourceType, RrdPoint};
    use crate::monitor::stats::summarize;

    fn usage(vmid: u32, name: &str, node: &str, netin: Option<f64>) -> GuestUsage {
        let mut resource = ClusterResource::new(format!("qemu/{}", vmid), ResourceType::Qemu);
        resource.vmid = Some(vmid);
        resource.name = Some(name.to_string());
        resource.node = Some(node.to_string());
        let points = vec![RrdPoint {
            time: 0,
            netin,
            ..Default::default()
        }];
        GuestUsage {
            resource,
            summary: summarize(&points),
        }
    }

    fn guests() -> Vec<GuestUsage> {
        vec![
            usage(100, "alpha", "pve1", Some(10.0)),
            usage(101, "bravo", "pve2", Some(50.0)),
            usage(102, "charlie", "pve1", Some(50.0)),
            usage(103, "delta", "pve2", None),
            usage(104, "echo", "pve1", Some(30.0)),
        ]
    }

    #[test]
    fn test_top_orders_and_breaks_ties_by_name() {
        let guests = guests();
        let ranked = top(&guests, Metric::NetIn, 3);
        let names: Vec<String> = ranked.iter().map(|e| e.guest.resource.display_name()).collect();
        assert_eq!(names, vec!["bravo", "charlie", "echo"]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[2].rank, 3);
    }

    #[test]
    fn test_top_skips_missing_and_zero_limit_keeps_all() {
        let guests = guests();
        assert_eq!(top(&guests, Metric::NetIn, 0).len(), 4);
        assert!(top(&guests, Metric::Cpu, 5).is_empty());
    }

    #[test]
    fn test_by_node() {
        let guests = guests();
        let groups = by_node(&guests, Metric::NetIn, 1);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "pve1");
        assert_eq!(groups[0].1[0].guest.resource.display_name(), "charlie");
        assert_eq!(groups[1].0, "pve2");
        assert_eq!(groups[1].1[0].guest.resource.display_name(), "bravo");
        assert_eq!(groups[1].1[0].rank, 1);
    }
}
