//! Guest selection

use regex::Regex;
use strsim::jaro_winkler;

use crate::models::{ClusterResource, GuestKind};

/// Minimum similarity for a "did you mean" suggestion
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Which guests to include in a report
#[derive(Debug, Clone, Default)]
pub struct GuestFilter {
    /// Guest names to keep; empty keeps everything
    pub names: Vec<String>,
    /// Match `names` as substrings instead of exactly
    pub partial: bool,
    /// Regular expression the guest name must match
    pub pattern: Option<Regex>,
    /// Nodes to keep; empty keeps all nodes
    pub nodes: Vec<String>,
    /// Guest kinds to keep; empty keeps both
    pub kinds: Vec<GuestKind>,
    /// Keep guests that are not running
    pub include_stopped: bool,
    /// Keep templates
    pub include_templates: bool,
}

impl GuestFilter {
    /// Create a filter that keeps all running, non-template guests
    pub fn new() -> Self {
        Self::default()
    }

    fn name_matches(&self, requested: &str, resource: &ClusterResource) -> bool {
        let name = resource.display_name();
        if self.partial {
            name.to_lowercase().contains(&requested.to_lowercase())
        } else {
            name == requested || resource.vmid.map_or(false, |id| id.to_string() == requested)
        }
    }

    /// Whether a resource passes the filter
    pub fn matches(&self, resource: &ClusterResource) -> bool {
        let Some(kind) = resource.guest_kind() else {
            return false;
        };

        if !self.include_templates && resource.is_template() {
            return false;
        }
        if !self.include_stopped && !resource.is_running() {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&kind) {
            return false;
        }
        if !self.nodes.is_empty() {
            let on_node = resource
                .node
                .as_ref()
                .map_or(false, |node| self.nodes.iter().any(|n| n == node));
            if !on_node {
                return false;
            }
        }
        if !self.names.is_empty() && !self.names.iter().any(|n| self.name_matches(n, resource)) {
            return false;
        }
        if let Some(ref pattern) = self.pattern {
            if !pattern.is_match(&resource.display_name()) {
                return false;
            }
        }

        true
    }

    /// Keep the guests passing the filter
    pub fn apply(&self, resources: Vec<ClusterResource>) -> Vec<ClusterResource> {
        resources.into_iter().filter(|r| self.matches(r)).collect()
    }

    /// Requested names that match no guest at all
    pub fn unmatched_names(&self, resources: &[ClusterResource]) -> Vec<String> {
        self.names
            .iter()
            .filter(|requested| {
                !resources
                    .iter()
                    .filter(|r| r.is_guest())
                    .any(|r| self.name_matches(requested, r))
            })
            .cloned()
            .collect()
    }
}

/// Closest existing guest name for a name that matched nothing
pub fn suggest(requested: &str, resources: &[ClusterResource]) -> Option<String> {
    let requested = requested.to_lowercase();
    resources
        .iter()
        .filter(|r| r.is_guest())
        .map(|r| {
            let name = r.display_name();
            let score = jaro_winkler(&requested, &name.to_lowercase());
            (name, score)
        })
        .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(name, _)| name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceType;

    fn guest(vmid: u32, name: &str, node: &str, kind: ResourceType, status: &str) -> ClusterResource {
        let prefix = if kind == ResourceType::Lxc { "lxc" } else { "qemu" };
        let mut res = ClusterResource::new(format!("{}/{}", prefix, vmid), kind);
        res.vmid = Some(vmid);
        res.name = Some(name.to_string());
        res.node = Some(node.to_string());
        res.status = Some(status.to_string());
        res.template = Some(0);
        res
    }

    fn guests() -> Vec<ClusterResource> {
        let mut template = guest(900, "debian-tmpl", "pve1", ResourceType::Qemu, "stopped");
        template.template = Some(1);
        vec![
            guest(100, "web01", "pve1", ResourceType::Qemu, "running"),
            guest(101, "web02", "pve2", ResourceType::Qemu, "running"),
            guest(200, "db01", "pve2", ResourceType::Lxc, "running"),
            guest(300, "backup", "pve1", ResourceType::Qemu, "stopped"),
            template,
            ClusterResource::new("node/pve1", ResourceType::Node),
        ]
    }

    fn names(resources: &[ClusterResource]) -> Vec<String> {
        resources.iter().map(|r| r.display_name()).collect()
    }

    #[test]
    fn test_default_keeps_running_guests() {
        let kept = GuestFilter::new().apply(guests());
        assert_eq!(names(&kept), vec!["web01", "web02", "db01"]);
    }

    #[test]
    fn test_include_stopped_and_templates() {
        let filter = GuestFilter {
            include_stopped: true,
            include_templates: true,
            ..Default::default()
        };
        assert_eq!(filter.apply(guests()).len(), 5);
    }

    #[test]
    fn test_exact_and_partial_names() {
        let mut filter = GuestFilter {
            names: vec!["web".into(), "200".into()],
            ..Default::default()
        };
        assert_eq!(names(&filter.apply(guests())), vec!["db01"]);

        filter.partial = true;
        assert_eq!(names(&filter.apply(guests())), vec!["web01", "web02"]);
    }

    #[test]
    fn test_node_kind_and_pattern() {
        let filter = GuestFilter {
            nodes: vec!["pve2".into()],
            kinds: vec![GuestKind::Qemu],
            ..Default::default()
        };
        assert_eq!(names(&filter.apply(guests())), vec!["web02"]);

        let filter = GuestFilter {
            pattern: Some(Regex::new(r"^web0[2-9]$").unwrap()),
            ..Default::default()
        };
        assert_eq!(names(&filter.apply(guests())), vec!["web02"]);
    }

    #[test]
    fn test_unmatched_and_suggestions() {
        let filter = GuestFilter {
            names: vec!["web01".into(), "webo1".into()],
            ..Default::default()
        };
        let all = guests();
        assert_eq!(filter.unmatched_names(&all), vec!["webo1".to_string()]);
        assert_eq!(suggest("webo1", &all).as_deref(), Some("web01"));
        assert_eq!(suggest("zzzzzz", &all), None);
    }
}
