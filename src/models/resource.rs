//! Cluster resources as returned by `/cluster/resources`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ProxtopError, Result};

/// Type of a cluster resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// Cluster node
    Node,
    /// KVM virtual machine
    Qemu,
    /// LXC container
    Lxc,
    /// Storage on a node
    Storage,
    /// Resource pool
    Pool,
    /// Software defined network zone
    Sdn,
    /// Anything newer than this client knows about
    #[serde(other)]
    Other,
}

impl ResourceType {
    /// Value for the `type` query parameter of `/cluster/resources`.
    ///
    /// The API filters on `vm` for both qemu and lxc guests.
    pub fn query_value(&self) -> Option<&'static str> {
        match self {
            Self::Node => Some("node"),
            Self::Qemu | Self::Lxc => Some("vm"),
            Self::Storage => Some("storage"),
            Self::Pool => Some("pool"),
            Self::Sdn => Some("sdn"),
            Self::Other => None,
        }
    }
}

/// Guest flavour, used to build API paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuestKind {
    /// KVM virtual machine
    Qemu,
    /// LXC container
    Lxc,
}

impl GuestKind {
    /// Path segment below `/nodes/{node}/`
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::Qemu => "qemu",
            Self::Lxc => "lxc",
        }
    }
}

impl fmt::Display for GuestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path_segment())
    }
}

impl FromStr for GuestKind {
    type Err = ProxtopError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "qemu" | "vm" | "kvm" => Ok(Self::Qemu),
            "lxc" | "ct" | "container" => Ok(Self::Lxc),
            _ => Err(ProxtopError::other(format!("Unknown guest kind: {}", s))),
        }
    }
}

/// A single entry of `/cluster/resources`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterResource {
    /// Resource id, e.g. `qemu/100` or `node/pve1`
    pub id: String,
    /// Resource type
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vmid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// 1 for templates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
    /// CPU usage as a fraction of `maxcpu`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxcpu: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxmem: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxdisk: Option<u64>,
    /// Uptime in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diskread: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diskwrite: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netin: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netout: Option<u64>,
}

impl ClusterResource {
    /// Create an empty resource of the given type
    pub fn new(id: impl Into<String>, resource_type: ResourceType) -> Self {
        Self {
            id: id.into(),
            resource_type,
            node: None,
            vmid: None,
            name: None,
            status: None,
            template: None,
            pool: None,
            storage: None,
            cpu: None,
            maxcpu: None,
            mem: None,
            maxmem: None,
            disk: None,
            maxdisk: None,
            uptime: None,
            diskread: None,
            diskwrite: None,
            netin: None,
            netout: None,
        }
    }

    /// Guest kind, if this resource is a guest
    pub fn guest_kind(&self) -> Option<GuestKind> {
        match self.resource_type {
            ResourceType::Qemu => Some(GuestKind::Qemu),
            ResourceType::Lxc => Some(GuestKind::Lxc),
            _ => None,
        }
    }

    /// Whether this is a VM or container
    pub fn is_guest(&self) -> bool {
        self.guest_kind().is_some()
    }

    /// Whether the guest is running or the node is online
    pub fn is_running(&self) -> bool {
        matches!(self.status.as_deref(), Some("running") | Some("online"))
    }

    pub fn is_template(&self) -> bool {
        self.template == Some(1)
    }

    /// Human facing name
    pub fn display_name(&self) -> String {
        match self.resource_type {
            ResourceType::Qemu | ResourceType::Lxc => self
                .name
                .clone()
                .or_else(|| self.vmid.map(|id| id.to_string()))
                .unwrap_or_else(|| self.id.clone()),
            ResourceType::Node => self.node.clone().unwrap_or_else(|| self.id.clone()),
            ResourceType::Storage => self.storage.clone().unwrap_or_else(|| self.id.clone()),
            _ => self.name.clone().unwrap_or_else(|| self.id.clone()),
        }
    }

    /// Name used for ranking ties and sorting
    pub fn sort_key(&self) -> (String, u32) {
        (self.display_name(), self.vmid.unwrap_or(0))
    }

    pub fn mem_ratio(&self) -> Option<f64> {
        ratio(self.mem, self.maxmem)
    }

    pub fn disk_ratio(&self) -> Option<f64> {
        ratio(self.disk, self.maxdisk)
    }
}

fn ratio(used: Option<u64>, max: Option<u64>) -> Option<f64> {
    match (used, max) {
        (Some(used), Some(max)) if max > 0 => Some(used as f64 / max as f64),
        _ => None,
    }
}

/// Resources of one `/cluster/resources` call, split by type
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceSet {
    pub nodes: Vec<ClusterResource>,
    pub storages: Vec<ClusterResource>,
    pub guests: Vec<ClusterResource>,
}

impl ResourceSet {
    /// Partition a flat resource list; pools, sdn and unknown types are dropped
    pub fn partition(resources: Vec<ClusterResource>) -> Self {
        let mut set = Self::default();
        for res in resources {
            match res.resource_type {
                ResourceType::Node => set.nodes.push(res),
                ResourceType::Storage => set.storages.push(res),
                ResourceType::Qemu | ResourceType::Lxc => set.guests.push(res),
                _ => {}
            }
        }
        set.nodes.sort_by_key(|n| n.display_name());
        set.storages
            .sort_by_key(|s| (s.node.clone().unwrap_or_default(), s.display_name()));
        set.guests.sort_by_key(|g| g.sort_key());
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESOURCES: &str = r#"[
        {"id":"node/pve1","type":"node","node":"pve1","status":"online","cpu":0.12,"maxcpu":16,
         "mem":34359738368,"maxmem":68719476736,"disk":10,"maxdisk":100,"uptime":86400},
        {"id":"qemu/100","type":"qemu","node":"pve1","vmid":100,"name":"web01","status":"running",
         "template":0,"cpu":0.5,"maxcpu":4,"mem":1073741824,"maxmem":4294967296,
         "diskread":1000,"diskwrite":2000,"netin":300,"netout":400,"uptime":3600},
        {"id":"lxc/101","type":"lxc","node":"pve1","vmid":101,"status":"stopped","maxmem":0},
        {"id":"storage/pve1/local","type":"storage","node":"pve1","storage":"local",
         "status":"available","disk":50,"maxdisk":200},
        {"id":"pool/prod","type":"pool","pool":"prod"},
        {"id":"whatever/1","type":"openvz"}
    ]"#;

    #[test]
    fn test_deserialize_resources() {
        let resources: Vec<ClusterResource> = serde_json::from_str(RESOURCES).unwrap();
        assert_eq!(resources.len(), 6);
        assert_eq!(resources[0].resource_type, ResourceType::Node);
        assert_eq!(resources[1].guest_kind(), Some(GuestKind::Qemu));
        assert_eq!(resources[5].resource_type, ResourceType::Other);
    }

    #[test]
    fn test_display_name_fallbacks() {
        let resources: Vec<ClusterResource> = serde_json::from_str(RESOURCES).unwrap();
        assert_eq!(resources[0].display_name(), "pve1");
        assert_eq!(resources[1].display_name(), "web01");
        assert_eq!(resources[2].display_name(), "101");
        assert_eq!(resources[3].display_name(), "local");
    }

    #[test]
    fn test_ratios() {
        let resources: Vec<ClusterResource> = serde_json::from_str(RESOURCES).unwrap();
        assert_eq!(resources[0].mem_ratio(), Some(0.5));
        assert_eq!(resources[3].disk_ratio(), Some(0.25));
        assert_eq!(resources[2].mem_ratio(), None);
    }

    #[test]
    fn test_partition() {
        let resources: Vec<ClusterResource> = serde_json::from_str(RESOURCES).unwrap();
        let set = ResourceSet::partition(resources);
        assert_eq!(set.nodes.len(), 1);
        assert_eq!(set.storages.len(), 1);
        assert_eq!(set.guests.len(), 2);
        // "101" sorts before "web01"
        assert_eq!(set.guests[0].vmid, Some(101));
        assert!(!set.guests[0].is_running());
        assert!(set.guests[1].is_running());
    }

    #[test]
    fn test_guest_kind_parse() {
        assert_eq!("ct".parse::<GuestKind>().unwrap(), GuestKind::Lxc);
        assert_eq!("QEMU".parse::<GuestKind>().unwrap(), GuestKind::Qemu);
        assert!("docker".parse::<GuestKind>().is_err());
    }
}
