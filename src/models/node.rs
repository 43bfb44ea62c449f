//! Node detail and version payloads

use serde::{Deserialize, Serialize};

/// Detailed node status from `/nodes/{node}/status`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NodeStatus {
    /// CPU usage (0.0 to 1.0)
    #[serde(default)]
    pub cpu: f64,
    /// IO delay (0.0 to 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<f64>,
    pub memory: MemoryInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap: Option<MemoryInfo>,
    #[serde(default)]
    pub uptime: u64,
    /// 1, 5 and 15 minute load averages. The API sends them as strings.
    #[serde(default)]
    pub loadavg: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kversion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pveversion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpuinfo: Option<CpuInfo>,
}

/// Memory usage in bytes
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MemoryInfo {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

/// CPU model information
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CpuInfo {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub cpus: u32,
    #[serde(default)]
    pub sockets: u32,
}

impl NodeStatus {
    /// Load averages joined for display
    pub fn loadavg_display(&self) -> String {
        if self.loadavg.is_empty() {
            "-".to_string()
        } else {
            self.loadavg.join(" ")
        }
    }
}

/// Payload of `/version`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiVersion {
    pub version: String,
    pub release: String,
    #[serde(default)]
    pub repoid: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_status_payload() {
        let json = r#"{
            "cpu":0.031,"wait":0.0007,"uptime":1209600,
            "loadavg":["0.52","0.61","0.70"],
            "memory":{"total":67108864000,"used":20000000000,"free":47108864000},
            "swap":{"total":0,"used":0,"free":0},
            "kversion":"Linux 6.8.12-4-pve #1 SMP",
            "pveversion":"pve-manager/8.2.7/3e0176e6bb2ade3b",
            "cpuinfo":{"model":"AMD EPYC 7302P","cpus":32,"sockets":1,"mhz":"3000.000"},
            "rootfs":{"total":1,"used":1,"free":0,"avail":0}
        }"#;
        let status: NodeStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.memory.total, 67108864000);
        assert_eq!(status.loadavg_display(), "0.52 0.61 0.70");
        assert_eq!(status.cpuinfo.unwrap().cpus, 32);
    }

    #[test]
    fn test_version_payload() {
        let json = r#"{"version":"8.2.7","release":"8.2","repoid":"3e0176e6bb2ade3b"}"#;
        let version: ApiVersion = serde_json::from_str(json).unwrap();
        assert_eq!(version.release, "8.2");
    }
}
