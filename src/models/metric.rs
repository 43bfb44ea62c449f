//! Ranked metrics

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::rrd::RrdPoint;
use super::units::{format_bytes, format_rate};

/// A metric guests can be ranked by
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// CPU usage in cores
    Cpu,
    /// Memory in use
    Mem,
    /// Disk read throughput
    DiskRead,
    /// Disk write throughput
    DiskWrite,
    /// Network receive throughput
    NetIn,
    /// Network transmit throughput
    NetOut,
}

impl Metric {
    /// All metrics, in report order
    pub const ALL: [Metric; 6] = [
        Metric::Cpu,
        Metric::Mem,
        Metric::DiskRead,
        Metric::DiskWrite,
        Metric::NetIn,
        Metric::NetOut,
    ];

    /// Section title
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cpu => "CPU (cores)",
            Self::Mem => "MEMORY",
            Self::DiskRead => "DISK READ",
            Self::DiskWrite => "DISK WRITE",
            Self::NetIn => "NET IN",
            Self::NetOut => "NET OUT",
        }
    }

    /// Short column name
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Mem => "mem",
            Self::DiskRead => "diskread",
            Self::DiskWrite => "diskwrite",
            Self::NetIn => "netin",
            Self::NetOut => "netout",
        }
    }

    /// Extract this metric from an RRD point.
    ///
    /// CPU is scaled to cores when `maxcpu` is known.
    pub fn sample(&self, point: &RrdPoint) -> Option<f64> {
        let value = match self {
            Self::Cpu => point.cpu.map(|cpu| cpu * point.maxcpu.unwrap_or(1.0)),
            Self::Mem => point.mem,
            Self::DiskRead => point.diskread,
            Self::DiskWrite => point.diskwrite,
            Self::NetIn => point.netin,
            Self::NetOut => point.netout,
        };
        value.filter(|v| v.is_finite())
    }

    /// Render a value of this metric
    pub fn format(&self, value: f64) -> String {
        match self {
            Self::Cpu => format!("{:.2}", value),
            Self::Mem => format_bytes(value),
            Self::DiskRead | Self::DiskWrite | Self::NetIn | Self::NetOut => format_rate(value),
        }
    }

    /// Next metric, wrapping around
    pub fn next(&self) -> Self {
        let idx = Self::ALL.iter().position(|m| m == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    /// Previous metric, wrapping around
    pub fn previous(&self) -> Self {
        let idx = Self::ALL.iter().position(|m| m == self).unwrap_or(0);
        Self::ALL[(idx + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_scaled_to_cores() {
        let point = RrdPoint {
            time: 0,
            cpu: Some(0.5),
            maxcpu: Some(4.0),
            ..Default::default()
        };
        assert_eq!(Metric::Cpu.sample(&point), Some(2.0));

        let point = RrdPoint {
            time: 0,
            cpu: Some(0.5),
            ..Default::default()
        };
        assert_eq!(Metric::Cpu.sample(&point), Some(0.5));
    }

    #[test]
    fn test_missing_and_nan_samples() {
        let point = RrdPoint {
            time: 0,
            netin: Some(f64::NAN),
            ..Default::default()
        };
        assert_eq!(Metric::NetIn.sample(&point), None);
        assert_eq!(Metric::Mem.sample(&point), None);
    }

    #[test]
    fn test_cycle() {
        assert_eq!(Metric::Cpu.next(), Metric::Mem);
        assert_eq!(Metric::NetOut.next(), Metric::Cpu);
        assert_eq!(Metric::Cpu.previous(), Metric::NetOut);
    }

    #[test]
    fn test_format() {
        assert_eq!(Metric::Cpu.format(1.234), "1.23");
        assert_eq!(Metric::DiskRead.format(1024.0), "1.0 KiB/s");
    }
}
