//! Aggregation of RRD samples

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{Metric, RrdPoint};

/// Average and peak of one metric over a window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricStats {
    pub avg: f64,
    pub max: f64,
    /// Number of points that carried a value
    pub count: usize,
}

/// Per-metric statistics of one guest or node
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageSummary {
    pub metrics: BTreeMap<Metric, MetricStats>,
    /// Points with at least one value
    pub samples: usize,
    /// Timestamp of the first and last point used
    pub first: Option<i64>,
    pub last: Option<i64>,
}

impl UsageSummary {
    pub fn get(&self, metric: Metric) -> Option<&MetricStats> {
        self.metrics.get(&metric)
    }

    /// Average of a metric, if any point had it
    pub fn avg(&self, metric: Metric) -> Option<f64> {
        self.get(metric).map(|s| s.avg)
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// Summarize a series of points. Missing values are skipped, not treated as zero.
pub fn summarize(points: &[RrdPoint]) -> UsageSummary {
    let mut sums: BTreeMap<Metric, (f64, f64, usize)> = BTreeMap::new();
    let mut summary = UsageSummary::default();

    for point in points {
        let mut contributed = false;
        for metric in Metric::ALL {
            if let Some(value) = metric.sample(point) {
                let entry = sums.entry(metric).or_insert((0.0, f64::MIN, 0));
                entry.0 += value;
                entry.1 = entry.1.max(value);
                entry.2 += 1;
                contributed = true;
            }
        }

        if contributed {
            summary.samples += 1;
            summary.first = Some(summary.first.map_or(point.time, |t| t.min(point.time)));
            summary.last = Some(summary.last.map_or(point.time, |t| t.max(point.time)));
        }
    }

    summary.metrics = sums
        .into_iter()
        .map(|(metric, (sum, max, count))| {
            (
                metric,
                MetricStats {
                    avg: sum / count as f64,
                    max,
                    count,
                },
            )
        })
        .collect();

    summary
}
