//! Round-robin database samples from the `rrddata` endpoints

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ProxtopError, Result};

/// Time window covered by an `rrddata` request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    /// Last hour, one point per minute
    #[default]
    Hour,
    /// Last day, one point per 30 minutes
    Day,
    /// Last week
    Week,
    /// Last month
    Month,
    /// Last year
    Year,
}

impl Timeframe {
    /// Value of the `timeframe` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = ProxtopError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            _ => Err(ProxtopError::config(format!("Invalid timeframe: {}", s))),
        }
    }
}

/// RRD consolidation function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum ConsolidationFunction {
    /// Average over each interval
    #[default]
    #[serde(rename = "AVERAGE")]
    #[value(name = "average")]
    Average,
    /// Peak within each interval
    #[serde(rename = "MAX")]
    #[value(name = "max")]
    Max,
}

impl ConsolidationFunction {
    /// Value of the `cf` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Average => "AVERAGE",
            Self::Max => "MAX",
        }
    }
}

/// One RRD point. Fields are absent when the guest was down for the interval.
///
/// Node history names its memory fields `memused` and `memtotal`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RrdPoint {
    /// Unix timestamp in seconds
    pub time: i64,
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub maxcpu: Option<f64>,
    #[serde(default, alias = "memused")]
    pub mem: Option<f64>,
    #[serde(default, alias = "memtotal")]
    pub maxmem: Option<f64>,
    /// Bytes read per second
    #[serde(default)]
    pub diskread: Option<f64>,
    /// Bytes written per second
    #[serde(default)]
    pub diskwrite: Option<f64>,
    /// Bytes received per second
    #[serde(default)]
    pub netin: Option<f64>,
    /// Bytes sent per second
    #[serde(default)]
    pub netout: Option<f64>,
}

impl RrdPoint {
    /// Timestamp of this point
    pub fn timestamp(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp(self.time, 0)
    }
}
