//! Data models for Proxmox cluster resources and metrics

mod metric;
mod node;
mod resource;
mod rrd;
pub mod units;

pub use metric::*;
pub use node::*;
pub use resource::*;
pub use rrd::*;
