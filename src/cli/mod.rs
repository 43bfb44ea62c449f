//! Command-line interface for proxtop

mod commands;

pub use commands::*;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::models::{ConsolidationFunction, GuestKind, Metric, Timeframe};
use crate::report::{GuestSort, OutputFormat};

/// Proxtop - Proxmox resource monitor
///
/// List the top resource users of your Proxmox cluster: CPU, memory,
/// disk and network I/O, averaged over a chosen timeframe.
#[derive(Parser, Debug)]
#[command(name = "proxtop")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute (default: top)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "PROXTOP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Connection overrides
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Options overriding the `[cluster]` configuration section
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// API host name or address
    #[arg(short = 'H', long, global = true, env = "PROXTOP_HOST")]
    pub host: Option<String>,

    /// API port
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// User name, e.g. monitor@pve
    #[arg(short, long, global = true, env = "PROXTOP_USER")]
    pub user: Option<String>,

    /// API token id, e.g. monitor@pve!proxtop
    #[arg(long, global = true)]
    pub token_id: Option<String>,

    /// API token secret
    #[arg(long, global = true, env = "PROXTOP_TOKEN_SECRET", hide_env_values = true)]
    pub token_secret: Option<String>,

    /// Accept self-signed certificates
    #[arg(short = 'k', long, global = true)]
    pub insecure: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the top resource users (default)
    Top(TopArgs),

    /// Refresh the top report periodically
    Watch(WatchArgs),

    /// Show node and storage usage
    Nodes(NodesArgs),

    /// List guests with their current status
    Guests(GuestsArgs),

    /// Manage configuration
    Config(ConfigArgs),

    /// Show client and cluster version
    Version,
}

/// Guest selection options shared by several commands
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Only these guests (name or vmid); repeatable
    #[arg(long = "only", value_name = "NAME")]
    pub only: Vec<String>,

    /// Match --only names as case-insensitive substrings
    #[arg(long)]
    pub partial_match: bool,

    /// Only guests whose name matches this regex
    #[arg(long = "match", value_name = "REGEX")]
    pub pattern: Option<String>,

    /// Only guests on these nodes; repeatable
    #[arg(long = "node", value_name = "NODE")]
    pub nodes: Vec<String>,

    /// Only this kind of guest (qemu or lxc)
    #[arg(long, value_parser = parse_kind)]
    pub kind: Option<GuestKind>,

    /// Include guests that are not running
    #[arg(long)]
    pub include_stopped: bool,

    /// Include templates
    #[arg(long)]
    pub include_templates: bool,
}

fn parse_kind(value: &str) -> Result<GuestKind, String> {
    value.parse().map_err(|e: crate::error::ProxtopError| e.to_string())
}

/// Report shaping options shared by `top` and `watch`
#[derive(Args, Debug, Clone, Default)]
pub struct RankingArgs {
    /// RRD timeframe to average over
    #[arg(short = 'T', long, value_enum)]
    pub timeframe: Option<Timeframe>,

    /// RRD consolidation function
    #[arg(long, value_enum, default_value_t = ConsolidationFunction::Average)]
    pub cf: ConsolidationFunction,

    /// Rows per metric (0 for all)
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Metrics to show; repeatable (default: all)
    #[arg(short, long, value_enum)]
    pub metric: Vec<Metric>,

    /// Rank guests per node
    #[arg(short, long)]
    pub group_by_node: bool,
}

impl RankingArgs {
    /// Metrics to render in the order given, all when none were given
    pub fn metrics(&self) -> Vec<Metric> {
        if self.metric.is_empty() {
            return Metric::ALL.to_vec();
        }

        let mut metrics: Vec<Metric> = Vec::with_capacity(self.metric.len());
        for metric in &self.metric {
            if !metrics.contains(metric) {
                metrics.push(*metric);
            }
        }
        metrics
    }
}

/// Arguments for the top command
#[derive(Args, Debug, Clone, Default)]
pub struct TopArgs {
    #[command(flatten)]
    pub ranking: RankingArgs,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
    pub format: OutputFormat,
}

/// Arguments for the watch command
#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    #[command(flatten)]
    pub ranking: RankingArgs,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Seconds between refreshes
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,

    /// Reprint plain text instead of the interactive view
    #[arg(long)]
    pub plain: bool,
}

/// Arguments for the nodes command
#[derive(Args, Debug, Clone)]
pub struct NodesArgs {
    /// Also fetch detailed status and usage history of every online node
    #[arg(short, long)]
    pub status: bool,

    /// Timeframe of the node history shown with --status
    #[arg(short = 'T', long, value_enum)]
    pub timeframe: Option<Timeframe>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
    pub format: OutputFormat,
}

/// Arguments for the guests command
#[derive(Args, Debug, Clone)]
pub struct GuestsArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Sort order
    #[arg(short, long, value_enum, default_value_t = GuestSort::Vmid)]
    pub sort: GuestSort,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Configuration subcommand
    #[command(subcommand)]
    pub command: ConfigCommands,
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show current configuration (secrets masked)
    Show,
    /// Print the configuration file path
    Path,
    /// Reset configuration to defaults
    Reset,
    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },
    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },
    /// Initialize configuration file
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
