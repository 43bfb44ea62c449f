//! Command execution handlers

use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::api::ProxmoxClient;
use crate::config::{ClusterConfig, Config};
use crate::error::{ProxtopError, Result};
use crate::models::{ConsolidationFunction, ResourceSet};
use crate::monitor::{stats, Collector, GuestFilter, ProgressFn, Snapshot};
use crate::report::{self, NodeDetail, OutputFormat};

use super::{ConnectionArgs, RankingArgs, SelectionArgs};

/// Load the configuration file and apply environment and command line overrides
pub fn load_config(path: Option<&Path>, connection: &ConnectionArgs) -> Result<Config> {
    let mut config = Config::load(path)?;
    config.apply_env();

    if let Some(ref host) = connection.host {
        config.cluster.host = Some(host.clone());
    }
    if let Some(port) = connection.port {
        config.cluster.port = port;
    }
    if let Some(ref user) = connection.user {
        config.cluster.username = Some(user.clone());
    }
    if let Some(ref token_id) = connection.token_id {
        config.cluster.token_id = Some(token_id.clone());
    }
    if let Some(ref token_secret) = connection.token_secret {
        config.cluster.token_secret = Some(token_secret.clone());
    }
    if connection.insecure {
        config.cluster.verify_tls = false;
    }

    Ok(config)
}

/// Whether a password has to be asked for before connecting
fn wants_password_prompt(cluster: &ClusterConfig, interactive: bool) -> bool {
    interactive
        && cluster.token_id.is_none()
        && cluster.password.is_none()
        && cluster.username.as_deref().is_some_and(|u| !u.is_empty())
}

/// Build an API client, prompting for a password when one is needed and stdin is a terminal.
///
/// The prompt is drawn on stderr, so it works while stdout is piped.
pub fn connect(config: &mut Config) -> Result<Arc<ProxmoxClient>> {
    let interactive = std::io::stdin().is_terminal() && Term::stderr().is_term();
    let cluster = &mut config.cluster;

    if wants_password_prompt(cluster, interactive) {
        let prompt = format!(
            "Password for {}@{}",
            cluster.username.as_deref().unwrap_or_default(),
            cluster.host.as_deref().unwrap_or("?")
        );
        let password = dialoguer::Password::new()
            .with_prompt(prompt)
            .interact()
            .map_err(|e| ProxtopError::Terminal(e.to_string()))?;
        cluster.password = Some(password);
    }

    let client = ProxmoxClient::new(&config.cluster, &config.network)?;
    debug!("Connecting to {} as {}", client.base_url(), client.credentials().principal());
    Ok(Arc::new(client))
}

/// Translate selection options into a guest filter
pub fn guest_filter(args: &SelectionArgs) -> Result<GuestFilter> {
    let pattern = match args.pattern {
        Some(ref pattern) => Some(regex::Regex::new(pattern)?),
        None => None,
    };

    Ok(GuestFilter {
        names: args.only.clone(),
        partial: args.partial_match,
        pattern,
        nodes: args.nodes.clone(),
        kinds: args.kind.into_iter().collect(),
        include_stopped: args.include_stopped,
        include_templates: args.include_templates,
    })
}

fn spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Run one collection round with a spinner on stderr
async fn collect_with_progress(
    collector: &Collector,
    filter: &GuestFilter,
    ranking: &RankingArgs,
    config: &Config,
    quiet: bool,
) -> Result<Snapshot> {
    let pb = spinner(quiet);
    pb.set_message("Fetching cluster resources...");

    let progress_pb = pb.clone();
    let progress = move |done: usize, total: usize| {
        progress_pb.set_message(format!("Fetching guest history {}/{}", done, total));
    };
    let progress: &ProgressFn = &progress;

    let timeframe = ranking.timeframe.unwrap_or(config.display.timeframe);
    let result = collector
        .collect(filter, timeframe, ranking.cf, Some(progress))
        .await;

    pb.finish_and_clear();
    result
}

/// Execute the top command
pub async fn execute_top(config: &mut Config, args: &super::TopArgs, quiet: bool) -> Result<()> {
    let client = connect(config)?;
    let collector = Collector::new(client, config.network.concurrency);
    let filter = guest_filter(&args.selection)?;

    let snapshot = collect_with_progress(&collector, &filter, &args.ranking, config, quiet).await?;
    let limit = args.ranking.limit.unwrap_or(config.display.limit);
    let metrics = args.ranking.metrics();

    match args.format {
        OutputFormat::Pretty => {
            print!(
                "{}",
                report::render_top(&snapshot, &metrics, limit, args.ranking.group_by_node)
            );
        }
        OutputFormat::Json => {
            println!(
                "{}",
                report::top_json(&snapshot, &metrics, limit, args.ranking.group_by_node)?
            );
        }
    }

    info!(
        "Ranked {} guests ({} failed)",
        snapshot.guests.len(),
        snapshot.failures.len()
    );
    Ok(())
}

/// Execute the watch command
pub async fn execute_watch(config: &mut Config, args: &super::WatchArgs) -> Result<()> {
    let client = connect(config)?;
    let collector = Collector::new(client, config.network.concurrency);
    let filter = guest_filter(&args.selection)?;
    let interval = Duration::from_secs(args.interval.unwrap_or(config.display.interval).max(1));

    #[cfg(feature = "tui")]
    if !args.plain {
        let host = config.cluster.host.clone().unwrap_or_default();
        let view = crate::tui::ViewOptions {
            host,
            timeframe: args.ranking.timeframe.unwrap_or(config.display.timeframe),
            cf: args.ranking.cf,
            limit: args.ranking.limit.unwrap_or(config.display.limit),
            metrics: args.ranking.metrics(),
            group_by_node: args.ranking.group_by_node,
            interval,
        };
        return crate::tui::run(collector, filter, view).await;
    }

    watch_plain(&collector, &filter, args, config, interval).await
}

async fn watch_plain(
    collector: &Collector,
    filter: &GuestFilter,
    args: &super::WatchArgs,
    config: &Config,
    interval: Duration,
) -> Result<()> {
    let term = Term::stdout();
    let limit = args.ranking.limit.unwrap_or(config.display.limit);
    let metrics = args.ranking.metrics();
    let timeframe = args.ranking.timeframe.unwrap_or(config.display.timeframe);

    // One listener for the whole loop, so a Ctrl-C while printing is not lost
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let round = tokio::select! {
            _ = &mut ctrl_c => break,
            result = collector.collect(filter, timeframe, args.ranking.cf, None) => result,
        };

        term.clear_screen()?;
        println!(
            "{} {}  {}",
            style("proxtop").bold(),
            style(config.cluster.host.as_deref().unwrap_or_default()).cyan(),
            style(chrono::Local::now().format("%Y-%m-%d %H:%M:%S")).dim()
        );
        println!();

        match round {
            Ok(snapshot) => print!(
                "{}",
                report::render_top(&snapshot, &metrics, limit, args.ranking.group_by_node)
            ),
            Err(e) => println!("{} {}", style("Error:").red().bold(), e),
        }

        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    Ok(())
}

/// Execute the nodes command
pub async fn execute_nodes(config: &mut Config, args: &super::NodesArgs) -> Result<()> {
    let client = connect(config)?;
    let set = ResourceSet::partition(client.cluster_resources(None).await?);
    let timeframe = args.timeframe.unwrap_or(config.display.timeframe);

    let mut details: Vec<NodeDetail> = Vec::new();
    if args.status {
        for node in set.nodes.iter().filter(|n| n.is_running()) {
            let name = node.display_name();
            let status = match client.node_status(&name).await {
                Ok(status) => status,
                Err(e) => {
                    warn!("Could not fetch status of {}: {}", name, e);
                    continue;
                }
            };
            let history = match client
                .node_rrddata(&name, timeframe, ConsolidationFunction::Average)
                .await
            {
                Ok(points) => Some(stats::summarize(&points)),
                Err(e) => {
                    warn!("Could not fetch history of {}: {}", name, e);
                    None
                }
            };
            details.push(NodeDetail { name, status, history });
        }
    }

    match args.format {
        OutputFormat::Pretty => {
            print!("{}", report::render_nodes(&set.nodes, &set.storages));
            print!("{}", report::render_node_details(&details, timeframe));
        }
        OutputFormat::Json => {
            let doc = serde_json::json!({
                "nodes": set.nodes,
                "storages": set.storages,
                "details": details,
            });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
    }

    Ok(())
}

/// Execute the guests command
pub async fn execute_guests(config: &mut Config, args: &super::GuestsArgs) -> Result<()> {
    let client = connect(config)?;
    let filter = guest_filter(&args.selection)?;

    let resources = client.cluster_resources(None).await?;
    for name in filter.unmatched_names(&resources) {
        match crate::monitor::filter::suggest(&name, &resources) {
            Some(close) => warn!("No guest named '{}', did you mean '{}'?", name, close),
            None => warn!("No guest named '{}'", name),
        }
    }

    let mut guests = filter.apply(ResourceSet::partition(resources).guests);
    report::sort_guests(&mut guests, args.sort);

    match args.format {
        OutputFormat::Pretty => print!("{}", report::render_guests(&guests)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&guests)?),
    }

    Ok(())
}

/// Execute the version command
pub async fn execute_version(config: &mut Config) -> Result<()> {
    println!("{} {}", crate::NAME, crate::VERSION);

    if config.cluster.host.is_none() {
        return Ok(());
    }

    let client = connect(config)?;
    let version = client.version().await?;
    println!(
        "{} {} (release {})",
        style("pve-manager").dim(),
        version.version,
        version.release
    );
    Ok(())
}

/// Execute the config command
pub async fn execute_config(path: Option<&Path>, args: &super::ConfigArgs) -> Result<()> {
    use super::ConfigCommands;

    match &args.command {
        ConfigCommands::Show => {
            let config = Config::load(path)?;
            let content = toml::to_string_pretty(&config.masked())
                .map_err(|e| ProxtopError::Config(e.to_string()))?;
            println!("{}", content);
        }
        ConfigCommands::Path => {
            println!("{}", Config::resolve_path(path)?.display());
        }
        ConfigCommands::Reset => {
            Config::reset(path)?;
            println!("{} Configuration reset to defaults", style("✓").green());
        }
        ConfigCommands::Set { key, value } => {
            let mut config = Config::load(path)?;
            config.set(key, value)?;
            config.save(path)?;
            println!("{} {} updated", style("✓").green(), key);
        }
        ConfigCommands::Get { key } => {
            let config = Config::load(path)?;
            match config.get(key) {
                Some(value) => println!("{}", value),
                None => {
                    return Err(ProxtopError::Config(format!("Unknown or unset key: {}", key)));
                }
            }
        }
        ConfigCommands::Init { force } => {
            Config::init(path, *force)?;
            println!(
                "{} Configuration written to {}",
                style("✓").green(),
                Config::resolve_path(path)?.display()
            );
        }
    }

    Ok(())
}
