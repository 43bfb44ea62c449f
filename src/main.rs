//! Proxtop - Proxmox resource monitor
//!
//! Main entry point for the proxtop CLI application.

use std::process::ExitCode;

use console::style;
use tracing_subscriber::EnvFilter;

use proxtop::cli::{self, Cli, Commands, TopArgs};
use proxtop::config::Config;
use proxtop::error::Result;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Configuration first, it carries the default log level
    let config = match cli::load_config(cli.config.as_deref(), &cli.connection) {
        Ok(config) => config,
        // `config reset` and `config init --force` must work on a broken file
        Err(_) if matches!(cli.command, Some(Commands::Config(_))) => Config::default(),
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    if cli.no_color || !config.display.color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    // Set up logging
    setup_logging(&cli, &config);

    // Run the application
    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Whether the interactive live view will own the terminal
fn uses_tui(cli: &Cli) -> bool {
    cfg!(feature = "tui") && matches!(&cli.command, Some(Commands::Watch(args)) if !args.plain)
}

/// Set up logging based on CLI arguments and configuration
fn setup_logging(cli: &Cli, config: &Config) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        config.logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    // Log lines would corrupt the alternate screen
    if uses_tui(cli) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::sink)
            .init();
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

/// Main application logic
async fn run(cli: Cli, mut config: Config) -> Result<()> {
    let command = cli
        .command
        .unwrap_or_else(|| Commands::Top(TopArgs::default()));

    // Dispatch to appropriate command handler
    match command {
        Commands::Top(args) => {
            cli::execute_top(&mut config, &args, cli.quiet).await
        }
        Commands::Watch(args) => {
            cli::execute_watch(&mut config, &args).await
        }
        Commands::Nodes(args) => {
            cli::execute_nodes(&mut config, &args).await
        }
        Commands::Guests(args) => {
            cli::execute_guests(&mut config, &args).await
        }
        Commands::Config(args) => {
            cli::execute_config(cli.config.as_deref(), &args).await
        }
        Commands::Version => {
            cli::execute_version(&mut config).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_plain_watch_keeps_logging() {
        let cli = Cli::try_parse_from(["proxtop", "watch", "--plain"]).unwrap();
        assert!(!uses_tui(&cli));

        let cli = Cli::try_parse_from(["proxtop", "top"]).unwrap();
        assert!(!uses_tui(&cli));
    }
}
