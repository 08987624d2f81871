//! Pyforge - CPython provisioning with a source-build fallback
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use pyforge::cli::{Cli, Commands};
use pyforge::config::ConfigManager;
use pyforge::error::{PyforgeError, PyforgeResult};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> PyforgeResult<()> {
    let cli = Cli::parse();

    // Completions need no config or logging
    if let Commands::Completions { shell } = &cli.command {
        let mut command = <Cli as clap::CommandFactory>::command();
        clap_complete::generate(*shell, &mut command, "pyforge", &mut std::io::stdout());
        return Ok(());
    }

    // Load configuration first, general settings shape the logging setup
    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await?;

    // Initialize logging: 0 = warn, 1 = info, 2+ = debug;
    // general.verbose in the config file is equivalent to -vv
    let verbosity = cli
        .verbose
        .max(if config.general.verbose { 2 } else { 0 });
    let filter = match verbosity {
        0 => EnvFilter::new("pyforge=warn"),
        1 => EnvFilter::new("pyforge=info"),
        _ => EnvFilter::new("pyforge=debug"),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time();
    match config.general.log_format.as_str() {
        "text" => subscriber.init(),
        "json" => subscriber.json().init(),
        other => {
            return Err(PyforgeError::ConfigInvalid {
                path: config_manager.path().to_path_buf(),
                reason: format!("unknown log format \"{other}\", expected text or json"),
            })
        }
    }

    // Dispatch to command
    match cli.command {
        Commands::Install(args) => pyforge::cli::commands::install(args, &config).await,
        Commands::Resolve(args) => pyforge::cli::commands::resolve(args, &config).await,
        Commands::Tags(args) => pyforge::cli::commands::tags(args, &config).await,
        Commands::Config(args) => pyforge::cli::commands::config(args, &config).await,
        Commands::Completions { .. } => unreachable!("Completions handled above"),
    }
}
