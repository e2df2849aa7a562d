//! Prime Launch - LBP manager registry
//!
//! Main entry point for the Prime Launch CLI.

mod cli;
mod cmd_lbp;
mod fixture;

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::warn;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use primelaunch_config::{Config, ConfigLoader, ConfigValidator, LoggingConfig};

use cli::{Cli, Commands};

fn primelaunch_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".primelaunch"))
        .unwrap_or_else(|| PathBuf::from(".primelaunch"))
}

/// The given config file, else `~/.primelaunch/config.toml` when that exists.
fn resolve_config_path(path: &Path) -> PathBuf {
    if path.exists() {
        return path.to_path_buf();
    }
    let user_config = primelaunch_dir().join("config.toml");
    if user_config.exists() {
        user_config
    } else {
        path.to_path_buf()
    }
}

/// Initialize tracing with console output, plus daily rotated log files when
/// `logging.directory` is set.
fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let file_layer = match logging.directory.as_deref() {
        Some(directory) => {
            let log_dir = PathBuf::from(ConfigLoader::expand_path(directory));
            std::fs::create_dir_all(&log_dir)?;

            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("primelaunch")
                .filename_suffix("log")
                .max_log_files(30)
                .build(&log_dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // Keeps the writer flushing for the life of the process.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    Ok(())
}

/// Report config warnings and pick the fixture: `--source` first, then
/// `discovery.source`.
fn prepare_source(
    cli_source: Option<&Path>,
    config: &Config,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    for warning in ConfigValidator::validate(config).into_result()? {
        warn!(path = %warning.path, "{}", warning.message);
    }

    let source = cli_source
        .map(Path::to_path_buf)
        .or_else(|| config.discovery.source.clone())
        .ok_or("No deployment source configured (use --source or discovery.source)")?;
    Ok(source)
}

fn check_config(path: &Path, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let result = ConfigValidator::validate(config);

    for warning in &result.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }
    for error in &result.errors {
        println!("error: {}: {}", error.path, error.message);
    }

    result.into_result()?;
    println!("{} is valid", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = resolve_config_path(&cli.config);
    let config = ConfigLoader::load_or_default(&config_path)?;
    init_tracing(&config.logging)?;

    match cli.command {
        Commands::CheckConfig => check_config(&config_path, &config),
        Commands::List { format } => {
            let source = prepare_source(cli.source.as_deref(), &config)?;
            cmd_lbp::lbp_list(&config, &source, &format).await
        }
        Commands::Show { address } => {
            let source = prepare_source(cli.source.as_deref(), &config)?;
            cmd_lbp::lbp_show(&config, &source, &address).await
        }
    }
}
