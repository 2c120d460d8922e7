use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};

use changewatch::cli::{Cli, Commands, commands};
use changewatch::config::{CONFIG_FILE_NAME, Settings};
use changewatch::logging;

/// Load settings from an explicit path, the discovered file, or defaults.
fn load_settings(explicit: Option<&Path>) -> anyhow::Result<(Settings, Option<PathBuf>)> {
    let path = match explicit {
        Some(path) => {
            if !path.is_file() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            Some(path.to_path_buf())
        }
        None => Settings::find_config_file(),
    };

    let settings = match &path {
        Some(path) => Settings::load_from(path)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid configuration in {}", path.display()))?,
        None => Settings::load().map_err(|e| anyhow::anyhow!("{e}"))?,
    };
    Ok((settings, path))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force, path } => {
            let target = path
                .or(cli.config)
                .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
            commands::init::run_init(&target, force)
        }
        Commands::Run {
            no_reload,
            poll_interval,
        } => {
            let (mut settings, path) = load_settings(cli.config.as_deref())?;
            if let Some(seconds) = poll_interval {
                settings.poll_interval = seconds;
            }
            logging::init_with_config(&settings.logging, Some(&settings.process_log));
            commands::run::run(settings, path, no_reload).await
        }
        Commands::Check => {
            let (settings, _) = load_settings(cli.config.as_deref())?;
            logging::init_with_config(&settings.logging, None);
            commands::check::run_check(&settings)
        }
        Commands::Config => {
            let (settings, path) = load_settings(cli.config.as_deref())?;
            commands::init::run_config(&settings, path.as_deref());
            Ok(())
        }
    }
}
