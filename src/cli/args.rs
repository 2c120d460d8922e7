//! CLI argument parsing using clap.
//!
//! Contains the Cli struct and the Commands enum.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Directory change monitor
#[derive(Parser, Debug)]
#[command(
    name = "changewatch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Directory change monitor",
    long_about = "Watch directory trees and route classified change events to message and alert channels.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Quick Start:\n  $ changewatch init            # Write changewatch.toml\n  $ changewatch check           # Validate watch groups and handlers\n  $ changewatch run             # Start watching (Ctrl-C to stop)"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, env = "CHANGEWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the monitor in the foreground
    #[command(about = "Watch the configured directories until interrupted")]
    Run {
        /// Do not reload the configuration file when it changes
        #[arg(long)]
        no_reload: bool,

        /// Polling interval in seconds (overrides config)
        #[arg(long, value_name = "SECONDS")]
        poll_interval: Option<u64>,
    },

    /// Validate the configuration
    #[command(about = "List valid watch groups and handlers, fail if none would run")]
    Check,

    /// Write an example configuration
    #[command(about = "Create a commented example configuration file")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,

        /// Where to write the file (defaults to --config or ./changewatch.toml)
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },

    /// Show current configuration settings
    #[command(about = "Display the effective settings")]
    Config,
}
