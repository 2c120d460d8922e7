//! Unified logging for console output and the aggregate process log.
//!
//! Provides compact timestamped logging with per-module level configuration.
//! Supports `RUST_LOG` environment variable for runtime overrides.
//!
//! # Configuration
//!
//! ```toml
//! [logging]
//! default = "info"
//!
//! [logging.modules]
//! "changewatch::audit" = "trace"  # show per-event records on the console
//!
//! [process_log]
//! log = true
//! file = "changewatch.log"
//! verbose = false
//! ```
//!
//! # Environment Variable
//!
//! `RUST_LOG` takes precedence over config for the console:
//! ```bash
//! RUST_LOG=debug changewatch run
//! RUST_LOG=changewatch::watcher=trace changewatch run
//! ```

use std::fs::OpenOptions;
use std::sync::{Arc, Once};
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LoggingConfig, ProcessLogConfig};
use crate::watcher::AUDIT_TARGET;

static INIT: Once = Once::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Full timestamp for the process log file.
struct FileTime;

impl FormatTime for FileTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

fn console_filter(config: &LoggingConfig) -> EnvFilter {
    // RUST_LOG env var takes precedence over config
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }
    let mut filter_str = config.default.clone();
    for (module, level) in &config.modules {
        filter_str.push_str(&format!(",{module}={level}"));
    }
    EnvFilter::new(&filter_str)
}

/// Directives of the process log layer. Audit records always reach the file.
fn file_directives(process_log: &ProcessLogConfig) -> String {
    let level = if process_log.verbose { "debug" } else { "info" };
    format!("warn,changewatch={level},{AUDIT_TARGET}=trace")
}

fn file_filter(process_log: &ProcessLogConfig) -> EnvFilter {
    EnvFilter::new(file_directives(process_log))
}

/// Initialize logging with configuration.
///
/// Call once at startup. Safe to call multiple times (only first call takes effect).
///
/// When `process_log` enables the aggregate log, a second layer appends
/// plain lines to its file. The file layer ignores `RUST_LOG`.
pub fn init_with_config(config: &LoggingConfig, process_log: Option<&ProcessLogConfig>) {
    INIT.call_once(|| {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true) // Show target for filtering visibility
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(console_filter(config));

        let file_layer = process_log.and_then(|process_log| {
            let path = process_log.enabled_file()?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                let _ = std::fs::create_dir_all(parent);
            }
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Arc::new(file))
                        .with_ansi(false)
                        .with_target(false)
                        .with_timer(FileTime)
                        .with_filter(file_filter(process_log)),
                ),
                Err(e) => {
                    eprintln!("cannot open process log {}: {e}", path.display());
                    None
                }
            }
        });

        tracing_subscriber::registry()
            .with(fmt_layer)
            .with(file_layer)
            .init();
    });
}

/// Initialize console logging with default configuration.
pub fn init() {
    init_with_config(&LoggingConfig::default(), None);
}

/// Log an event with component context.
///
/// # Examples
/// ```ignore
/// log_event!("engine", "scheduled", "{} groups", count);
/// log_event!("engine", "stopped");
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-only event logging.
///
/// # Examples
/// ```ignore
/// debug_event!("engine", "watching", "{}", root.display());
/// ```
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}
