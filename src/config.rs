//! Configuration module for the change monitor.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CW_` and use double underscores
//! to separate nested levels:
//! - `CW_POLL_INTERVAL=5` sets `poll_interval`
//! - `CW_PROCESS_LOG__VERBOSE=true` sets `process_log.verbose`
//! - `CW_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file looked up by [`Settings::load`].
pub const CONFIG_FILE_NAME: &str = "changewatch.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Polling interval of the event source, in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Event source backend
    #[serde(default)]
    pub backend: WatchBackend,

    /// Period of the engine control loop, in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Directory holding the backing files of batched channels
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Remove backing files when the engine stops
    #[serde(default = "default_true")]
    pub cleanup_logs: bool,

    /// Whether `mov` also accepts renames or `ren` is a separate flag
    #[serde(default)]
    pub rename_policy: RenamePolicy,

    /// Directory searched for `ico_<event>.ico` when an alert icon is "auto"
    #[serde(default = "default_icon_dir")]
    pub icon_dir: PathBuf,

    /// Program used to raise desktop alerts
    #[serde(default = "default_alert_command")]
    pub alert_command: String,

    /// Number of delivery worker threads
    #[serde(default = "default_delivery_workers")]
    pub delivery_workers: usize,

    /// Capacity of the delivery queue; deliveries beyond it are dropped
    #[serde(default = "default_delivery_queue")]
    pub delivery_queue: usize,

    /// Reload the configuration file when it changes
    #[serde(default = "default_true")]
    pub reload: bool,

    /// Proxy applied to webhook transports
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Console logging
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Aggregate process log and its periodic delivery
    #[serde(default)]
    pub process_log: ProcessLogConfig,

    /// Watched directory trees
    #[serde(default)]
    pub watchers: Vec<WatchGroupConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WatchBackend {
    /// Periodic directory scans (`poll_interval`)
    #[default]
    Poll,
    /// Platform notification API (inotify, FSEvents, ReadDirectoryChangesW)
    Native,
}

/// How renames are gated by a channel's event flags.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RenamePolicy {
    /// `mov` (or `ren`) accepts both renames and moves
    #[default]
    Shared,
    /// `mov` accepts moves only, `ren` accepts renames only
    Separate,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchGroupConfig {
    /// Directory to watch
    pub path: PathBuf,

    /// Glob patterns of paths to include
    #[serde(default = "default_types")]
    pub types: Vec<String>,

    /// Glob patterns of paths to exclude
    #[serde(default)]
    pub ignore_types: Vec<String>,

    /// Ignore events on directories
    #[serde(default)]
    pub ignore_dirs: bool,

    #[serde(default = "default_true")]
    pub recursive: bool,

    #[serde(default)]
    pub case_sensitive: bool,

    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
}

/// One notification channel.
///
/// Message and alert channels share this shape; fields that do not apply to a
/// channel type are ignored.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HandlerConfig {
    /// Channel type: "message" or "alert"
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub active: bool,

    /// Accepted event flags: cre, mod, mov, ren, del
    #[serde(default)]
    pub events: Vec<String>,

    #[serde(default)]
    pub emit: EmitConfig,

    /// Template of one notification line
    #[serde(default = "default_format")]
    pub format: String,

    /// Template of the message subject or alert title
    #[serde(default = "default_subject")]
    pub subject: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    #[serde(default)]
    pub to: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportConfig>,

    /// Send flushed logs as an attachment instead of inline text
    #[serde(default)]
    pub attachment: bool,

    /// Compress attachments
    #[serde(default)]
    pub zipped: bool,

    /// Template of the alert ticker
    #[serde(default = "default_subject")]
    pub ticker: String,

    /// "auto", a path to an icon file, or empty for none
    #[serde(default = "default_icon")]
    pub icon: String,

    /// Alert timeout in seconds
    #[serde(default = "default_alert_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct EmitConfig {
    /// Batching interval; 0 delivers every event immediately
    #[serde(default)]
    pub interval: u64,

    /// Interval unit: s, m, h or d
    #[serde(default = "default_unit")]
    pub unit: String,
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            interval: 0,
            unit: default_unit(),
        }
    }
}

impl EmitConfig {
    /// Interval as a duration.
    pub fn duration(&self) -> Result<Duration, String> {
        span_to_duration(self.interval, &self.unit)
    }
}

/// Convert `value` in `unit` (s, m, h, d or their long forms) to a duration.
pub fn span_to_duration(value: u64, unit: &str) -> Result<Duration, String> {
    let seconds = match unit.to_ascii_lowercase().as_str() {
        "s" | "sec" | "second" | "seconds" => 1,
        "m" | "min" | "minute" | "minutes" => 60,
        "h" | "hour" | "hours" => 3600,
        "d" | "day" | "days" => 86_400,
        other => return Err(format!("unknown interval unit '{other}'")),
    };
    value
        .checked_mul(seconds)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("interval {value}{unit} is too large"))
}

/// Outbound message transport.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    /// POST to an HTTP endpoint
    Webhook {
        url: String,
        #[serde(default = "default_transport_timeout")]
        timeout_secs: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    /// Write messages to the process log only
    Log,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct ProxyConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Proxy URL, e.g. http://proxy.local:3128
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default console level
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ProcessLogConfig {
    /// Write the aggregate process log to `file`
    #[serde(default)]
    pub log: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Include debug records in the process log
    #[serde(default)]
    pub verbose: bool,

    /// Periodic delivery of the process log
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send: Option<SendConfig>,

    /// Further channels fed from the process log
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
}

impl ProcessLogConfig {
    /// Log file path if the process log is enabled.
    pub fn enabled_file(&self) -> Option<&Path> {
        self.file.as_deref().filter(|_| self.log)
    }

    /// All channel configurations fed from the process log.
    pub fn channel_configs(&self) -> Vec<HandlerConfig> {
        self.send
            .iter()
            .map(SendConfig::to_handler)
            .chain(self.handlers.iter().cloned())
            .collect()
    }
}

/// Shorthand for a message channel that mails the process log as attachment.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SendConfig {
    #[serde(default)]
    pub active: bool,

    #[serde(default = "default_send_interval")]
    pub interval: u64,

    #[serde(default = "default_send_unit")]
    pub unit: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    #[serde(default, alias = "to")]
    pub recipients: Vec<String>,

    #[serde(default = "default_send_subject")]
    pub subject: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportConfig>,

    #[serde(default)]
    pub zipped: bool,
}

impl SendConfig {
    pub fn to_handler(&self) -> HandlerConfig {
        HandlerConfig {
            kind: "message".to_string(),
            active: self.active,
            events: Vec::new(),
            emit: EmitConfig {
                interval: self.interval,
                unit: self.unit.clone(),
            },
            format: default_format(),
            subject: self.subject.clone(),
            from: self.from.clone(),
            to: self.recipients.clone(),
            transport: self.transport.clone(),
            attachment: true,
            zipped: self.zipped,
            ticker: default_subject(),
            icon: String::new(),
            timeout: default_alert_timeout(),
        }
    }
}

// Default value functions
fn default_poll_interval() -> u64 { 10 }
fn default_tick_ms() -> u64 { 1000 }
fn default_true() -> bool { true }
fn default_icon_dir() -> PathBuf { PathBuf::from("img") }
fn default_alert_command() -> String { "notify-send".to_string() }
fn default_delivery_workers() -> usize { 2 }
fn default_delivery_queue() -> usize { 64 }
fn default_types() -> Vec<String> { vec!["*".to_string()] }
fn default_format() -> String { "{path} >> {message}".to_string() }
fn default_subject() -> String { "WATCHER NOTIFICATION - {path}".to_string() }
fn default_icon() -> String { "auto".to_string() }
fn default_alert_timeout() -> u64 { 5 }
fn default_unit() -> String { "s".to_string() }
fn default_transport_timeout() -> u64 { 30 }
fn default_log_level() -> String { "info".to_string() }
fn default_send_interval() -> u64 { 1 }
fn default_send_unit() -> String { "h".to_string() }
fn default_send_subject() -> String { "WATCHER LOG".to_string() }

fn default_log_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("changewatch")
        .join("logs")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            backend: WatchBackend::default(),
            tick_ms: default_tick_ms(),
            log_dir: default_log_dir(),
            cleanup_logs: true,
            rename_policy: RenamePolicy::default(),
            icon_dir: default_icon_dir(),
            alert_command: default_alert_command(),
            delivery_workers: default_delivery_workers(),
            delivery_queue: default_delivery_queue(),
            reload: true,
            proxy: ProxyConfig::default(),
            logging: LoggingConfig::default(),
            process_log: ProcessLogConfig::default(),
            watchers: Vec::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources, using the discovered config file.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_config_file().unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels
            .merge(Env::prefixed("CW_").split("__"))
            .extract()
            .map_err(Box::new)
    }

    /// Find the configuration file: working directory first, then the user config dir.
    pub fn find_config_file() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Some(local);
        }

        let user = dirs::config_dir()?.join("changewatch").join(CONFIG_FILE_NAME);
        user.is_file().then_some(user)
    }

    /// Engine tick period.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(10))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Write the example configuration to `path`.
    pub fn init_config_file(path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
        if !force && path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, EXAMPLE_CONFIG)?;
        Ok(())
    }
}

/// Commented example written by `changewatch init`.
pub const EXAMPLE_CONFIG: &str = r#"# changewatch configuration

# Seconds between scans of the watched trees (poll backend)
poll_interval = 10
# "poll" or "native"
backend = "poll"
# Remove batch files on shutdown
cleanup_logs = true
# "shared": the mov flag covers renames too; "separate": use ren for renames
rename_policy = "shared"

[logging]
default = "info"

[process_log]
log = true
file = "changewatch.log"
verbose = false

# [process_log.send]
# active = true
# interval = 1
# unit = "h"
# from = "watcher@example.com"
# recipients = ["ops@example.com"]
# zipped = true
# transport = { kind = "webhook", url = "https://hooks.example.com/mail", timeout_secs = 30 }

[[watchers]]
path = "."
types = ["*"]
ignore_types = ["*.tmp", "*.swp"]
ignore_dirs = false
recursive = true
case_sensitive = false

[[watchers.handlers]]
type = "alert"
active = true
events = ["cre", "mov", "del"]
emit = { interval = 0, unit = "s" }
subject = "WATCHER NOTIFICATION - {path}"
icon = "auto"
timeout = 5

[[watchers.handlers]]
type = "message"
active = false
events = ["cre", "mod", "mov", "del"]
emit = { interval = 5, unit = "m" }
format = "[{dt}] {message}"
from = "watcher@example.com"
to = ["ops@example.com"]
attachment = false
transport = { kind = "log" }
"#;
