//! Error types for watch groups, channels and the dispatch engine.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Invalid configuration for {what}: {reason}")]
    Config { what: String, reason: String },

    #[error("Watch path {path} is unusable: {reason}")]
    InvalidWatchPath { path: PathBuf, reason: String },

    #[error("No valid watch groups to schedule")]
    NoWatchGroups,

    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Flush of {path} re-entered while a flush was in progress")]
    RotationRace { path: PathBuf },

    #[error("Channel '{channel}' failed: {reason}")]
    ChannelFailed { channel: String, reason: String },
}

impl WatchError {
    pub fn config(what: impl Into<String>, reason: impl Into<String>) -> Self {
        WatchError::Config {
            what: what.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WatchError::Io {
            path: path.into(),
            source,
        }
    }

    /// Internal invariant violations that must be reported loudly.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WatchError::RotationRace { .. })
    }
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}
