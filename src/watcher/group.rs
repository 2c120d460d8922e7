//! Watch groups: one directory tree, its filter and its channels.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::error::WatchError;
use super::filter::PatternFilter;
use crate::channel::{ChannelContext, NotificationChannel};
use crate::config::{Settings, WatchGroupConfig};
use crate::delivery::Courier;
use crate::event::{RawEvent, classify};

/// Target of the structured record written for every classified event.
pub const AUDIT_TARGET: &str = "changewatch::audit";

/// One watched directory tree with its filter and ordered channels.
#[derive(Debug)]
pub struct WatchGroup {
    root: PathBuf,
    recursive: bool,
    filter: PatternFilter,
    channels: Vec<NotificationChannel>,
}

impl WatchGroup {
    /// Build a group from its configuration entry.
    ///
    /// Fails when the root is not an existing directory, a pattern does not
    /// compile, or no channel ends up active. Channels with an unknown type
    /// are skipped with a warning.
    pub fn from_config(
        config: &WatchGroupConfig,
        index: usize,
        settings: &Settings,
        epoch: u64,
        now: Instant,
    ) -> Result<Self, WatchError> {
        let root = config
            .path
            .canonicalize()
            .map_err(|e| WatchError::InvalidWatchPath {
                path: config.path.clone(),
                reason: e.to_string(),
            })?;
        if !root.is_dir() {
            return Err(WatchError::InvalidWatchPath {
                path: config.path.clone(),
                reason: "not a directory".to_string(),
            });
        }

        let filter = PatternFilter::new(
            &config.types,
            &config.ignore_types,
            config.ignore_dirs,
            config.case_sensitive,
        )?;

        let mut channels = Vec::with_capacity(config.handlers.len());
        for (position, handler) in config.handlers.iter().enumerate() {
            let ctx = ChannelContext {
                label: format!("{}[{position}] {}", handler.kind, root.display()),
                watched_path: root.clone(),
                log_path: Some(
                    settings
                        .log_dir
                        .join(log_file_name(&root, index, position, epoch)),
                ),
                rename_policy: settings.rename_policy,
                icon_dir: settings.icon_dir.clone(),
                now,
            };
            match NotificationChannel::from_config(handler, &ctx) {
                Ok(channel) => channels.push(channel),
                Err(e) => tracing::warn!("[group] skipping handler: {e}"),
            }
        }

        if !channels.iter().any(NotificationChannel::is_active) {
            for channel in &channels {
                let _ = channel.close(true);
            }
            return Err(WatchError::config(
                config.path.display().to_string(),
                "no active handlers",
            ));
        }

        Ok(Self {
            root,
            recursive: config.recursive,
            filter,
            channels,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn recursive(&self) -> bool {
        self.recursive
    }

    pub fn filter(&self) -> &PatternFilter {
        &self.filter
    }

    pub fn channels(&self) -> &[NotificationChannel] {
        &self.channels
    }

    /// Filter, classify and fan out one raw event.
    ///
    /// Every classified event is recorded on [`AUDIT_TARGET`]. A failing
    /// channel is logged and never keeps the others from seeing the event.
    pub fn on_event(&self, raw: &RawEvent, courier: &Courier) {
        if !self.filter.matches(raw) {
            return;
        }
        let Some(event) = classify(raw, &self.root) else {
            return;
        };

        let destination = event
            .destination()
            .map(|d| d.display().to_string())
            .unwrap_or_default();
        tracing::trace!(
            target: AUDIT_TARGET,
            event = %event.kind(),
            watched_path = %self.root.display(),
            source = %event.source().display(),
            destination = %destination,
            "{}",
            event.describe()
        );

        for channel in self.channels.iter().filter(|c| c.is_active()) {
            if let Err(e) = channel.trigger(&event, courier) {
                report(channel, &e);
            }
        }
    }

    /// Roll over every batched channel whose deadline has passed.
    ///
    /// Returns the number of channels that delivered content.
    pub fn poll_rollovers(&self, now: Instant, courier: &Courier) -> usize {
        let mut flushed = 0;
        for channel in &self.channels {
            match channel.poll_rollover(now, courier) {
                Ok(true) => flushed += 1,
                Ok(false) => {}
                Err(e) => report(channel, &e),
            }
        }
        flushed
    }

    /// Close all channel logs, deleting their files when `remove` is set.
    pub fn release(&self, remove: bool) {
        for channel in &self.channels {
            if let Err(e) = channel.close(remove) {
                tracing::warn!("[group] {}: {e}", channel.label());
            }
        }
    }
}

fn report(channel: &NotificationChannel, error: &WatchError) {
    if error.is_fatal() {
        tracing::error!("[group] {}: internal invariant violated: {error}", channel.label());
    } else {
        tracing::warn!("[group] {}: {error}", channel.label());
    }
}

/// Backing file name of one channel, unique per process and epoch.
fn log_file_name(root: &Path, group: usize, position: usize, epoch: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(root.to_string_lossy().as_bytes());
    hasher.update(group.to_le_bytes());
    hasher.update(position.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(epoch.to_le_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();

    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string());
    format!("{name}-{hex}.log")
}

/// Whether `name` looks like a backing file or snapshot copy written by a channel.
fn is_backing_file_name(name: &str) -> bool {
    let base = name.strip_suffix(".gz").unwrap_or(name);
    let Some(base) = base.strip_suffix(".log") else {
        return false;
    };
    let stem = strip_snapshot_stamp(base).unwrap_or(base);
    match stem.rsplit_once('-') {
        Some((dir, hex)) => {
            !dir.is_empty()
                && hex.len() == 16
                && hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        }
        None => false,
    }
}

/// Strip the `.YYYYmmdd-HHMMSS.mmm` suffix of a snapshot copy.
fn strip_snapshot_stamp(base: &str) -> Option<&str> {
    let digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());
    let (rest, millis) = base.rsplit_once('.')?;
    let (stem, stamp) = rest.rsplit_once('.')?;
    let (date, time) = stamp.split_once('-')?;
    (digits(millis, 3) && digits(date, 8) && digits(time, 6)).then_some(stem)
}

/// Remove backing files and snapshot copies left in `log_dir` by earlier runs.
///
/// Only names produced by channels are touched. Returns the number of files removed.
pub fn sweep_stale_logs(log_dir: &Path) -> usize {
    let entries = match std::fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(e) => {
            tracing::warn!("[group] cannot scan {}: {e}", log_dir.display());
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.filter_map(Result::ok) {
        let name = entry.file_name();
        let is_file = entry.file_type().is_ok_and(|t| t.is_file());
        if !is_file || !is_backing_file_name(&name.to_string_lossy()) {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!("[group] cannot remove {}: {e}", entry.path().display()),
        }
    }
    if removed > 0 {
        crate::log_event!("group", "removed stale logs", "{removed} in {}", log_dir.display());
    }
    removed
}

/// Build the groups of one scheduling epoch, dropping invalid ones.
pub fn build_groups(settings: &Settings, epoch: u64, now: Instant) -> Vec<WatchGroup> {
    settings
        .watchers
        .iter()
        .enumerate()
        .filter_map(|(index, config)| {
            match WatchGroup::from_config(config, index, settings, epoch, now) {
                Ok(group) => Some(group),
                Err(e) => {
                    tracing::warn!("[group] dropped {}: {e}", config.path.display());
                    None
                }
            }
        })
        .collect()
}
