//! Periodic delivery of the aggregate process log.
//!
//! Polls the modification time of the process log on every engine tick and
//! flushes it through the configured channels once their interval has passed.
//! The first mtime seen and each channel's first due check only arm the
//! timers; content starts flowing from the following change.

use std::path::Path;
use std::time::{Instant, SystemTime};

use super::error::WatchError;
use crate::channel::{ChannelContext, ChannelLog, NotificationChannel};
use crate::config::Settings;
use crate::delivery::Courier;

struct Subscriber {
    channel: NotificationChannel,
    last_flush: Option<Instant>,
}

/// Sends the process log through its channels.
pub struct ProcessLogSender {
    log: ChannelLog,
    subscribers: Vec<Subscriber>,
    last_modified: Option<SystemTime>,
}

impl ProcessLogSender {
    /// Build the sender, or `None` when the process log or its channels are off.
    pub fn from_settings(settings: &Settings, now: Instant) -> Option<Self> {
        let file = settings.process_log.enabled_file()?;

        let subscribers: Vec<Subscriber> = settings
            .process_log
            .channel_configs()
            .iter()
            .enumerate()
            .filter_map(|(position, config)| {
                let ctx = ChannelContext {
                    label: format!("process-log[{position}] {}", config.kind),
                    watched_path: file.to_path_buf(),
                    log_path: None,
                    rename_policy: settings.rename_policy,
                    icon_dir: settings.icon_dir.clone(),
                    now,
                };
                match NotificationChannel::from_config(config, &ctx) {
                    Ok(channel) if channel.is_active() && channel.is_batched() => Some(channel),
                    Ok(channel) => {
                        if channel.is_active() {
                            tracing::warn!(
                                "[process-log] {} needs an interval, ignored",
                                channel.label()
                            );
                        }
                        None
                    }
                    Err(e) => {
                        tracing::warn!("[process-log] skipping handler: {e}");
                        None
                    }
                }
            })
            .map(|channel| Subscriber {
                channel,
                last_flush: None,
            })
            .collect();

        if subscribers.is_empty() {
            return None;
        }

        crate::debug_event!(
            "process-log",
            "sending",
            "{} through {} channels",
            file.display(),
            subscribers.len()
        );

        Some(Self {
            log: ChannelLog::external(file),
            subscribers,
            last_modified: None,
        })
    }

    pub fn path(&self) -> &Path {
        self.log.path()
    }

    /// Check the log and flush it to every due channel.
    ///
    /// All due channels receive the same snapshot; the log is truncated once.
    /// Returns the number of channels that were flushed.
    pub fn tick(&mut self, now: Instant, courier: &Courier) -> Result<usize, WatchError> {
        let Some(modified) = self.log.modified() else {
            return Ok(0);
        };
        let Some(last_modified) = self.last_modified else {
            self.last_modified = Some(modified);
            return Ok(0);
        };
        if modified <= last_modified {
            return Ok(0);
        }

        let mut due = Vec::new();
        for (index, subscriber) in self.subscribers.iter_mut().enumerate() {
            match subscriber.last_flush {
                None => subscriber.last_flush = Some(now),
                Some(last) if now.duration_since(last) >= subscriber.channel.emit_interval() => {
                    due.push(index)
                }
                Some(_) => {}
            }
        }
        if due.is_empty() {
            return Ok(0);
        }

        let subscribers = &self.subscribers;
        self.log.flush(now, |snapshot| {
            for &index in &due {
                let channel = &subscribers[index].channel;
                if let Err(e) = channel.deliver_snapshot(snapshot, courier) {
                    tracing::warn!("[process-log] {} failed: {e}", channel.label());
                }
            }
        })?;

        for &index in &due {
            self.subscribers[index].last_flush = Some(now);
        }
        self.last_modified = self.log.modified();
        Ok(due.len())
    }
}
