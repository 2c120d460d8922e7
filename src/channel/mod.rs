//! Notification channels.
//!
//! A channel is one configured sink (message or alert) with its own accepted
//! event kinds, line format and batching interval. Channels with a zero
//! interval deliver every accepted event immediately; the others append the
//! formatted line to their [`ChannelLog`] and deliver the accumulated content
//! when the log rolls over.

mod alert;
pub mod log;
mod message;
pub mod template;

pub use alert::{AlertChannel, IconSpec};
pub use log::{ChannelLog, Snapshot};
pub use message::MessageChannel;

use chrono::Local;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::config::{HandlerConfig, RenamePolicy};
use crate::delivery::{Courier, Delivery};
use crate::event::{ChangeEvent, ChangeKind};
use crate::watcher::WatchError;
use template::Vars;

/// Timestamp format of the `{dt}` placeholder.
pub const DT_FORMAT: &str = "%Y-%m-%d %H-%M-%S";

/// Set of event kinds a channel reacts to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptedKinds(HashSet<ChangeKind>);

impl AcceptedKinds {
    /// Parse configuration flags (`cre`, `mod`, `mov`, `ren`, `del`).
    ///
    /// Under [`RenamePolicy::Shared`] either of `mov` and `ren` accepts both
    /// renames and moves.
    pub fn parse(flags: &[String], policy: RenamePolicy) -> Result<Self, String> {
        let mut kinds = HashSet::new();
        for flag in flags {
            match (flag.trim().to_ascii_lowercase().as_str(), policy) {
                ("cre", _) => {
                    kinds.insert(ChangeKind::Created);
                }
                ("mod", _) => {
                    kinds.insert(ChangeKind::Modified);
                }
                ("del", _) => {
                    kinds.insert(ChangeKind::Deleted);
                }
                ("mov" | "ren", RenamePolicy::Shared) => {
                    kinds.insert(ChangeKind::Moved);
                    kinds.insert(ChangeKind::Renamed);
                }
                ("mov", RenamePolicy::Separate) => {
                    kinds.insert(ChangeKind::Moved);
                }
                ("ren", RenamePolicy::Separate) => {
                    kinds.insert(ChangeKind::Renamed);
                }
                (other, _) => return Err(format!("unknown event flag '{other}'")),
            }
        }
        Ok(Self(kinds))
    }

    pub fn accepts(&self, kind: ChangeKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-type behavior of a channel.
#[derive(Debug, Clone)]
pub enum ChannelKind {
    Message(MessageChannel),
    Alert(AlertChannel),
}

impl ChannelKind {
    pub fn name(&self) -> &'static str {
        match self {
            ChannelKind::Message(_) => "message",
            ChannelKind::Alert(_) => "alert",
        }
    }
}

/// Everything a channel needs from its surroundings at construction time.
#[derive(Debug, Clone)]
pub struct ChannelContext {
    /// Name used in log records
    pub label: String,
    /// Value of the `{path}` placeholder
    pub watched_path: PathBuf,
    /// Backing file for batched channels; `None` when another component owns the log
    pub log_path: Option<PathBuf>,
    pub rename_policy: RenamePolicy,
    pub icon_dir: PathBuf,
    pub now: Instant,
}

/// One configured notification sink.
#[derive(Debug)]
pub struct NotificationChannel {
    label: String,
    kind: ChannelKind,
    active: bool,
    accepted: AcceptedKinds,
    event_names: String,
    emit_interval: Duration,
    format: String,
    subject: String,
    watched_path: String,
    log: Option<ChannelLog>,
}

impl NotificationChannel {
    /// Build a channel from its configuration.
    ///
    /// Unknown channel types are an error. Any other configuration problem
    /// leaves the channel constructed but inactive.
    pub fn from_config(config: &HandlerConfig, ctx: &ChannelContext) -> Result<Self, WatchError> {
        let kind = match config.kind.trim().to_ascii_lowercase().as_str() {
            "message" | "email" => ChannelKind::Message(MessageChannel::from_config(config)),
            "alert" | "popup" => ChannelKind::Alert(AlertChannel::from_config(config, &ctx.icon_dir)),
            other => {
                return Err(WatchError::config(
                    &ctx.label,
                    format!("unknown channel type '{other}'"),
                ));
            }
        };

        let mut problems = Vec::new();
        let accepted = AcceptedKinds::parse(&config.events, ctx.rename_policy).unwrap_or_else(|e| {
            problems.push(e);
            AcceptedKinds::default()
        });
        let emit_interval = config.emit.duration().unwrap_or_else(|e| {
            problems.push(e);
            Duration::ZERO
        });
        if let ChannelKind::Message(message) = &kind {
            problems.extend(message.problems());
        }

        let mut active = config.active;
        if active && !problems.is_empty() {
            tracing::warn!(
                "[channel] {} deactivated: {}",
                ctx.label,
                problems.join("; ")
            );
            active = false;
        }

        let mut log = None;
        if active && !emit_interval.is_zero() {
            if let Some(path) = &ctx.log_path {
                match ChannelLog::create(path, emit_interval, ctx.now) {
                    Ok(created) => log = Some(created),
                    Err(e) => {
                        tracing::warn!("[channel] {} deactivated: {e}", ctx.label);
                        active = false;
                    }
                }
            }
        }

        Ok(Self {
            label: ctx.label.clone(),
            kind,
            active,
            accepted,
            event_names: config.events.join(", "),
            emit_interval,
            format: config.format.clone(),
            subject: config.subject.clone(),
            watched_path: ctx.watched_path.display().to_string(),
            log,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> &ChannelKind {
        &self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn accepted(&self) -> &AcceptedKinds {
        &self.accepted
    }

    pub fn emit_interval(&self) -> Duration {
        self.emit_interval
    }

    pub fn is_batched(&self) -> bool {
        !self.emit_interval.is_zero()
    }

    pub fn log(&self) -> Option<&ChannelLog> {
        self.log.as_ref()
    }

    fn vars<'a>(&'a self, event: &'a str, message: &'a str, dt: &'a str) -> Vars<'a> {
        Vars {
            path: &self.watched_path,
            event,
            message,
            dt,
            events: &self.event_names,
            channel_type: self.kind.name(),
        }
    }

    /// React to one classified event.
    ///
    /// Inactive channels and events of kinds the channel does not accept are
    /// ignored. Immediate channels hand the event description to the courier;
    /// batched channels append the formatted line to their log.
    pub fn trigger(&self, event: &ChangeEvent, courier: &Courier) -> Result<(), WatchError> {
        if !self.active || !self.accepted.accepts(event.kind()) {
            return Ok(());
        }

        let message = event.describe();
        let dt = Local::now().format(DT_FORMAT).to_string();
        let vars = self.vars(event.kind().mnemonic(), &message, &dt);

        if self.is_batched() {
            let line = template::render(&self.format, &vars);
            let log = self.log.as_ref().ok_or_else(|| WatchError::ChannelFailed {
                channel: self.label.clone(),
                reason: "batched channel has no log".to_string(),
            })?;
            return log.append(&line);
        }

        // The line format only shapes logged lines; immediate bodies carry the description
        let subject = template::render(&self.subject, &vars);
        let delivery = match &self.kind {
            ChannelKind::Message(channel) => channel.delivery(subject, message, None)?,
            ChannelKind::Alert(alert) => {
                alert.delivery(&vars, subject, message.clone(), Some(event.kind()))
            }
        };
        courier.dispatch(delivery);
        Ok(())
    }

    /// Deliver flushed log content through this channel.
    pub fn deliver_snapshot(&self, snapshot: &Snapshot, courier: &Courier) -> Result<(), WatchError> {
        let dt = Local::now().format(DT_FORMAT).to_string();
        let vars = self.vars("", &snapshot.content, &dt);
        let subject = template::render(&self.subject, &vars);

        let delivery: Delivery = match &self.kind {
            ChannelKind::Message(message) => message.snapshot_delivery(subject, snapshot)?,
            ChannelKind::Alert(alert) => {
                alert.delivery(&vars, subject, snapshot.content.clone(), None)
            }
        };
        courier.dispatch(delivery);
        Ok(())
    }

    /// Roll the channel's log over if its deadline has passed.
    ///
    /// Returns whether content was delivered.
    pub fn poll_rollover(&self, now: Instant, courier: &Courier) -> Result<bool, WatchError> {
        let Some(log) = self.log.as_ref().filter(|_| self.active) else {
            return Ok(false);
        };
        log.rollover(now, |snapshot| {
            if let Err(e) = self.deliver_snapshot(snapshot, courier) {
                tracing::warn!("[channel] {} flush failed: {e}", self.label);
            }
        })
    }

    /// Release the channel's log, deleting its file when `remove` is set.
    pub fn close(&self, remove: bool) -> Result<(), WatchError> {
        match &self.log {
            Some(log) => log.close(remove),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_shared_policy_mov_covers_renames() {
        let kinds = AcceptedKinds::parse(&flags(&["cre", "mov"]), RenamePolicy::Shared).unwrap();
        assert!(kinds.accepts(ChangeKind::Created));
        assert!(kinds.accepts(ChangeKind::Moved));
        assert!(kinds.accepts(ChangeKind::Renamed));
        assert!(!kinds.accepts(ChangeKind::Modified));
        assert!(!kinds.accepts(ChangeKind::Deleted));
    }

    #[test]
    fn test_separate_policy_splits_flags() {
        let kinds = AcceptedKinds::parse(&flags(&["mov"]), RenamePolicy::Separate).unwrap();
        assert!(kinds.accepts(ChangeKind::Moved));
        assert!(!kinds.accepts(ChangeKind::Renamed));

        let kinds = AcceptedKinds::parse(&flags(&["ren"]), RenamePolicy::Separate).unwrap();
        assert!(kinds.accepts(ChangeKind::Renamed));
        assert!(!kinds.accepts(ChangeKind::Moved));
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        assert!(AcceptedKinds::parse(&flags(&["cre", "write"]), RenamePolicy::Shared).is_err());
        assert!(
            AcceptedKinds::parse(&[], RenamePolicy::Shared)
                .unwrap()
                .is_empty()
        );
    }
}
