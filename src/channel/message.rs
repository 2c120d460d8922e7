use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

use super::log::Snapshot;
use crate::config::{HandlerConfig, TransportConfig};
use crate::delivery::{Delivery, Envelope, archive};
use crate::watcher::WatchError;

/// Message channel settings: sender, recipients and transport.
#[derive(Debug, Clone)]
pub struct MessageChannel {
    from: Option<String>,
    to: Vec<String>,
    transport: Option<TransportConfig>,
    attachment: bool,
    zipped: bool,
}

impl MessageChannel {
    pub(super) fn from_config(config: &HandlerConfig) -> Self {
        Self {
            from: config
                .from
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            to: config
                .to
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            transport: config.transport.clone(),
            attachment: config.attachment,
            zipped: config.zipped,
        }
    }

    pub(super) fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.from.is_none() {
            problems.push("missing sender ('from')".to_string());
        }
        if self.to.is_empty() {
            problems.push("missing recipients ('to')".to_string());
        }
        if self.transport.is_none() {
            problems.push("missing transport".to_string());
        }
        problems
    }

    pub fn recipients(&self) -> &[String] {
        &self.to
    }

    pub fn sends_attachments(&self) -> bool {
        self.attachment
    }

    pub(super) fn delivery(
        &self,
        subject: String,
        body: String,
        attachment: Option<PathBuf>,
    ) -> Result<Delivery, WatchError> {
        let (Some(from), Some(transport)) = (&self.from, &self.transport) else {
            return Err(WatchError::ChannelFailed {
                channel: "message".to_string(),
                reason: "sender or transport not configured".to_string(),
            });
        };
        Ok(Delivery::Message {
            envelope: Envelope {
                from: from.clone(),
                to: self.to.clone(),
                subject,
                body,
                attachment,
            },
            transport: transport.clone(),
        })
    }

    /// Delivery for flushed log content, inline or as an attachment.
    pub(super) fn snapshot_delivery(
        &self,
        subject: String,
        snapshot: &Snapshot,
    ) -> Result<Delivery, WatchError> {
        if !self.attachment {
            return self.delivery(subject, snapshot.content.clone(), None);
        }

        let mut file = write_attachment(&snapshot.path, &snapshot.content)?;
        if self.zipped {
            match archive::gzip_file(&file) {
                Ok(zipped) => file = zipped,
                Err(e) => {
                    let _ = fs::remove_file(&file);
                    return Err(WatchError::io(&file, e));
                }
            }
        }
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.delivery(subject, format!("ATTACHED: {name}"), Some(file))
    }
}

/// Copy `content` next to `log_path` under a timestamped name.
fn write_attachment(log_path: &Path, content: &str) -> Result<PathBuf, WatchError> {
    let stem = log_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "changewatch".to_string());
    let stamp = Local::now().format("%Y%m%d-%H%M%S%.3f");
    let target = log_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!("{stem}.{stamp}.log"));

    fs::write(&target, content).map_err(|e| WatchError::io(&target, e))?;
    Ok(target)
}
