//! Shared fixtures for integration tests.
#![allow(dead_code)]

use changewatch::config::{EmitConfig, HandlerConfig, Settings, TransportConfig, WatchGroupConfig};
use changewatch::delivery::{
    Alert, AlertSink, Collaborators, Courier, DeliveryError, Envelope, MessageTransport,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A message as seen by the transport, with the attachment state at send time.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub envelope: Envelope,
    pub attachment_existed: bool,
}

/// Records every delivery instead of performing it.
#[derive(Default)]
pub struct Recorder {
    messages: Mutex<Vec<SentMessage>>,
    alerts: Mutex<Vec<Alert>>,
    fail_messages: AtomicBool,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_messages() -> Arc<Self> {
        let recorder = Self::default();
        recorder.fail_messages.store(true, Ordering::SeqCst);
        Arc::new(recorder)
    }

    pub fn messages(&self) -> Vec<SentMessage> {
        self.messages.lock().clone()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }

    pub fn total(&self) -> usize {
        self.messages.lock().len() + self.alerts.lock().len()
    }
}

impl MessageTransport for Recorder {
    fn send(&self, envelope: &Envelope, _: &TransportConfig) -> Result<(), DeliveryError> {
        self.messages.lock().push(SentMessage {
            envelope: envelope.clone(),
            attachment_existed: envelope.attachment.as_ref().is_some_and(|p| p.exists()),
        });
        if self.fail_messages.load(Ordering::SeqCst) {
            return Err(DeliveryError::Rejected("transport down".into()));
        }
        Ok(())
    }
}

impl AlertSink for Recorder {
    fn notify(&self, alert: &Alert) -> Result<(), DeliveryError> {
        self.alerts.lock().push(alert.clone());
        Ok(())
    }
}

/// Inline courier delivering into `recorder`.
pub fn courier(recorder: &Arc<Recorder>) -> Arc<Courier> {
    Arc::new(Courier::inline(Collaborators::new(
        recorder.clone(),
        recorder.clone(),
    )))
}

/// Active message handler with sender, recipients and the log transport.
pub fn message_handler(events: &[&str], interval_secs: u64) -> HandlerConfig {
    HandlerConfig {
        kind: "message".into(),
        active: true,
        events: events.iter().map(|s| s.to_string()).collect(),
        emit: EmitConfig {
            interval: interval_secs,
            unit: "s".into(),
        },
        format: "{path} >> {message}".into(),
        subject: "WATCHER NOTIFICATION - {path}".into(),
        from: Some("watcher@example.com".into()),
        to: vec!["ops@example.com".into()],
        transport: Some(TransportConfig::Log),
        attachment: false,
        zipped: false,
        ticker: "WATCHER NOTIFICATION - {path}".into(),
        icon: String::new(),
        timeout: 5,
    }
}

/// Active alert handler.
pub fn alert_handler(events: &[&str], interval_secs: u64) -> HandlerConfig {
    HandlerConfig {
        kind: "alert".into(),
        from: None,
        to: Vec::new(),
        transport: None,
        icon: "auto".into(),
        ..message_handler(events, interval_secs)
    }
}

pub fn group(path: &Path, handlers: Vec<HandlerConfig>) -> WatchGroupConfig {
    WatchGroupConfig {
        path: path.to_path_buf(),
        types: vec!["*".into()],
        ignore_types: Vec::new(),
        ignore_dirs: false,
        recursive: true,
        case_sensitive: false,
        handlers,
    }
}

/// Settings with backing files and icons kept inside `scratch`.
pub fn settings(scratch: &Path, watchers: Vec<WatchGroupConfig>) -> Settings {
    Settings {
        log_dir: scratch.join("logs"),
        icon_dir: scratch.join("img"),
        tick_ms: 50,
        poll_interval: 1,
        watchers,
        ..Settings::default()
    }
}

/// Canonical form of a temp directory, matching the watch group root.
pub fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap()
}
