//! Outbound delivery of notifications.
//!
//! Channels never talk to a transport directly. They build a [`Delivery`] and
//! hand it to the [`Courier`], which either runs it on the calling thread
//! (tests, one-shot tools) or queues it for a small pool of worker threads so
//! that slow transports never hold up event classification.

pub mod archive;
pub mod command;
pub mod http;

use crossbeam_channel::{Sender, TrySendError, bounded};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

use crate::config::TransportConfig;

pub use command::CommandAlertSink;
pub use http::HttpTransport;

/// Failures of a single delivery attempt. These are logged, never retried.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Delivery rejected: {0}")]
    Rejected(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Alert command '{program}' failed: {reason}")]
    Command { program: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A message handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    /// File sent alongside the body; removed once the attempt is over.
    pub attachment: Option<PathBuf>,
}

/// A desktop alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub body: String,
    pub ticker: String,
    pub icon: Option<PathBuf>,
    pub timeout: Duration,
}

/// Sends messages over a configured transport.
pub trait MessageTransport: Send + Sync {
    fn send(&self, envelope: &Envelope, transport: &TransportConfig) -> Result<(), DeliveryError>;
}

/// Raises desktop alerts.
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: &Alert) -> Result<(), DeliveryError>;
}

/// One unit of work for the courier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Message {
        envelope: Envelope,
        transport: TransportConfig,
    },
    Alert(Alert),
}

impl Delivery {
    fn attachment(&self) -> Option<&Path> {
        match self {
            Delivery::Message { envelope, .. } => envelope.attachment.as_deref(),
            Delivery::Alert(_) => None,
        }
    }

    fn label(&self) -> String {
        match self {
            Delivery::Message { envelope, .. } => format!("message '{}'", envelope.subject),
            Delivery::Alert(alert) => format!("alert '{}'", alert.title),
        }
    }
}

/// The external collaborators a courier delivers through.
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn MessageTransport>,
    pub alerts: Arc<dyn AlertSink>,
}

impl Collaborators {
    pub fn new(transport: Arc<dyn MessageTransport>, alerts: Arc<dyn AlertSink>) -> Self {
        Self { transport, alerts }
    }

    fn deliver(&self, delivery: &Delivery) -> Result<(), DeliveryError> {
        match delivery {
            Delivery::Message { envelope, transport } => self.transport.send(envelope, transport),
            Delivery::Alert(alert) => self.alerts.notify(alert),
        }
    }

    /// Attempt `delivery` once, log the outcome and clean up its attachment.
    fn run(&self, delivery: Delivery) -> bool {
        let ok = match self.deliver(&delivery) {
            Ok(()) => {
                tracing::debug!("[delivery] sent {}", delivery.label());
                true
            }
            Err(e) => {
                tracing::warn!("[delivery] {} failed: {e}", delivery.label());
                false
            }
        };
        discard_attachment(&delivery);
        ok
    }
}

fn discard_attachment(delivery: &Delivery) {
    if let Some(path) = delivery.attachment() {
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!("[delivery] could not remove {}: {e}", path.display());
            }
        }
    }
}

enum Mode {
    Inline,
    Pooled {
        sender: Mutex<Option<Sender<Delivery>>>,
        workers: Mutex<Vec<JoinHandle<()>>>,
    },
}

/// Runs deliveries, either inline or on a bounded worker pool.
pub struct Courier {
    collaborators: Collaborators,
    mode: Mode,
    failed: Arc<AtomicUsize>,
    dropped: AtomicUsize,
}

impl Courier {
    /// Deliver on the calling thread.
    pub fn inline(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            mode: Mode::Inline,
            failed: Arc::new(AtomicUsize::new(0)),
            dropped: AtomicUsize::new(0),
        }
    }

    /// Deliver on `workers` threads fed by a queue of `capacity` jobs.
    ///
    /// When the queue is full new deliveries are dropped with a warning
    /// rather than blocking the caller.
    pub fn pooled(
        collaborators: Collaborators,
        workers: usize,
        capacity: usize,
    ) -> std::io::Result<Self> {
        let workers = workers.max(1);
        let (sender, receiver) = bounded::<Delivery>(capacity.max(1));
        let failed = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let receiver = receiver.clone();
            let collaborators = collaborators.clone();
            let failed = Arc::clone(&failed);
            let handle = std::thread::Builder::new()
                .name(format!("courier-{i}"))
                .spawn(move || {
                    for delivery in receiver.iter() {
                        if !collaborators.run(delivery) {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                })?;
            handles.push(handle);
        }

        tracing::debug!("[delivery] courier started: {workers} workers, queue {capacity}");

        Ok(Self {
            collaborators,
            mode: Mode::Pooled {
                sender: Mutex::new(Some(sender)),
                workers: Mutex::new(handles),
            },
            failed,
            dropped: AtomicUsize::new(0),
        })
    }

    /// Hand over one delivery. Never blocks on a slow transport when pooled.
    pub fn dispatch(&self, delivery: Delivery) {
        match &self.mode {
            Mode::Inline => {
                if !self.collaborators.run(delivery) {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
            Mode::Pooled { sender, .. } => {
                let guard = sender.lock();
                let Some(sender) = guard.as_ref() else {
                    tracing::warn!("[delivery] courier stopped, dropping {}", delivery.label());
                    self.drop_delivery(&delivery);
                    return;
                };
                match sender.try_send(delivery) {
                    Ok(()) => {}
                    Err(TrySendError::Full(delivery)) => {
                        tracing::warn!("[delivery] queue full, dropping {}", delivery.label());
                        self.drop_delivery(&delivery);
                    }
                    Err(TrySendError::Disconnected(delivery)) => {
                        tracing::warn!("[delivery] workers gone, dropping {}", delivery.label());
                        self.drop_delivery(&delivery);
                    }
                }
            }
        }
    }

    fn drop_delivery(&self, delivery: &Delivery) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        discard_attachment(delivery);
    }

    /// Deliveries that were attempted and failed.
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    /// Deliveries dropped without an attempt.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Close the queue and wait for queued deliveries to finish.
    pub fn shutdown(&self) {
        if let Mode::Pooled { sender, workers } = &self.mode {
            sender.lock().take();
            let handles: Vec<_> = workers.lock().drain(..).collect();
            for handle in handles {
                if handle.join().is_err() {
                    tracing::error!("[delivery] courier worker panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::mpsc;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<Envelope>>,
        alerts: Mutex<Vec<Alert>>,
        fail: bool,
    }

    impl MessageTransport for Recorder {
        fn send(&self, envelope: &Envelope, _: &TransportConfig) -> Result<(), DeliveryError> {
            self.messages.lock().push(envelope.clone());
            if self.fail {
                return Err(DeliveryError::Rejected("nope".into()));
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

    fn envelope(subject: &str, attachment: Option<PathBuf>) -> Delivery {
        Delivery::Message {
            envelope: Envelope {
                from: "a@example.com".into(),
                to: vec!["b@example.com".into()],
                subject: subject.into(),
                body: "body".into(),
                attachment,
            },
            transport: TransportConfig::Log,
        }
    }

    #[test]
    fn test_inline_failure_is_counted_and_attachment_removed() {
        let temp_dir = TempDir::new().unwrap();
        let attachment = temp_dir.path().join("snap.log");
        fs::write(&attachment, "x").unwrap();

        let recorder = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let courier = Courier::inline(Collaborators::new(recorder.clone(), recorder.clone()));
        courier.dispatch(envelope("s", Some(attachment.clone())));

        assert_eq!(recorder.messages.lock().len(), 1);
        assert_eq!(courier.failed(), 1);
        assert!(!attachment.exists());
    }

    struct Gate {
        entered: Barrier,
        release: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl MessageTransport for Gate {
        fn send(&self, _: &Envelope, _: &TransportConfig) -> Result<(), DeliveryError> {
            self.entered.wait();
            if let Some(rx) = self.release.lock().take() {
                let _ = rx.recv();
            }
            Ok(())
        }
    }

    impl AlertSink for Gate {
        fn notify(&self, _: &Alert) -> Result<(), DeliveryError> {
            Ok(())
        }
    }

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        let (release_tx, release_rx) = mpsc::channel();
        let gate = Arc::new(Gate {
            entered: Barrier::new(2),
            release: Mutex::new(Some(release_rx)),
        });
        let courier = Courier::pooled(Collaborators::new(gate.clone(), gate.clone()), 1, 1).unwrap();

        // Worker picks up the first job and blocks inside the transport
        courier.dispatch(envelope("first", None));
        gate.entered.wait();

        courier.dispatch(envelope("queued", None));
        courier.dispatch(envelope("overflow", None));
        assert_eq!(courier.dropped(), 1);

        release_tx.send(()).unwrap();
        // The queued job still needs the barrier once more
        gate.entered.wait();
        courier.shutdown();
        assert_eq!(courier.failed(), 0);

        courier.dispatch(envelope("late", None));
        assert_eq!(courier.dropped(), 2);
    }
}
