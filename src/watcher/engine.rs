//! Dispatch engine: owns the scheduling epoch and drives the control loop.

use notify::{Event, PollWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use super::error::WatchError;
use super::group::{WatchGroup, build_groups, sweep_stale_logs};
use super::process_log::ProcessLogSender;
use crate::config::{Settings, WatchBackend};
use crate::delivery::Courier;
use crate::event::RawEvent;

/// Lifecycle of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Scheduling,
    Running,
}

/// Raw notify result tagged with the epoch and group it belongs to.
type Tagged = (u64, usize, notify::Result<Event>);

type Subscription = Box<dyn Watcher + Send>;

/// Owns the watch groups of the current epoch and their subscriptions.
///
/// Events arrive from the notify threads over a channel and are dispatched
/// on the engine loop, which also runs the rollover and process-log checks
/// on every tick. Reconfiguration replaces the whole epoch: the old groups
/// are unsubscribed and released before the new ones are subscribed.
pub struct DispatchEngine {
    settings: Settings,
    courier: Arc<Courier>,
    state: EngineState,
    epoch: u64,
    groups: Vec<WatchGroup>,
    subscriptions: Vec<Subscription>,
    process_log: Option<ProcessLogSender>,
    event_tx: mpsc::Sender<Tagged>,
    event_rx: Option<mpsc::Receiver<Tagged>>,
    config_path: Option<PathBuf>,
    config_modified: Option<SystemTime>,
}

impl DispatchEngine {
    pub fn new(settings: Settings, courier: Arc<Courier>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(1024);
        Self {
            settings,
            courier,
            state: EngineState::Stopped,
            epoch: 0,
            groups: Vec::new(),
            subscriptions: Vec::new(),
            process_log: None,
            event_tx,
            event_rx: Some(event_rx),
            config_path: None,
            config_modified: None,
        }
    }

    /// Reload the configuration from `path` whenever its mtime advances.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.config_modified = modified(&path);
        self.config_path = Some(path);
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn groups(&self) -> &[WatchGroup] {
        &self.groups
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Build the groups of the current settings.
    ///
    /// Returns the number of valid groups, or [`WatchError::NoWatchGroups`]
    /// when none survives validation.
    pub fn schedule(&mut self) -> Result<usize, WatchError> {
        let settings = self.settings.clone();
        self.reconfigure(settings)
    }

    /// Replace the current epoch with one built from `settings`.
    ///
    /// When no valid group results the current epoch is kept untouched. The
    /// first call also clears backing files left in `log_dir` by earlier runs.
    pub fn reconfigure(&mut self, settings: Settings) -> Result<usize, WatchError> {
        let previous = self.state;
        self.state = EngineState::Scheduling;

        if self.epoch == 0 {
            sweep_stale_logs(&settings.log_dir);
        }

        let now = Instant::now();
        let epoch = self.epoch + 1;
        let groups = build_groups(&settings, epoch, now);
        if groups.is_empty() {
            self.state = previous;
            return Err(WatchError::NoWatchGroups);
        }

        self.teardown();
        self.settings = settings;
        self.epoch = epoch;
        self.groups = groups;
        self.process_log = ProcessLogSender::from_settings(&self.settings, now);

        crate::log_event!(
            "engine",
            "scheduled",
            "{} groups (epoch {epoch})",
            self.groups.len()
        );

        if previous == EngineState::Running {
            self.subscribe_all();
            self.state = EngineState::Running;
        }
        Ok(self.groups.len())
    }

    fn subscribe(&self, index: usize, group: &WatchGroup) -> Result<Subscription, WatchError> {
        let tx = self.event_tx.clone();
        let epoch = self.epoch;
        let handler = move |res: notify::Result<Event>| {
            let _ = tx.blocking_send((epoch, index, res));
        };

        let mut watcher: Subscription = match self.settings.backend {
            WatchBackend::Poll => {
                let config = notify::Config::default()
                    .with_poll_interval(Duration::from_secs(self.settings.poll_interval.max(1)));
                Box::new(PollWatcher::new(handler, config)?)
            }
            WatchBackend::Native => Box::new(notify::recommended_watcher(handler)?),
        };

        let mode = if group.recursive() {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(group.root(), mode)
            .map_err(|e| WatchError::PathWatchFailed {
                path: group.root().to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(watcher)
    }

    fn subscribe_all(&mut self) {
        let mut subscriptions = Vec::with_capacity(self.groups.len());
        for (index, group) in self.groups.iter().enumerate() {
            match self.subscribe(index, group) {
                Ok(watcher) => {
                    crate::debug_event!("engine", "watching", "{}", group.root().display());
                    subscriptions.push(watcher);
                }
                Err(e) => tracing::warn!("[engine] {e}"),
            }
        }
        self.subscriptions = subscriptions;
    }

    /// Run until `cancel` fires, then stop.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), WatchError> {
        if self.groups.is_empty() {
            self.schedule()?;
        }
        let mut rx = self.event_rx.take().ok_or_else(|| WatchError::InitFailed {
            reason: "engine is already running".to_string(),
        })?;

        self.subscribe_all();
        self.state = EngineState::Running;

        let backend = match self.settings.backend {
            WatchBackend::Poll => format!("polling every {}s", self.settings.poll_interval),
            WatchBackend::Native => "native events".to_string(),
        };
        crate::log_event!(
            "engine",
            "started",
            "{} groups, {backend}",
            self.subscriptions.len()
        );

        let mut ticker = interval(self.settings.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    crate::log_event!("engine", "interrupted");
                    break;
                }

                Some((epoch, index, res)) = rx.recv() => {
                    if epoch != self.epoch {
                        continue;
                    }
                    match res {
                        Ok(event) => {
                            for raw in RawEvent::from_notify(&event) {
                                self.dispatch(index, &raw);
                            }
                        }
                        Err(e) => tracing::error!("[engine] file watch error: {e}"),
                    }
                }

                _ = ticker.tick() => {
                    self.tick(Instant::now());
                    self.check_reload();
                }
            }
        }

        self.stop();
        // Drain events of the finished run so a later run starts clean
        while rx.try_recv().is_ok() {}
        self.event_rx = Some(rx);
        Ok(())
    }

    /// Hand a raw event to the group at `index` of the current epoch.
    pub fn dispatch(&self, index: usize, raw: &RawEvent) {
        match self.groups.get(index) {
            Some(group) => group.on_event(raw, &self.courier),
            None => crate::debug_event!("engine", "stale event", "group {index}"),
        }
    }

    /// Periodic work: rollovers of batched channels and the process log.
    ///
    /// Returns the number of channels that delivered content.
    pub fn tick(&mut self, now: Instant) -> usize {
        let mut flushed: usize = self
            .groups
            .iter()
            .map(|group| group.poll_rollovers(now, &self.courier))
            .sum();

        if let Some(sender) = self.process_log.as_mut() {
            match sender.tick(now, &self.courier) {
                Ok(count) => flushed += count,
                Err(e) if e.is_fatal() => tracing::error!("[process-log] {e}"),
                Err(e) => tracing::warn!("[process-log] {e}"),
            }
        }
        flushed
    }

    fn check_reload(&mut self) {
        if !self.settings.reload {
            return;
        }
        let Some(path) = self.config_path.clone() else {
            return;
        };
        let current = modified(&path);
        if current.is_none() || current <= self.config_modified {
            return;
        }
        self.config_modified = current;

        crate::log_event!("config", "reloading", "{}", path.display());
        match Settings::load_from(&path) {
            Ok(settings) => match self.reconfigure(settings) {
                Ok(count) => crate::log_event!("config", "reloaded", "{count} groups"),
                Err(e) => tracing::warn!("[config] reload rejected, keeping current groups: {e}"),
            },
            Err(e) => tracing::warn!("[config] reload failed: {e}"),
        }
    }

    /// Unsubscribe and release the current epoch.
    fn teardown(&mut self) {
        // Unsubscribe before releasing channel resources
        self.subscriptions.clear();
        for group in self.groups.drain(..) {
            group.release(self.settings.cleanup_logs);
        }
        self.process_log = None;
    }

    /// Stop watching and release every group. Calling it again is a no-op.
    pub fn stop(&mut self) {
        if self.state == EngineState::Stopped {
            return;
        }
        self.teardown();
        self.state = EngineState::Stopped;
        crate::log_event!("engine", "stopped");
    }
}

impl Drop for DispatchEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn modified(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
