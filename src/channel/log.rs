//! Rotating evidence log behind a batched channel.
//!
//! A [`ChannelLog`] is an append-only text file plus a rollover deadline. All
//! access goes through one lock, so "read the file, hand the snapshot to the
//! channel, truncate it" is a single critical section: appends from the event
//! path wait until the truncation is done, and a flush can never interleave
//! with a rollover of the same log.

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use crate::watcher::WatchError;

/// Content of a log at flush time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub path: PathBuf,
    pub content: String,
}

#[derive(Debug, Default)]
struct LogState {
    file: Option<File>,
    next_rollover: Option<Instant>,
    last_flush: Option<Instant>,
    flushing: bool,
}

type StateGuard<'a> = ReentrantMutexGuard<'a, RefCell<LogState>>;

/// Append-only backing file of one channel.
#[derive(Debug)]
pub struct ChannelLog {
    path: PathBuf,
    rotation: Option<Duration>,
    owned: bool,
    // Reentrant so that a flush callback touching the same log fails with
    // RotationRace instead of deadlocking.
    state: ReentrantMutex<RefCell<LogState>>,
}

impl ChannelLog {
    /// Create the log of a batched channel, rolling over every `rotation`.
    ///
    /// A file left at `path` by a previous run is removed; nothing is carried
    /// across restarts. The file itself is created on the first append.
    pub fn create(
        path: impl Into<PathBuf>,
        rotation: Duration,
        now: Instant,
    ) -> Result<Self, WatchError> {
        let path = path.into();
        if rotation.is_zero() {
            return Err(WatchError::config(
                path.display().to_string(),
                "rotation interval must be positive",
            ));
        }

        let Some(first_rollover) = now.checked_add(rotation) else {
            return Err(WatchError::config(
                path.display().to_string(),
                "rotation interval is too large",
            ));
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| WatchError::io(parent, e))?;
        }
        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!("[log] removed leftover {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(WatchError::io(&path, e)),
        }

        Ok(Self {
            path,
            rotation: Some(rotation),
            owned: true,
            state: ReentrantMutex::new(RefCell::new(LogState {
                next_rollover: Some(first_rollover),
                ..LogState::default()
            })),
        })
    }

    /// Wrap a file written by another component (the aggregate process log).
    ///
    /// External logs never roll over on their own and are never deleted.
    pub fn external(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rotation: None,
            owned: false,
            state: ReentrantMutex::new(RefCell::new(LogState::default())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rotation(&self) -> Option<Duration> {
        self.rotation
    }

    /// Append one line, opening the backing file on first use.
    pub fn append(&self, line: &str) -> Result<(), WatchError> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if state.flushing {
            return Err(self.race());
        }

        if state.file.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|e| WatchError::io(&self.path, e))?;
            state.file = Some(file);
        }
        if let Some(file) = state.file.as_mut() {
            file.write_all(line.trim_end_matches(['\r', '\n']).as_bytes())
                .and_then(|_| file.write_all(b"\n"))
                .map_err(|e| WatchError::io(&self.path, e))?;
        }
        Ok(())
    }

    pub fn next_rollover(&self) -> Option<Instant> {
        self.state.lock().borrow().next_rollover
    }

    pub fn rollover_due(&self, now: Instant) -> bool {
        self.next_rollover().is_some_and(|deadline| now >= deadline)
    }

    pub fn last_flush(&self) -> Option<Instant> {
        self.state.lock().borrow().last_flush
    }

    /// Modification time of the backing file, if it exists.
    pub fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    /// Roll over if the deadline has passed.
    ///
    /// The current content is handed to `on_flush` before the file is
    /// truncated, and the deadline advances by whole rotation intervals so a
    /// stalled loop does not fire a burst of rollovers. Returns whether a
    /// non-empty snapshot was handed over.
    pub fn rollover<F>(&self, now: Instant, on_flush: F) -> Result<bool, WatchError>
    where
        F: FnOnce(&Snapshot),
    {
        let guard = self.state.lock();
        {
            let mut state = guard.borrow_mut();
            let (Some(rotation), Some(deadline)) = (self.rotation, state.next_rollover) else {
                return Ok(false);
            };
            if now < deadline {
                return Ok(false);
            }
            if state.flushing {
                return Err(self.race());
            }
            let mut next = Some(deadline);
            while let Some(at) = next.filter(|at| *at <= now) {
                next = at.checked_add(rotation);
            }
            if next.is_none() {
                tracing::warn!("[log] {} has no further rollover", self.path.display());
            }
            state.next_rollover = next;
        }
        self.flush_locked(&guard, now, on_flush)
    }

    /// Flush immediately, independent of the rollover deadline.
    pub fn flush<F>(&self, now: Instant, on_flush: F) -> Result<bool, WatchError>
    where
        F: FnOnce(&Snapshot),
    {
        let guard = self.state.lock();
        self.flush_locked(&guard, now, on_flush)
    }

    fn flush_locked<F>(&self, guard: &StateGuard<'_>, now: Instant, on_flush: F) -> Result<bool, WatchError>
    where
        F: FnOnce(&Snapshot),
    {
        {
            let mut state = guard.borrow_mut();
            if state.flushing {
                return Err(self.race());
            }
            state.flushing = true;
        }

        let result = match fs::read(&self.path) {
            Ok(bytes) => {
                let content = String::from_utf8_lossy(&bytes).into_owned();
                let delivered = !content.trim().is_empty();
                if delivered {
                    on_flush(&Snapshot {
                        path: self.path.clone(),
                        content,
                    });
                }
                self.truncate(guard).map(|_| delivered)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(WatchError::io(&self.path, e)),
        };

        let mut state = guard.borrow_mut();
        state.flushing = false;
        state.last_flush = Some(now);
        result
    }

    fn truncate(&self, guard: &StateGuard<'_>) -> Result<(), WatchError> {
        let state = guard.borrow();
        let outcome = match state.file.as_ref() {
            Some(file) => file.set_len(0),
            None => OpenOptions::new()
                .write(true)
                .open(&self.path)
                .and_then(|file| file.set_len(0)),
        };
        outcome.map_err(|e| WatchError::io(&self.path, e))
    }

    /// Release the file handle and, for owned logs, optionally delete the file.
    pub fn close(&self, remove: bool) -> Result<(), WatchError> {
        let guard = self.state.lock();
        guard.borrow_mut().file = None;

        if remove && self.owned {
            match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(WatchError::io(&self.path, e)),
            }
        }
        Ok(())
    }

    fn race(&self) -> WatchError {
        WatchError::RotationRace {
            path: self.path.clone(),
        }
    }
}
