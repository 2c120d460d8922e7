//! Directory change monitor.
//!
//! Watches directory trees, classifies filesystem changes and routes them to
//! notification channels that either deliver each event immediately or batch
//! them into a rotating log delivered once per interval.

pub mod channel;
pub mod cli;
pub mod config;
pub mod delivery;
pub mod event;
pub mod logging;
pub mod watcher;

pub use channel::{ChannelLog, NotificationChannel};
pub use config::Settings;
pub use delivery::{Courier, Delivery};
pub use event::{ChangeEvent, ChangeKind, RawEvent, RawKind, classify};
pub use watcher::{DispatchEngine, WatchError, WatchGroup};
