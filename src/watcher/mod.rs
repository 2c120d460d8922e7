//! Watch groups and the dispatch engine.
//!
//! # Architecture
//!
//! ```text
//! DispatchEngine (one scheduling epoch)
//!   - one notify watcher per group
//!   - tick: rollovers + process log
//!         |
//!    +---------+---------+
//!    |         |         |
//! WatchGroup WatchGroup ...
//!   filter -> classify -> channels (message | alert)
//!                            |
//!                 immediate: Courier
//!                 batched:   ChannelLog -> rollover -> Courier
//! ```

mod engine;
mod error;
mod filter;
mod group;
mod process_log;

pub use engine::{DispatchEngine, EngineState};
pub use error::WatchError;
pub use filter::PatternFilter;
pub use group::{AUDIT_TARGET, WatchGroup, build_groups, sweep_stale_logs};
pub use process_log::ProcessLogSender;
