//! Include/exclude glob filtering of raw events.

use glob::{MatchOptions, Pattern};
use std::path::Path;

use super::error::WatchError;
use crate::event::RawEvent;

/// Glob filter of one watch group.
///
/// Patterns are matched against the full path, and `*` also matches path
/// separators, so `*.txt` selects text files at any depth.
#[derive(Debug, Clone)]
pub struct PatternFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    ignore_dirs: bool,
    options: MatchOptions,
}

impl PatternFilter {
    pub fn new(
        include: &[String],
        exclude: &[String],
        ignore_dirs: bool,
        case_sensitive: bool,
    ) -> Result<Self, WatchError> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
            ignore_dirs,
            options: MatchOptions {
                case_sensitive,
                require_literal_separator: false,
                require_literal_leading_dot: false,
            },
        })
    }

    /// Whether any path of `raw` passes the filter.
    pub fn matches(&self, raw: &RawEvent) -> bool {
        if self.ignore_dirs && raw.is_directory {
            return false;
        }
        raw.paths().any(|path| self.matches_path(path))
    }

    pub fn matches_path(&self, path: &Path) -> bool {
        let included = self.include.is_empty()
            || self
                .include
                .iter()
                .any(|p| p.matches_path_with(path, self.options));
        included
            && !self
                .exclude
                .iter()
                .any(|p| p.matches_path_with(path, self.options))
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, WatchError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| WatchError::config(format!("pattern '{p}'"), e.to_string()))
        })
        .collect()
}
