//! Normalized filesystem change events.
//!
//! The event source hands us notify events; they are first flattened into
//! [`RawEvent`]s (one per affected path) and then classified against a watch
//! root into immutable [`ChangeEvent`]s. Raw kinds we do not understand are
//! dropped during classification without being treated as errors.

use std::fmt;
use std::path::{Path, PathBuf};

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};

/// Kind of a classified change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    /// Moved within the same parent directory.
    Renamed,
    /// Moved to a different parent directory.
    Moved,
    Deleted,
}

impl ChangeKind {
    /// Every kind, in a stable order.
    pub const ALL: [ChangeKind; 5] = [
        ChangeKind::Created,
        ChangeKind::Modified,
        ChangeKind::Renamed,
        ChangeKind::Moved,
        ChangeKind::Deleted,
    ];

    /// Short configuration name of the kind (`cre`, `mod`, `ren`, `mov`, `del`).
    pub fn mnemonic(self) -> &'static str {
        match self {
            ChangeKind::Created => "cre",
            ChangeKind::Modified => "mod",
            ChangeKind::Renamed => "ren",
            ChangeKind::Moved => "mov",
            ChangeKind::Deleted => "del",
        }
    }

    fn verb(self) -> &'static str {
        match self {
            ChangeKind::Created => "CREATED",
            ChangeKind::Modified => "MODIFIED",
            ChangeKind::Renamed => "RENAMED",
            ChangeKind::Moved => "MOVED",
            ChangeKind::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Raw event kind as reported by the event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Created,
    Modified,
    Moved,
    Deleted,
    /// Anything else (access, partial rename halves, ...).
    Other,
}

/// A single filesystem mutation with absolute paths, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: RawKind,
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub is_directory: bool,
}

impl RawEvent {
    pub fn new(kind: RawKind, source: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            source: source.into(),
            destination: None,
            is_directory: false,
        }
    }

    pub fn moved(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            kind: RawKind::Moved,
            source: source.into(),
            destination: Some(destination.into()),
            is_directory: false,
        }
    }

    /// Mark the event as concerning a directory.
    pub fn directory(mut self) -> Self {
        self.is_directory = true;
        self
    }

    /// Paths touched by this event (source, then destination if any).
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.source.as_path()).chain(self.destination.as_deref())
    }

    /// Flatten a notify event into raw events.
    ///
    /// Paired renames (`RenameMode::Both`) become a single moved event; every
    /// other event produces one raw event per path.
    pub fn from_notify(event: &Event) -> Vec<RawEvent> {
        match event.kind {
            EventKind::Create(kind) => event
                .paths
                .iter()
                .map(|path| RawEvent {
                    is_directory: kind == CreateKind::Folder || path.is_dir(),
                    ..RawEvent::new(RawKind::Created, path)
                })
                .collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => {
                let (source, destination) = (&event.paths[0], &event.paths[1]);
                vec![RawEvent {
                    is_directory: destination.is_dir(),
                    ..RawEvent::moved(source, destination)
                }]
            }
            EventKind::Modify(ModifyKind::Name(_)) => event
                .paths
                .iter()
                .map(|path| RawEvent::new(RawKind::Other, path))
                .collect(),
            EventKind::Modify(_) => event
                .paths
                .iter()
                .map(|path| RawEvent {
                    is_directory: path.is_dir(),
                    ..RawEvent::new(RawKind::Modified, path)
                })
                .collect(),
            EventKind::Remove(kind) => event
                .paths
                .iter()
                .map(|path| RawEvent {
                    is_directory: kind == RemoveKind::Folder,
                    ..RawEvent::new(RawKind::Deleted, path)
                })
                .collect(),
            _ => event
                .paths
                .iter()
                .map(|path| RawEvent::new(RawKind::Other, path))
                .collect(),
        }
    }
}

/// A classified change, with paths relative to the watch root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    kind: ChangeKind,
    is_directory: bool,
    source: PathBuf,
    destination: Option<PathBuf>,
    watch_root: PathBuf,
}

impl ChangeEvent {
    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Destination path; present only for renamed and moved events.
    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }

    pub fn watch_root(&self) -> &Path {
        &self.watch_root
    }

    /// Human readable description, e.g. `CREATED FILE docs/a.txt`.
    pub fn describe(&self) -> String {
        let what = if self.is_directory { "DIRECTORY" } else { "FILE" };
        let source = self.source.display();
        match (self.kind, &self.destination) {
            (ChangeKind::Renamed, Some(dest)) => {
                let name = dest
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                format!("{} {what} {source} ==> {name}", self.kind.verb())
            }
            (ChangeKind::Moved, Some(dest)) => {
                format!("{} {what} {source} ==> {}", self.kind.verb(), dest.display())
            }
            _ => format!("{} {what} {source}", self.kind.verb()),
        }
    }
}

/// Classify a raw event against a watch root.
///
/// Returns `None` for raw kinds that carry no change (silently) and for paths
/// outside `root` (with a warning, as a correctly scoped subscription never
/// produces them).
pub fn classify(raw: &RawEvent, root: &Path) -> Option<ChangeEvent> {
    let kind = match raw.kind {
        RawKind::Created => ChangeKind::Created,
        RawKind::Modified => ChangeKind::Modified,
        RawKind::Deleted => ChangeKind::Deleted,
        RawKind::Moved => {
            let destination = raw.destination.as_ref()?;
            if raw.source.parent() == destination.parent() {
                ChangeKind::Renamed
            } else {
                ChangeKind::Moved
            }
        }
        RawKind::Other => return None,
    };

    let source = relative_to(&raw.source, root)?;
    let destination = match &raw.destination {
        Some(dest) if matches!(kind, ChangeKind::Renamed | ChangeKind::Moved) => {
            Some(relative_to(dest, root)?)
        }
        _ => None,
    };

    Some(ChangeEvent {
        kind,
        is_directory: raw.is_directory,
        source,
        destination,
        watch_root: root.to_path_buf(),
    })
}

fn relative_to(path: &Path, root: &Path) -> Option<PathBuf> {
    match path.strip_prefix(root) {
        Ok(relative) => Some(relative.to_path_buf()),
        Err(_) => {
            tracing::warn!(
                "[classify] {} is outside watch root {}, dropped",
                path.display(),
                root.display()
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/data")
    }

    #[test]
    fn test_direct_kinds_map_one_to_one() {
        let cases = [
            (RawKind::Created, ChangeKind::Created),
            (RawKind::Modified, ChangeKind::Modified),
            (RawKind::Deleted, ChangeKind::Deleted),
        ];
        for (raw_kind, expected) in cases {
            let event = classify(&RawEvent::new(raw_kind, "/data/a.txt"), &root()).unwrap();
            assert_eq!(event.kind(), expected);
            assert_eq!(event.source(), Path::new("a.txt"));
            assert!(event.destination().is_none());
        }
    }

    #[test]
    fn test_move_in_same_directory_is_rename() {
        let raw = RawEvent::moved("/data/docs/a.txt", "/data/docs/b.txt");
        let event = classify(&raw, &root()).unwrap();
        assert_eq!(event.kind(), ChangeKind::Renamed);
        assert_eq!(event.destination(), Some(Path::new("docs/b.txt")));
        assert_eq!(event.describe(), "RENAMED FILE docs/a.txt ==> b.txt");
    }

    #[test]
    fn test_move_across_directories() {
        let raw = RawEvent::moved("/data/docs/a.txt", "/data/archive/a.txt").directory();
        let event = classify(&raw, &root()).unwrap();
        assert_eq!(event.kind(), ChangeKind::Moved);
        assert_eq!(
            event.describe(),
            "MOVED DIRECTORY docs/a.txt ==> archive/a.txt"
        );
    }

    #[test]
    fn test_unknown_kind_is_dropped() {
        assert!(classify(&RawEvent::new(RawKind::Other, "/data/a.txt"), &root()).is_none());
    }

    #[test]
    fn test_path_outside_root_is_dropped() {
        assert!(classify(&RawEvent::new(RawKind::Created, "/etc/passwd"), &root()).is_none());
        let raw = RawEvent::moved("/data/a.txt", "/elsewhere/a.txt");
        assert!(classify(&raw, &root()).is_none());
    }

    #[test]
    fn test_describe_created_file() {
        let event = classify(&RawEvent::new(RawKind::Created, "/data/a.txt"), &root()).unwrap();
        assert_eq!(event.describe(), "CREATED FILE a.txt");
        assert_eq!(event.watch_root(), Path::new("/data"));
    }

    #[test]
    fn test_from_notify_rename_pair() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/data/a.txt"))
            .add_path(PathBuf::from("/data/b.txt"));
        let raws = RawEvent::from_notify(&event);
        assert_eq!(raws.len(), 1);
        assert_eq!(raws[0].kind, RawKind::Moved);
        assert_eq!(raws[0].destination.as_deref(), Some(Path::new("/data/b.txt")));
    }

    #[test]
    fn test_from_notify_rename_halves_are_other() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(PathBuf::from("/data/a.txt"));
        let raws = RawEvent::from_notify(&event);
        assert_eq!(raws[0].kind, RawKind::Other);
    }

    #[test]
    fn test_from_notify_remove_folder() {
        let event = Event::new(EventKind::Remove(RemoveKind::Folder))
            .add_path(PathBuf::from("/data/old"));
        let raws = RawEvent::from_notify(&event);
        assert_eq!(raws[0].kind, RawKind::Deleted);
        assert!(raws[0].is_directory);
    }
}
