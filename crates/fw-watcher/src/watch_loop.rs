//! The watch thread.
//!
//! A [`WatchLoop`] drains raw notifications from the watch primitive,
//! translates them into [`ChangeEvent`]s, and pushes each one into every
//! consumer group's [`EventQueue`]. It also keeps the [`DirectoryRegistrar`]
//! in step with the tree: new directories are registered before their
//! creation event is emitted, deleted ones are unregistered.
//!
//! # New directories
//!
//! Files can land in a new directory before its watch is in place. When a
//! directory appears, the loop registers its whole subtree and emits a
//! synthesized `Created` event for every entry found inside. Each of those
//! paths is remembered as *seeded* for [`DUPLICATE_WINDOW`], and an OS
//! `Created` for a seeded path arriving within that time is suppressed, so
//! every entry is reported once no matter which side of the registration it
//! was created on. A rename onto a seeded path is always reported.
//!
//! Deleted directories are remembered for the same time to fold the second
//! removal notice some backends send.
//!
//! # Faults
//!
//! The loop ends with an error when the notification channel closes, when
//! the watch root is removed, or after [`MAX_CONSECUTIVE_ERRORS`] primitive
//! errors in a row.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use crossbeam_channel::{Receiver, Sender};
use fw_core::EventKind;
use notify::event::{EventKind as RawKind, ModifyKind, RenameMode};
use rustc_hash::FxHashMap;
use serde::Serialize;
use smallvec::SmallVec;

use crate::error::WatchError;
use crate::events::ChangeEvent;
use crate::primitive::{RawNotification, WatchPrimitive};
use crate::queue::EventQueue;
use crate::registrar::DirectoryRegistrar;
use crate::shutdown::ShutdownSignal;
use crate::stats::LoopStats;

/// Primitive errors tolerated back to back before the loop gives up.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 16;

/// How long a scanned entry or a removed directory is remembered while its
/// duplicate OS notice may still arrive.
pub const DUPLICATE_WINDOW: Duration = Duration::from_secs(2);

/// Lifecycle of an endpoint's watch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum LoopState {
    /// Not watching.
    Stopped = 0,
    /// Preparing the root and registering directories.
    Starting = 1,
    /// Delivering events.
    Running = 2,
    /// Shutting down, or halted by a fault until `stop()` is called.
    Stopping = 3,
}

impl LoopState {
    /// Returns the upper-case name of the state.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Stopped => "STOPPED",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A [`LoopState`] shared between the endpoint and its watch thread.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl Default for StateCell {
    fn default() -> Self {
        Self(AtomicU8::new(LoopState::Stopped as u8))
    }
}

impl StateCell {
    /// Creates a cell in [`LoopState::Stopped`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn get(&self) -> LoopState {
        LoopState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Sets the state unconditionally.
    #[inline]
    pub fn set(&self, state: LoopState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves from `from` to `to`, returning `false` if the state was not
    /// `from`.
    #[inline]
    pub fn transition(&self, from: LoopState, to: LoopState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Paths remembered for a limited time to fold a late duplicate notice.
#[derive(Debug)]
struct RecentPaths {
    seen: FxHashMap<Utf8PathBuf, Instant>,
    window: Duration,
}

impl RecentPaths {
    fn new(window: Duration) -> Self {
        Self {
            seen: FxHashMap::default(),
            window,
        }
    }

    fn insert(&mut self, path: Utf8PathBuf) {
        self.seen.insert(path, Instant::now());
    }

    /// Forgets `path`, returning `true` if it was remembered within the
    /// window.
    fn take(&mut self, path: &Utf8Path) -> bool {
        self.seen
            .remove(path)
            .is_some_and(|at| at.elapsed() <= self.window)
    }

    fn forget_under(&mut self, dir: &Utf8Path) {
        self.seen.retain(|path, _| !path.starts_with(dir));
    }

    fn expire(&mut self) {
        let window = self.window;
        self.seen.retain(|_, at| at.elapsed() <= window);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.seen.len()
    }
}

type Changes = SmallVec<[(EventKind, PathBuf); 2]>;

/// Translates a raw notification into change kinds per path.
///
/// Renames are reported as a deletion of the old path and a creation of the
/// new one. Backends that pair the two halves (`RenameMode::Both`) also
/// report each half on its own, so the paired form is skipped. When the
/// backend cannot tell which half it saw, the path's existence decides.
fn translate(kind: RawKind, paths: Vec<PathBuf>) -> Changes {
    let all = |kind: EventKind, paths: Vec<PathBuf>| -> Changes {
        paths.into_iter().map(|path| (kind, path)).collect()
    };

    match kind {
        RawKind::Create(_) => all(EventKind::Created, paths),
        RawKind::Remove(_) => all(EventKind::Deleted, paths),
        RawKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => all(EventKind::Deleted, paths),
            RenameMode::To => all(EventKind::Created, paths),
            RenameMode::Both => Changes::new(),
            RenameMode::Any | RenameMode::Other => paths
                .into_iter()
                .map(|path| {
                    if std::fs::symlink_metadata(&path).is_ok() {
                        (EventKind::Created, path)
                    } else {
                        (EventKind::Deleted, path)
                    }
                })
                .collect(),
        },
        RawKind::Modify(_) => all(EventKind::Modified, paths),
        RawKind::Access(_) | RawKind::Any | RawKind::Other => Changes::new(),
    }
}

/// Drains the watch primitive and feeds the consumer queues.
pub struct WatchLoop<P> {
    registrar: DirectoryRegistrar<P>,
    raw_rx: Receiver<RawNotification>,
    outputs: Vec<EventQueue>,
    shutdown: ShutdownSignal,
    state: Arc<StateCell>,
    stats: Arc<LoopStats>,
    ready: Option<Sender<()>>,
    consecutive_errors: u32,
    /// Entries reported by a directory scan whose OS event may still arrive.
    seeded: RecentPaths,
    /// Directories reported deleted whose second removal notice may still
    /// arrive (parent entry and the directory's own watch).
    removed_dirs: RecentPaths,
    /// Last directory reported modified, to fold the matching self-notice.
    last_dir_modified: Option<Utf8PathBuf>,
}

impl<P> fmt::Debug for WatchLoop<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchLoop")
            .field("registrar", &self.registrar)
            .field("outputs", &self.outputs.len())
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

impl<P: WatchPrimitive> WatchLoop<P> {
    /// Creates a loop over an already registered tree.
    pub fn new(
        registrar: DirectoryRegistrar<P>,
        raw_rx: Receiver<RawNotification>,
        outputs: Vec<EventQueue>,
        shutdown: ShutdownSignal,
        state: Arc<StateCell>,
        stats: Arc<LoopStats>,
    ) -> Self {
        Self {
            registrar,
            raw_rx,
            outputs,
            shutdown,
            state,
            stats,
            ready: None,
            consecutive_errors: 0,
            seeded: RecentPaths::new(DUPLICATE_WINDOW),
            removed_dirs: RecentPaths::new(DUPLICATE_WINDOW),
            last_dir_modified: None,
        }
    }

    /// Sends one message on `ready` once the loop is running.
    #[must_use]
    pub fn with_ready_signal(mut self, ready: Sender<()>) -> Self {
        self.ready = Some(ready);
        self
    }

    /// Runs until the stop signal fires or a fault ends the loop.
    ///
    /// Every watch is removed before returning. The state is left at
    /// [`LoopState::Stopping`]; the endpoint moves it to `Stopped` once the
    /// consumers have been joined.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::PrimitiveClosed`], [`WatchError::RootRemoved`]
    /// or [`WatchError::TooManyErrors`] when the loop ends on a fault.
    pub fn run(mut self) -> Result<(), WatchError> {
        self.state.set(LoopState::Running);
        if let Some(ready) = self.ready.take() {
            let _ = ready.send(());
        }
        tracing::info!(
            root = %self.registrar.root(),
            directories = self.registrar.len(),
            consumers = self.outputs.len(),
            "Watch loop running"
        );

        let result = self.drain();
        self.state.set(LoopState::Stopping);

        let removed = self.registrar.unregister_all();
        self.stats.add_unregistered(removed as u64);

        match &result {
            Ok(()) => tracing::info!(root = %self.registrar.root(), "Watch loop stopped"),
            Err(e) => tracing::error!(
                root = %self.registrar.root(),
                error = %e,
                "Watch loop terminated"
            ),
        }
        result
    }

    fn drain(&mut self) -> Result<(), WatchError> {
        let raw_rx = self.raw_rx.clone();
        let stop_rx = self.shutdown.receiver().clone();

        loop {
            crossbeam_channel::select! {
                recv(stop_rx) -> _ => return Ok(()),
                recv(raw_rx) -> message => match message {
                    Ok(Ok(event)) => {
                        self.consecutive_errors = 0;
                        self.handle_notification(event)?;
                    }
                    Ok(Err(error)) => self.handle_error(&error)?,
                    Err(_) => return Err(WatchError::PrimitiveClosed),
                },
                default(DUPLICATE_WINDOW) => self.expire_recent(),
            }
        }
    }

    fn handle_error(&mut self, error: &notify::Error) -> Result<(), WatchError> {
        self.stats.increment_notify_errors();
        self.consecutive_errors += 1;
        tracing::warn!(
            error = %error,
            paths = ?error.paths,
            consecutive = self.consecutive_errors,
            "Watch primitive error"
        );

        if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
            return Err(WatchError::TooManyErrors {
                count: self.consecutive_errors,
                last: error.to_string(),
            });
        }
        Ok(())
    }

    fn expire_recent(&mut self) {
        self.seeded.expire();
        self.removed_dirs.expire();
    }

    fn handle_notification(&mut self, event: notify::Event) -> Result<(), WatchError> {
        self.expire_recent();
        if event.need_rescan() {
            tracing::warn!("Watch primitive overflowed, some changes may have been missed");
        }

        let renamed = matches!(event.kind, RawKind::Modify(ModifyKind::Name(_)));
        for (kind, raw) in translate(event.kind, event.paths) {
            let path = match Utf8PathBuf::from_path_buf(raw) {
                Ok(path) => path,
                Err(raw) => {
                    let err = WatchError::non_utf8_path(raw);
                    tracing::warn!(error = %err, "Skipping change notification");
                    continue;
                }
            };
            self.handle_change(kind, path, renamed)?;
        }
        Ok(())
    }

    fn handle_change(
        &mut self,
        kind: EventKind,
        path: Utf8PathBuf,
        renamed: bool,
    ) -> Result<(), WatchError> {
        if path == self.registrar.root() {
            if kind == EventKind::Deleted {
                return Err(WatchError::RootRemoved(path));
            }
            tracing::trace!(kind = %kind, "Ignoring change on the watch root itself");
            return Ok(());
        }

        let Some(path) = self.resolve(&path) else {
            tracing::trace!(kind = %kind, path = %path, "Ignoring change in unwatched directory");
            return Ok(());
        };

        match kind {
            EventKind::Created => self.on_created(path, renamed),
            EventKind::Deleted => self.on_deleted(path),
            EventKind::Modified => self.on_modified(path),
        }
        Ok(())
    }

    /// Rebuilds `path` from the watch key of its parent directory.
    fn resolve(&self, path: &Utf8Path) -> Option<Utf8PathBuf> {
        let name = path.file_name()?;
        let key = self.registrar.key_for(path.parent()?)?;
        self.registrar.resolve(key).map(|dir| dir.join(name))
    }

    fn on_created(&mut self, path: Utf8PathBuf, renamed: bool) {
        self.removed_dirs.take(&path);
        self.last_dir_modified = None;

        if self.seeded.take(&path) && !renamed {
            tracing::trace!(path = %path, "Already reported by directory scan");
            return;
        }

        let is_dir = std::fs::symlink_metadata(&path).is_ok_and(|meta| meta.is_dir());
        if !is_dir {
            self.emit(EventKind::Created, path);
            return;
        }

        let scan = self.registrar.register_subtree(&path);
        self.stats.add_registered(scan.registered.len() as u64);
        tracing::debug!(
            dir = %path,
            registered = scan.registered.len(),
            entries = scan.entries.len(),
            "Registered new directory"
        );

        self.emit(EventKind::Created, path);
        for entry in scan.entries {
            self.seeded.insert(entry.clone());
            self.stats.increment_synthesized();
            self.emit(EventKind::Created, entry);
        }
    }

    fn on_deleted(&mut self, path: Utf8PathBuf) {
        self.last_dir_modified = None;
        self.seeded.forget_under(&path);

        if self.registrar.is_registered(&path) {
            let removed = self.registrar.unregister(&path);
            self.stats.add_unregistered(removed.len() as u64);
            tracing::debug!(dir = %path, unregistered = removed.len(), "Directory removed");
            self.removed_dirs.insert(path.clone());
            self.emit(EventKind::Deleted, path);
        } else if self.removed_dirs.take(&path) {
            tracing::trace!(path = %path, "Directory removal already reported");
        } else {
            self.emit(EventKind::Deleted, path);
        }
    }

    fn on_modified(&mut self, path: Utf8PathBuf) {
        self.seeded.take(&path);

        if self.registrar.is_registered(&path) {
            if self.last_dir_modified.as_ref() == Some(&path) {
                self.last_dir_modified = None;
                tracing::trace!(dir = %path, "Directory change already reported");
                return;
            }
            self.last_dir_modified = Some(path.clone());
        } else {
            self.last_dir_modified = None;
        }

        self.emit(EventKind::Modified, path);
    }

    fn emit(&self, kind: EventKind, path: Utf8PathBuf) {
        if self.shutdown.is_triggered() {
            return;
        }

        self.stats.increment_detected();
        tracing::debug!(kind = %kind, path = %path, "Detected change");

        let event = ChangeEvent::new(kind, path);
        if let Some((last, rest)) = self.outputs.split_last() {
            for queue in rest {
                queue.push(event.clone());
            }
            last.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::testing::RecordingPrimitive;
    use crate::shutdown::{ShutdownTrigger, shutdown_pair};
    use crate::stats::ConsumerStats;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        _temp: TempDir,
        root: Utf8PathBuf,
        primitive: RecordingPrimitive,
        queue: EventQueue,
        trigger: ShutdownTrigger,
        raw_tx: Sender<RawNotification>,
        stats: Arc<LoopStats>,
        state: Arc<StateCell>,
        watch: WatchLoop<RecordingPrimitive>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_tree(&[])
        }

        fn with_tree(dirs: &[&str]) -> Self {
            let temp = TempDir::new().expect("Failed to create temp directory");
            let path = Utf8Path::from_path(temp.path()).expect("Invalid path");
            let root = crate::registrar::ensure_root(path, false).unwrap();
            for dir in dirs {
                fs::create_dir_all(root.join(dir)).unwrap();
            }

            let primitive = RecordingPrimitive::default();
            let mut registrar = DirectoryRegistrar::new(primitive.clone(), root.clone());
            registrar.register_tree().unwrap();

            let (trigger, signal) = shutdown_pair();
            let queue = EventQueue::new(None, signal.clone(), Arc::new(ConsumerStats::new()));
            let (raw_tx, raw_rx) = crossbeam_channel::unbounded();
            let stats = Arc::new(LoopStats::new());
            let state = Arc::new(StateCell::new());
            let watch = WatchLoop::new(
                registrar,
                raw_rx,
                vec![queue.clone()],
                signal,
                Arc::clone(&state),
                Arc::clone(&stats),
            );

            Self {
                _temp: temp,
                root,
                primitive,
                queue,
                trigger,
                raw_tx,
                stats,
                state,
                watch,
            }
        }

        fn notify(&mut self, kind: RawKind, paths: &[&Utf8Path]) -> Result<(), WatchError> {
            let mut event = notify::Event::new(kind);
            for path in paths {
                event = event.add_path(path.as_std_path().to_path_buf());
            }
            self.watch.handle_notification(event)
        }

        fn emitted(&self) -> Vec<(EventKind, String)> {
            std::iter::from_fn(|| self.queue.pop(Duration::from_millis(1)))
                .map(|event| {
                    let relative = event.relative_to(&self.root).map(|p| p.to_string());
                    (event.kind, relative.unwrap_or_default())
                })
                .collect()
        }
    }

    fn paths(list: &[&str]) -> Vec<PathBuf> {
        list.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_translate_kinds() {
        let created = translate(RawKind::Create(CreateKind::File), paths(&["/r/a"]));
        assert_eq!(created.as_slice(), &[(EventKind::Created, PathBuf::from("/r/a"))]);

        let removed = translate(RawKind::Remove(RemoveKind::Folder), paths(&["/r/d"]));
        assert_eq!(removed.as_slice(), &[(EventKind::Deleted, PathBuf::from("/r/d"))]);

        let data = translate(RawKind::Modify(ModifyKind::Data(DataChange::Content)), paths(&["/r/a"]));
        assert_eq!(data[0].0, EventKind::Modified);

        let meta = translate(
            RawKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            paths(&["/r/a"]),
        );
        assert_eq!(meta[0].0, EventKind::Modified);

        assert!(translate(RawKind::Access(AccessKind::Read), paths(&["/r/a"])).is_empty());
        assert!(translate(RawKind::Other, paths(&["/r/a"])).is_empty());
    }

    #[test]
    fn test_translate_rename_halves() {
        let from = translate(RawKind::Modify(ModifyKind::Name(RenameMode::From)), paths(&["/r/old"]));
        assert_eq!(from.as_slice(), &[(EventKind::Deleted, PathBuf::from("/r/old"))]);

        let to = translate(RawKind::Modify(ModifyKind::Name(RenameMode::To)), paths(&["/r/new"]));
        assert_eq!(to.as_slice(), &[(EventKind::Created, PathBuf::from("/r/new"))]);

        let both = translate(
            RawKind::Modify(ModifyKind::Name(RenameMode::Both)),
            paths(&["/r/old", "/r/new"]),
        );
        assert!(both.is_empty());
    }

    #[test]
    fn test_translate_ambiguous_rename_checks_existence() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("here");
        fs::write(&present, "x").unwrap();
        let absent = temp.path().join("gone");

        let changes = translate(
            RawKind::Modify(ModifyKind::Name(RenameMode::Any)),
            vec![present.clone(), absent.clone()],
        );
        assert_eq!(
            changes.as_slice(),
            &[(EventKind::Created, present), (EventKind::Deleted, absent)]
        );
    }

    #[test]
    fn test_file_changes_are_emitted() {
        let mut h = Harness::new();
        let file = h.root.join("a.txt");
        fs::write(&file, "x").unwrap();

        h.notify(RawKind::Create(CreateKind::File), &[&file]).unwrap();
        h.notify(RawKind::Modify(ModifyKind::Data(DataChange::Any)), &[&file]).unwrap();
        fs::remove_file(&file).unwrap();
        h.notify(RawKind::Remove(RemoveKind::File), &[&file]).unwrap();

        insta::assert_debug_snapshot!(h.emitted(), @r#"
        [
            (
                Created,
                "a.txt",
            ),
            (
                Modified,
                "a.txt",
            ),
            (
                Deleted,
                "a.txt",
            ),
        ]
        "#);
        assert_eq!(h.stats.snapshot().detected, 3);
    }

    #[test]
    fn test_new_directory_contents_are_reported_once() {
        let mut h = Harness::new();
        let dir = h.root.join("drop");
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("early.txt"), "1").unwrap();
        fs::write(dir.join("nested/deep.txt"), "2").unwrap();

        h.notify(RawKind::Create(CreateKind::Folder), &[&dir]).unwrap();

        // The OS also saw early.txt after the watch went in.
        h.notify(RawKind::Create(CreateKind::File), &[&dir.join("early.txt")]).unwrap();

        // A file created later is reported normally.
        fs::write(dir.join("late.txt"), "3").unwrap();
        h.notify(RawKind::Create(CreateKind::File), &[&dir.join("late.txt")]).unwrap();

        let emitted: Vec<_> = h.emitted().into_iter().map(|(_, p)| p).collect();
        assert_eq!(
            emitted,
            vec![
                "drop",
                "drop/early.txt",
                "drop/nested",
                "drop/nested/deep.txt",
                "drop/late.txt",
            ]
        );
        assert!(h.primitive.watched().contains(&dir));
        assert!(h.primitive.watched().contains(&dir.join("nested")));
        let snap = h.stats.snapshot();
        assert_eq!(snap.synthesized, 3);
        assert_eq!(snap.detected, 5);
    }

    #[test]
    fn test_rename_onto_scanned_entry_is_reported() {
        let mut h = Harness::new();
        let dir = h.root.join("batch");
        let file = dir.join("f.csv");
        fs::create_dir(&dir).unwrap();
        fs::write(&file, "1").unwrap();

        h.notify(RawKind::Create(CreateKind::Folder), &[&dir]).unwrap();
        assert_eq!(h.watch.seeded.len(), 1);

        // Write-to-temp-then-rename save over the scanned file.
        h.notify(RawKind::Modify(ModifyKind::Name(RenameMode::To)), &[&file]).unwrap();

        insta::assert_debug_snapshot!(h.emitted(), @r#"
        [
            (
                Created,
                "batch",
            ),
            (
                Created,
                "batch/f.csv",
            ),
            (
                Created,
                "batch/f.csv",
            ),
        ]
        "#);
        assert_eq!(h.watch.seeded.len(), 0);
    }

    #[test]
    fn test_scanned_entries_are_forgotten_after_window() {
        let mut h = Harness::new();
        h.watch.seeded = RecentPaths::new(Duration::from_millis(20));
        let dir = h.root.join("prepared");
        fs::create_dir(&dir).unwrap();
        for name in ["a", "b", "c"] {
            fs::write(dir.join(name), "x").unwrap();
        }

        h.notify(RawKind::Create(CreateKind::Folder), &[&dir]).unwrap();
        assert_eq!(h.watch.seeded.len(), 3);
        std::thread::sleep(Duration::from_millis(50));

        let other = h.root.join("other.txt");
        fs::write(&other, "x").unwrap();
        h.notify(RawKind::Create(CreateKind::File), &[&other]).unwrap();
        assert_eq!(h.watch.seeded.len(), 0);

        // A real creation after the window is reported again.
        h.notify(RawKind::Create(CreateKind::File), &[&dir.join("a")]).unwrap();
        let emitted: Vec<_> = h.emitted().into_iter().map(|(_, p)| p).collect();
        assert_eq!(
            emitted,
            vec!["prepared", "prepared/a", "prepared/b", "prepared/c", "other.txt", "prepared/a"]
        );
    }

    #[test]
    fn test_removed_directories_are_forgotten_after_window() {
        let mut h = Harness::with_tree(&["run-1", "run-2"]);
        h.watch.removed_dirs = RecentPaths::new(Duration::from_millis(20));
        for name in ["run-1", "run-2"] {
            let dir = h.root.join(name);
            fs::remove_dir(&dir).unwrap();
            // Only the parent entry notice arrives.
            h.notify(RawKind::Remove(RemoveKind::Folder), &[&dir]).unwrap();
        }
        assert_eq!(h.watch.removed_dirs.len(), 2);

        std::thread::sleep(Duration::from_millis(50));
        h.watch.expire_recent();
        assert_eq!(h.watch.removed_dirs.len(), 0);

        let kinds: Vec<_> = h.emitted().into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec![EventKind::Deleted, EventKind::Deleted]);
    }

    #[test]
    fn test_deleted_directory_is_unregistered_and_reported_once() {
        let mut h = Harness::with_tree(&["gone/inner"]);
        let dir = h.root.join("gone");
        fs::remove_dir_all(&dir).unwrap();

        // Parent entry notice, then the directory's own watch.
        h.notify(RawKind::Remove(RemoveKind::Folder), &[&dir]).unwrap();
        h.notify(RawKind::Remove(RemoveKind::Any), &[&dir]).unwrap();

        assert_eq!(h.emitted(), vec![(EventKind::Deleted, "gone".to_owned())]);
        assert_eq!(h.watch.removed_dirs.len(), 0);
        let unwatched = h.primitive.unwatched();
        assert!(unwatched.contains(&dir));
        assert!(unwatched.contains(&dir.join("inner")));
    }

    #[test]
    fn test_recreated_directory_is_reported_again() {
        let mut h = Harness::with_tree(&["cycle"]);
        let dir = h.root.join("cycle");

        fs::remove_dir(&dir).unwrap();
        h.notify(RawKind::Remove(RemoveKind::Folder), &[&dir]).unwrap();
        fs::create_dir(&dir).unwrap();
        h.notify(RawKind::Create(CreateKind::Folder), &[&dir]).unwrap();
        fs::remove_dir(&dir).unwrap();
        h.notify(RawKind::Remove(RemoveKind::Folder), &[&dir]).unwrap();

        let kinds: Vec<_> = h.emitted().into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec![EventKind::Deleted, EventKind::Created, EventKind::Deleted]);
    }

    #[test]
    fn test_directory_modify_self_notice_is_folded() {
        let mut h = Harness::with_tree(&["sub"]);
        let dir = h.root.join("sub");
        let attrib = RawKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions));

        h.notify(attrib, &[&dir]).unwrap();
        h.notify(attrib, &[&dir]).unwrap();

        assert_eq!(h.emitted(), vec![(EventKind::Modified, "sub".to_owned())]);
    }

    #[test]
    fn test_change_in_unwatched_directory_is_ignored() {
        let mut h = Harness::new();
        let stray = Utf8PathBuf::from("/definitely/not/watched/file.txt");

        h.notify(RawKind::Create(CreateKind::File), &[&stray]).unwrap();
        assert!(h.emitted().is_empty());
    }

    #[test]
    fn test_root_removal_is_fatal() {
        let mut h = Harness::new();
        let root = h.root.clone();

        h.notify(RawKind::Modify(ModifyKind::Any), &[&root]).unwrap();
        let err = h.notify(RawKind::Remove(RemoveKind::Folder), &[&root]).unwrap_err();

        assert!(matches!(err, WatchError::RootRemoved(ref p) if *p == root));
        assert!(h.emitted().is_empty());
    }

    #[test]
    fn test_consecutive_errors_are_fatal() {
        let mut h = Harness::new();
        let error = notify::Error::generic("backend hiccup");

        for _ in 0..MAX_CONSECUTIVE_ERRORS - 1 {
            h.watch.handle_error(&error).unwrap();
        }
        let err = h.watch.handle_error(&error).unwrap_err();

        assert!(matches!(err, WatchError::TooManyErrors { count, .. } if count == MAX_CONSECUTIVE_ERRORS));
        assert_eq!(h.stats.snapshot().notify_errors, u64::from(MAX_CONSECUTIVE_ERRORS));
    }

    #[test]
    fn test_success_resets_error_count() {
        let h = Harness::new();
        let error = notify::Error::generic("backend hiccup");
        for _ in 0..MAX_CONSECUTIVE_ERRORS - 1 {
            h.raw_tx.send(Err(notify::Error::generic("backend hiccup"))).unwrap();
        }
        h.raw_tx.send(Ok(notify::Event::new(RawKind::Any))).unwrap();
        h.raw_tx.send(Err(error)).unwrap();

        let Harness { watch, trigger, raw_tx, .. } = h;
        let handle = std::thread::spawn(move || watch.run());
        std::thread::sleep(Duration::from_millis(100));
        trigger.trigger();

        assert!(handle.join().unwrap().is_ok());
        drop(raw_tx);
    }

    #[test]
    fn test_run_stops_on_signal_and_unregisters() {
        let h = Harness::with_tree(&["a", "b"]);
        let Harness {
            watch,
            trigger,
            primitive,
            state,
            stats,
            raw_tx,
            ..
        } = h;

        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let watch = watch.with_ready_signal(ready_tx);
        let handle = std::thread::spawn(move || watch.run());
        ready_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(state.get(), LoopState::Running);
        trigger.trigger();

        assert!(handle.join().unwrap().is_ok());
        assert_eq!(state.get(), LoopState::Stopping);
        assert_eq!(primitive.unwatched().len(), 3);
        assert_eq!(stats.snapshot().unregistered, 3);
        drop(raw_tx);
    }

    #[test]
    fn test_run_fails_when_primitive_closes() {
        let h = Harness::new();
        let Harness { watch, raw_tx, trigger, .. } = h;
        drop(raw_tx);

        let result = std::thread::spawn(move || watch.run()).join().unwrap();
        assert!(matches!(result, Err(WatchError::PrimitiveClosed)));
        drop(trigger);
    }

    #[test]
    fn test_no_events_after_shutdown() {
        let mut h = Harness::new();
        let file = h.root.join("late.txt");
        fs::write(&file, "x").unwrap();

        h.trigger.trigger();
        h.notify(RawKind::Create(CreateKind::File), &[&file]).unwrap();

        assert!(h.queue.is_empty());
        assert_eq!(h.stats.snapshot().detected, 0);
    }

    #[test]
    fn test_events_fan_out_to_every_queue() {
        let mut h = Harness::new();
        let signal = h.watch.shutdown.clone();
        let second = EventQueue::new(None, signal, Arc::new(ConsumerStats::new()));
        h.watch.outputs.push(second.clone());

        let file = h.root.join("shared.txt");
        fs::write(&file, "x").unwrap();
        h.notify(RawKind::Create(CreateKind::File), &[&file]).unwrap();

        assert_eq!(h.queue.len(), 1);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn test_state_cell_transitions() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), LoopState::Stopped);
        assert!(cell.transition(LoopState::Stopped, LoopState::Starting));
        assert!(!cell.transition(LoopState::Stopped, LoopState::Running));
        cell.set(LoopState::Running);
        assert_eq!(cell.get().to_string(), "RUNNING");
    }
}
