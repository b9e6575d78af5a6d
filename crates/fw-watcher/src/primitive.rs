//! The OS-level watch primitive.
//!
//! Directory watching is registered one directory at a time and never
//! recursively: the [`DirectoryRegistrar`](crate::DirectoryRegistrar) decides
//! which directories are watched, so new subdirectories can be picked up in
//! step with the events that announce them.
//!
//! [`NotifyPrimitive`] backs the trait with `notify`'s recommended watcher
//! (inotify, FSEvents, kqueue or ReadDirectoryChangesW). Raw notifications
//! are forwarded unchanged over a crossbeam channel to the watch loop.

use camino::Utf8Path;
use crossbeam_channel::Receiver;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::WatchError;

/// A raw notification as delivered by `notify`.
pub type RawNotification = notify::Result<notify::Event>;

/// Adds and removes single-directory watches.
pub trait WatchPrimitive: Send + 'static {
    /// Starts watching the direct children of `dir`.
    fn watch(&mut self, dir: &Utf8Path) -> Result<(), WatchError>;

    /// Stops watching `dir`.
    fn unwatch(&mut self, dir: &Utf8Path) -> Result<(), WatchError>;
}

/// A [`WatchPrimitive`] backed by `notify`.
pub struct NotifyPrimitive {
    watcher: RecommendedWatcher,
}

impl std::fmt::Debug for NotifyPrimitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyPrimitive").finish_non_exhaustive()
    }
}

impl NotifyPrimitive {
    /// Creates the OS watcher and the channel its notifications arrive on.
    ///
    /// Dropping the primitive releases the OS watch resources and closes the
    /// channel.
    pub fn connect() -> Result<(Self, Receiver<RawNotification>), WatchError> {
        let (raw_tx, raw_rx) = crossbeam_channel::unbounded();
        let watcher = notify::recommended_watcher(move |res: RawNotification| {
            // The loop may already be gone during shutdown.
            let _ = raw_tx.send(res);
        })?;
        Ok((Self { watcher }, raw_rx))
    }
}

impl WatchPrimitive for NotifyPrimitive {
    fn watch(&mut self, dir: &Utf8Path) -> Result<(), WatchError> {
        self.watcher
            .watch(dir.as_std_path(), RecursiveMode::NonRecursive)?;
        Ok(())
    }

    fn unwatch(&mut self, dir: &Utf8Path) -> Result<(), WatchError> {
        self.watcher.unwatch(dir.as_std_path())?;
        Ok(())
    }
}
