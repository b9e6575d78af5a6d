//! Change events carried from the watch thread to consumers.
//!
//! # Event Flow
//!
//! ```text
//! File System Change
//!        │
//!        ▼
//!   notify (one non-recursive watch per directory)
//!        │
//!        ▼
//!   WatchLoop translates ──► ChangeEvent created
//!        │
//!        ▼
//!   EventQueue (one per consumer group)
//!        │
//!        ▼
//!   ConsumerPool worker ──► EventProcessor
//! ```

use std::time::SystemTime;

use camino::{Utf8Path, Utf8PathBuf};
use fw_core::EventKind;

/// A single filesystem change, as detected by the watch loop.
///
/// Each event is delivered to exactly one worker of each consumer group.
///
/// # Examples
///
/// ```
/// use fw_watcher::ChangeEvent;
/// use fw_core::EventKind;
/// use camino::{Utf8Path, Utf8PathBuf};
///
/// let event = ChangeEvent::new(EventKind::Created, Utf8PathBuf::from("/inbox/orders/a.csv"));
/// assert_eq!(event.file_name(), Some("a.csv"));
/// assert_eq!(
///     event.relative_to(Utf8Path::new("/inbox")).map(Utf8Path::as_str),
///     Some("orders/a.csv")
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// What happened to the entry.
    pub kind: EventKind,

    /// Absolute path of the affected file or directory.
    pub path: Utf8PathBuf,

    /// Wall-clock time the watch loop detected the change.
    pub detected_at: SystemTime,
}

impl ChangeEvent {
    /// Creates a new event detected now.
    #[inline]
    #[must_use]
    pub fn new(kind: EventKind, path: Utf8PathBuf) -> Self {
        Self {
            kind,
            path,
            detected_at: SystemTime::now(),
        }
    }

    /// Creates a new event with a specific detection time.
    ///
    /// Useful for testing or when reconstructing events.
    #[inline]
    #[must_use]
    pub const fn with_timestamp(kind: EventKind, path: Utf8PathBuf, detected_at: SystemTime) -> Self {
        Self {
            kind,
            path,
            detected_at,
        }
    }

    /// Returns the path relative to `root`, or `None` if the event lies
    /// outside it.
    #[inline]
    #[must_use]
    pub fn relative_to(&self, root: &Utf8Path) -> Option<&Utf8Path> {
        self.path.strip_prefix(root).ok()
    }

    /// Returns the file name without the directory path.
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name()
    }

    /// Returns the file extension, if any.
    #[inline]
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        self.path.extension()
    }
}
