//! Per-consumer event filtering.
//!
//! Every consumer group sees every change the watch loop detects; the group's
//! filter decides which of them reach its processor. Filtering runs on the
//! worker threads, after the event has left the queue.
//!
//! # Examples
//!
//! ```
//! use camino::Utf8PathBuf;
//! use fw_core::{EventKind, EventSet};
//! use fw_watcher::{ChangeEvent, ConsumerFilter, EventFilter, PathMatcher};
//!
//! let filter = ConsumerFilter::new(
//!     Utf8PathBuf::from("/inbox"),
//!     EventSet::empty().with(EventKind::Created),
//!     PathMatcher::new("**/*.csv").unwrap(),
//! );
//!
//! let csv = ChangeEvent::new(EventKind::Created, Utf8PathBuf::from("/inbox/eu/a.csv"));
//! let log = ChangeEvent::new(EventKind::Created, Utf8PathBuf::from("/inbox/eu/a.log"));
//! let gone = ChangeEvent::new(EventKind::Deleted, Utf8PathBuf::from("/inbox/eu/a.csv"));
//!
//! assert!(filter.accepts(&csv));
//! assert!(!filter.accepts(&log));
//! assert!(!filter.accepts(&gone));
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use fw_core::EventSet;

use crate::events::ChangeEvent;
use crate::matcher::PathMatcher;

/// Decides whether an event reaches a consumer's processor.
///
/// Filters are shared by all workers of a pool, so they must be [`Send`] and
/// [`Sync`].
pub trait EventFilter: Send + Sync + 'static {
    /// Returns `true` if `event` should be processed.
    fn accepts(&self, event: &ChangeEvent) -> bool;
}

/// Filters by event kind and by include pattern on the root-relative path.
#[derive(Debug, Clone)]
pub struct ConsumerFilter {
    root: Utf8PathBuf,
    events: EventSet,
    matcher: PathMatcher,
}

impl ConsumerFilter {
    /// Creates a filter for events under `root`.
    #[must_use]
    pub fn new(root: Utf8PathBuf, events: EventSet, matcher: PathMatcher) -> Self {
        Self {
            root,
            events,
            matcher,
        }
    }

    /// Returns the watch root paths are made relative to.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the accepted event kinds.
    #[inline]
    #[must_use]
    pub const fn events(&self) -> EventSet {
        self.events
    }

    /// Returns the include pattern.
    #[inline]
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.matcher.pattern()
    }
}

impl EventFilter for ConsumerFilter {
    fn accepts(&self, event: &ChangeEvent) -> bool {
        if !self.events.contains(event.kind) {
            return false;
        }
        event
            .relative_to(&self.root)
            .is_some_and(|relative| self.matcher.matches(relative.as_str()))
    }
}

impl<F: EventFilter + ?Sized> EventFilter for std::sync::Arc<F> {
    fn accepts(&self, event: &ChangeEvent) -> bool {
        (**self).accepts(event)
    }
}

impl<F: EventFilter + ?Sized> EventFilter for Box<F> {
    fn accepts(&self, event: &ChangeEvent) -> bool {
        (**self).accepts(event)
    }
}
