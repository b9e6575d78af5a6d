//! Bounded hand-off queue between the watch thread and the workers.
//!
//! The queue never blocks its producer: when it is full, [`EventQueue::push`]
//! drops the event, logs a warning, and counts it, so the watch thread keeps
//! draining the OS notification buffer. Consumers block in
//! [`EventQueue::pop`] for at most the given timeout, and return early when
//! the stop signal fires.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::events::ChangeEvent;
use crate::shutdown::ShutdownSignal;
use crate::stats::ConsumerStats;

/// A FIFO channel of [`ChangeEvent`]s with a fixed capacity.
///
/// Cloning yields another handle to the same queue.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use camino::Utf8PathBuf;
/// use fw_core::EventKind;
/// use fw_watcher::{ChangeEvent, ConsumerStats, EventQueue, shutdown_pair};
///
/// let (_trigger, signal) = shutdown_pair();
/// let queue = EventQueue::new(Some(1), signal, Arc::new(ConsumerStats::new()));
///
/// assert!(queue.push(ChangeEvent::new(EventKind::Created, Utf8PathBuf::from("/in/a"))));
/// assert!(!queue.push(ChangeEvent::new(EventKind::Created, Utf8PathBuf::from("/in/b"))));
///
/// let event = queue.pop(Duration::from_millis(10)).unwrap();
/// assert_eq!(event.path.as_str(), "/in/a");
/// ```
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: Sender<ChangeEvent>,
    rx: Receiver<ChangeEvent>,
    capacity: Option<usize>,
    shutdown: ShutdownSignal,
    stats: Arc<ConsumerStats>,
}

impl EventQueue {
    /// Creates a queue holding at most `capacity` events, or an unbounded
    /// queue when `capacity` is `None`.
    #[must_use]
    pub fn new(capacity: Option<usize>, shutdown: ShutdownSignal, stats: Arc<ConsumerStats>) -> Self {
        let (tx, rx) = match capacity {
            Some(capacity) => crossbeam_channel::bounded(capacity),
            None => crossbeam_channel::unbounded(),
        };
        Self {
            tx,
            rx,
            capacity,
            shutdown,
            stats,
        }
    }

    /// Appends `event` without blocking.
    ///
    /// Returns `false` and drops the event if the queue is full.
    pub fn push(&self, event: ChangeEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.stats.increment_enqueued();
                true
            }
            Err(TrySendError::Full(event)) => {
                self.stats.increment_dropped();
                tracing::warn!(
                    kind = %event.kind,
                    path = %event.path,
                    capacity = ?self.capacity,
                    "Event queue full, dropping event"
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Removes the oldest event, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout or once the stop signal has fired.
    pub fn pop(&self, timeout: Duration) -> Option<ChangeEvent> {
        if self.shutdown.is_triggered() {
            return None;
        }
        crossbeam_channel::select! {
            recv(self.rx) -> event => event.ok(),
            recv(self.shutdown.receiver()) -> _ => None,
            default(timeout) => None,
        }
    }

    /// Discards every queued event and returns how many were removed.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }

    /// Returns the number of queued events.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns `true` if no events are queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Returns the capacity, or `None` if unbounded.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}
