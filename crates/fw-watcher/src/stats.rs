//! Pipeline counters.
//!
//! [`LoopStats`] is owned by the watch loop; each consumer group owns a
//! [`ConsumerStats`]. Both use [`AtomicU64`] with relaxed ordering: the
//! counters are informational and never used for synchronization.
//!
//! # Examples
//!
//! ```
//! use fw_watcher::ConsumerStats;
//!
//! let stats = ConsumerStats::new();
//! stats.increment_enqueued();
//! stats.increment_dropped();
//!
//! let snapshot = stats.snapshot();
//! assert_eq!(snapshot.enqueued, 1);
//! assert_eq!(snapshot.dropped, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters maintained by the watch loop.
#[derive(Debug, Default)]
pub struct LoopStats {
    /// Change events produced from raw notifications.
    detected: AtomicU64,
    /// Change events synthesized for entries found in new directories.
    synthesized: AtomicU64,
    /// Directories added to the watch primitive.
    registered: AtomicU64,
    /// Directories removed from the watch primitive.
    unregistered: AtomicU64,
    /// Errors reported by the watch primitive.
    notify_errors: AtomicU64,
}

impl LoopStats {
    /// Creates a new [`LoopStats`] with all counters at zero.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the detected events counter.
    #[inline]
    pub fn increment_detected(&self) {
        self.detected.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the synthesized events counter.
    #[inline]
    pub fn increment_synthesized(&self) {
        self.synthesized.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds `count` to the registered directories counter.
    #[inline]
    pub fn add_registered(&self, count: u64) {
        self.registered.fetch_add(count, Ordering::Relaxed);
    }

    /// Adds `count` to the unregistered directories counter.
    #[inline]
    pub fn add_unregistered(&self, count: u64) {
        self.unregistered.fetch_add(count, Ordering::Relaxed);
    }

    /// Increments the notification error counter.
    #[inline]
    pub fn increment_notify_errors(&self) {
        self.notify_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> LoopStatsSnapshot {
        LoopStatsSnapshot {
            detected: self.detected.load(Ordering::Relaxed),
            synthesized: self.synthesized.load(Ordering::Relaxed),
            registered: self.registered.load(Ordering::Relaxed),
            unregistered: self.unregistered.load(Ordering::Relaxed),
            notify_errors: self.notify_errors.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`LoopStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoopStatsSnapshot {
    /// Change events produced from raw notifications.
    pub detected: u64,
    /// Change events synthesized for entries found in new directories.
    pub synthesized: u64,
    /// Directories added to the watch primitive.
    pub registered: u64,
    /// Directories removed from the watch primitive.
    pub unregistered: u64,
    /// Errors reported by the watch primitive.
    pub notify_errors: u64,
}

impl LoopStatsSnapshot {
    /// Returns the number of directories currently watched.
    #[inline]
    #[must_use]
    pub const fn watched_directories(&self) -> u64 {
        self.registered.saturating_sub(self.unregistered)
    }
}

/// Counters maintained by one consumer group (its queue and pool).
#[derive(Debug, Default)]
pub struct ConsumerStats {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    filtered: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

impl ConsumerStats {
    /// Creates a new [`ConsumerStats`] with all counters at zero.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the enqueued counter.
    #[inline]
    pub fn increment_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the dropped (queue full) counter.
    #[inline]
    pub fn increment_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the filtered (kind or pattern mismatch) counter.
    #[inline]
    pub fn increment_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the delivered (processor succeeded) counter.
    #[inline]
    pub fn increment_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the failed (processor error or panic) counter.
    #[inline]
    pub fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds `count` to the discarded-at-shutdown counter.
    #[inline]
    pub fn add_discarded(&self, count: u64) {
        self.discarded.fetch_add(count, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`ConsumerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConsumerStatsSnapshot {
    /// Events accepted by the queue.
    pub enqueued: u64,
    /// Events dropped because the queue was full.
    pub dropped: u64,
    /// Events rejected by the kind or pattern filter.
    pub filtered: u64,
    /// Events the processor handled successfully.
    pub delivered: u64,
    /// Events the processor failed on.
    pub failed: u64,
    /// Events still queued when the pool stopped.
    pub discarded: u64,
}

impl ConsumerStatsSnapshot {
    /// Returns the number of events that reached the processor.
    #[inline]
    #[must_use]
    pub const fn processed(&self) -> u64 {
        self.delivered + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_stats_snapshot() {
        let stats = LoopStats::new();
        stats.increment_detected();
        stats.increment_detected();
        stats.increment_synthesized();
        stats.add_registered(3);
        stats.add_unregistered(1);
        stats.increment_notify_errors();

        let snap = stats.snapshot();
        assert_eq!(snap.detected, 2);
        assert_eq!(snap.synthesized, 1);
        assert_eq!(snap.watched_directories(), 2);
        assert_eq!(snap.notify_errors, 1);
    }

    #[test]
    fn test_consumer_stats_processed() {
        let stats = ConsumerStats::new();
        stats.increment_delivered();
        stats.increment_delivered();
        stats.increment_failed();
        stats.increment_filtered();
        stats.add_discarded(4);

        let snap = stats.snapshot();
        assert_eq!(snap.processed(), 3);
        assert_eq!(snap.filtered, 1);
        assert_eq!(snap.discarded, 4);
    }

    #[test]
    fn test_consumer_stats_concurrent_updates() {
        let stats = std::sync::Arc::new(ConsumerStats::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let stats = std::sync::Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        stats.increment_enqueued();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.snapshot().enqueued, 1000);
    }

    #[test]
    fn test_snapshot_serializes() {
        let snap = ConsumerStatsSnapshot {
            enqueued: 5,
            ..ConsumerStatsSnapshot::default()
        };
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains(r#""enqueued":5"#));
    }
}
