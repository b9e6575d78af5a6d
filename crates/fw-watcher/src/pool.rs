//! Consumer worker pool.
//!
//! A [`ConsumerPool`] runs a fixed number of worker threads over one
//! [`EventQueue`]. Each worker pops an event, applies the group's filter and
//! hands accepted events to the processor synchronously, so at most
//! `concurrency` events of one group are processed at any time. Each event
//! goes to exactly one worker.
//!
//! On stop, workers finish the event they are processing, then exit. Events
//! still queued at that point are discarded and counted.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::WatchError;
use crate::events::ChangeEvent;
use crate::filter::EventFilter;
use crate::processor::EventProcessor;
use crate::queue::EventQueue;
use crate::shutdown::ShutdownSignal;
use crate::stats::ConsumerStats;

/// Everything a worker needs, shared by the whole pool.
struct Worker {
    queue: EventQueue,
    filter: Arc<dyn EventFilter>,
    processor: Arc<dyn EventProcessor>,
    shutdown: ShutdownSignal,
    poll_interval: Duration,
    stats: Arc<ConsumerStats>,
}

impl Worker {
    fn run(&self, worker_id: usize) {
        tracing::trace!(worker_id, "Consumer worker started");

        while !self.shutdown.is_triggered() {
            let Some(event) = self.queue.pop(self.poll_interval) else {
                continue;
            };

            if !self.filter.accepts(&event) {
                self.stats.increment_filtered();
                tracing::trace!(kind = %event.kind, path = %event.path, "Filtered out event");
                continue;
            }

            self.dispatch(worker_id, &event);
        }

        tracing::trace!(worker_id, "Consumer worker stopped");
    }

    fn dispatch(&self, worker_id: usize, event: &ChangeEvent) {
        match catch_unwind(AssertUnwindSafe(|| self.processor.process(event))) {
            Ok(Ok(())) => {
                self.stats.increment_delivered();
            }
            Ok(Err(error)) => {
                self.stats.increment_failed();
                let chain = format!("{error:#}");
                tracing::warn!(
                    worker_id,
                    kind = %event.kind,
                    path = %event.path,
                    error = %chain,
                    "Event processor failed"
                );
            }
            Err(payload) => {
                self.stats.increment_failed();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_owned());
                tracing::error!(
                    worker_id,
                    kind = %event.kind,
                    path = %event.path,
                    panic = %message,
                    "Event processor panicked"
                );
            }
        }
    }
}

/// Sizing and naming of a [`ConsumerPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    /// Thread name prefix, also used in log fields.
    pub name: String,
    /// Number of worker threads.
    pub concurrency: usize,
    /// How long an idle worker waits on the queue before re-checking the
    /// stop signal.
    pub poll_interval: Duration,
}

impl PoolSettings {
    /// Creates settings for `concurrency` workers named `{name}-{n}`.
    #[must_use]
    pub fn new(name: impl Into<String>, concurrency: usize, poll_interval: Duration) -> Self {
        Self {
            name: name.into(),
            concurrency,
            poll_interval,
        }
    }
}

/// A running set of worker threads for one consumer group.
#[derive(Debug)]
pub struct ConsumerPool {
    name: String,
    queue: EventQueue,
    stats: Arc<ConsumerStats>,
    workers: Vec<JoinHandle<()>>,
}

impl ConsumerPool {
    /// Spawns `settings.concurrency` workers named `{name}-{n}`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Io`] if a thread cannot be spawned. Workers
    /// already running exit once the stop signal fires.
    pub fn start(
        settings: &PoolSettings,
        queue: EventQueue,
        filter: Arc<dyn EventFilter>,
        processor: Arc<dyn EventProcessor>,
        shutdown: ShutdownSignal,
        stats: Arc<ConsumerStats>,
    ) -> Result<Self, WatchError> {
        let name = settings.name.as_str();
        let concurrency = settings.concurrency;
        let worker = Arc::new(Worker {
            queue: queue.clone(),
            filter,
            processor,
            shutdown,
            poll_interval: settings.poll_interval,
            stats: Arc::clone(&stats),
        });

        let mut workers = Vec::with_capacity(concurrency);
        for worker_id in 0..concurrency {
            let worker = Arc::clone(&worker);
            let handle = std::thread::Builder::new()
                .name(format!("{name}-{worker_id}"))
                .spawn(move || worker.run(worker_id))?;
            workers.push(handle);
        }

        tracing::debug!(consumer = name, workers = concurrency, "Consumer pool started");
        Ok(Self {
            name: name.to_owned(),
            queue,
            stats,
            workers,
        })
    }

    /// Returns the pool's name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of worker threads.
    #[inline]
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.workers.len()
    }

    /// Waits for every worker to exit, then discards what is left in the
    /// queue.
    ///
    /// The stop signal must have been triggered first, or this blocks for
    /// as long as the workers keep running.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::ThreadPanicked`] if a worker thread died.
    /// Processor panics are caught inside the worker and do not count.
    pub fn join(self) -> Result<(), WatchError> {
        let mut result = Ok(());
        for handle in self.workers {
            if handle.join().is_err() {
                result = Err(WatchError::ThreadPanicked("consumer"));
            }
        }

        let discarded = self.queue.clear();
        if discarded > 0 {
            self.stats.add_discarded(discarded as u64);
            tracing::info!(
                consumer = %self.name,
                discarded,
                "Discarded queued events on stop"
            );
        }

        tracing::debug!(consumer = %self.name, "Consumer pool stopped");
        result
    }
}
