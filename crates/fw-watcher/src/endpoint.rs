//! The file watch endpoint: lifecycle of the whole pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────── fw-watch thread ──────────────────────────────┐
//! │  notify (one non-recursive watch per dir) ──► WatchLoop ──► DirectoryRegistrar │
//! └──────────────────────────────────────┬─────────────────────────────────────┘
//!                                        │ push (never blocks, drops when full)
//!                    ┌───────────────────┼───────────────────┐
//!                    ▼                   ▼                   ▼
//!              EventQueue #0       EventQueue #1        EventQueue #n
//!                    │                   │                   │
//!              ConsumerPool #0     ConsumerPool #1      ConsumerPool #n
//!              (N workers each: filter ──► EventProcessor)
//! ```
//!
//! [`FileWatchEndpoint::start`] prepares the root and registers the tree on
//! the calling thread, so configuration and startup errors are returned
//! before any thread exists. [`FileWatchEndpoint::stop`] triggers the shared
//! stop signal, joins the watch thread first so no more events are produced,
//! then joins the workers so in-flight callbacks finish.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use camino::Utf8PathBuf;
use fw_core::{ConfigError, EventSet, WatchConfig};
use parking_lot::Mutex;

use crate::error::WatchError;
use crate::filter::ConsumerFilter;
use crate::matcher::PathMatcher;
use crate::pool::{ConsumerPool, PoolSettings};
use crate::primitive::NotifyPrimitive;
use crate::processor::EventProcessor;
use crate::queue::EventQueue;
use crate::registrar::{DirectoryRegistrar, ensure_root};
use crate::shutdown::{ShutdownTrigger, shutdown_pair};
use crate::stats::{ConsumerStats, ConsumerStatsSnapshot, LoopStats, LoopStatsSnapshot};
use crate::watch_loop::{LoopState, StateCell, WatchLoop};

/// Per-consumer settings.
///
/// [`FileWatchEndpoint::add_consumer`] takes them from the endpoint's
/// [`WatchConfig`]; [`FileWatchEndpoint::add_consumer_with`] accepts
/// different ones per consumer group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerOptions {
    /// Event kinds delivered to the processor.
    pub events: EventSet,
    /// Glob matched against the root-relative path.
    pub include_pattern: String,
    /// Number of worker threads.
    pub concurrent_consumers: usize,
    /// Queue capacity, `None` for unbounded.
    pub queue_size: Option<usize>,
}

impl ConsumerOptions {
    /// Takes the consumer settings from `config`.
    #[must_use]
    pub fn from_config(config: &WatchConfig) -> Self {
        Self {
            events: config.events,
            include_pattern: config.include_pattern.clone(),
            concurrent_consumers: config.concurrent_consumers,
            queue_size: config.queue_size,
        }
    }

    /// Sets the delivered event kinds.
    #[must_use]
    pub const fn with_events(mut self, events: EventSet) -> Self {
        self.events = events;
        self
    }

    /// Sets the include pattern.
    #[must_use]
    pub fn with_include_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.include_pattern = pattern.into();
        self
    }

    /// Sets the number of worker threads.
    #[must_use]
    pub const fn with_concurrent_consumers(mut self, consumers: usize) -> Self {
        self.concurrent_consumers = consumers;
        self
    }

    /// Sets the queue capacity.
    #[must_use]
    pub const fn with_queue_size(mut self, queue_size: Option<usize>) -> Self {
        self.queue_size = queue_size;
        self
    }

    /// Checks the options and compiles the include pattern.
    fn compile(&self) -> Result<PathMatcher, ConfigError> {
        if self.events.is_empty() {
            return Err(ConfigError::invalid_option(
                "events",
                "at least one event kind must be enabled",
            ));
        }
        if self.concurrent_consumers == 0 {
            return Err(ConfigError::invalid_option(
                "concurrent_consumers",
                "must be at least 1",
            ));
        }
        if self.queue_size == Some(0) {
            return Err(ConfigError::invalid_option("queue_size", "must be at least 1"));
        }
        PathMatcher::new(&self.include_pattern)
    }
}

/// Handle to an attached consumer group.
#[derive(Debug, Clone)]
pub struct ConsumerHandle {
    id: usize,
    name: String,
    stats: Arc<ConsumerStats>,
}

impl ConsumerHandle {
    /// Returns the group's index on its endpoint.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    /// Returns the group's name, which prefixes its worker thread names.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the group's counters. They accumulate across restarts.
    #[must_use]
    pub fn stats(&self) -> ConsumerStatsSnapshot {
        self.stats.snapshot()
    }
}

struct ConsumerGroup {
    name: String,
    options: ConsumerOptions,
    processor: Arc<dyn EventProcessor>,
    stats: Arc<ConsumerStats>,
}

/// Threads and signal of one `start()`..`stop()` cycle.
struct Session {
    root: Utf8PathBuf,
    trigger: ShutdownTrigger,
    watch_thread: JoinHandle<Result<(), WatchError>>,
    pools: Vec<ConsumerPool>,
}

/// Watches a directory tree and delivers changes to consumer groups.
///
/// # Ordering
///
/// Events leave each queue in detection order. With more than one worker in
/// a group, two events for the same path may still be processed out of
/// order. Use one worker if the processor needs strict ordering.
///
/// # Examples
///
/// ```no_run
/// use fw_core::WatchConfig;
/// use fw_watcher::{ChangeEvent, FileWatchEndpoint};
///
/// # fn main() -> Result<(), fw_watcher::WatchError> {
/// let config = WatchConfig::new("/data/inbox").with_include_pattern("**/*.csv");
/// let mut endpoint = FileWatchEndpoint::new(config);
/// endpoint.add_consumer(|event: &ChangeEvent| -> anyhow::Result<()> {
///     println!("{} {}", event.kind, event.path);
///     Ok(())
/// })?;
///
/// endpoint.start()?;
/// // ...
/// endpoint.stop()?;
/// # Ok(())
/// # }
/// ```
pub struct FileWatchEndpoint {
    config: WatchConfig,
    consumers: Vec<ConsumerGroup>,
    state: Arc<StateCell>,
    loop_stats: Arc<LoopStats>,
    session: Mutex<Option<Session>>,
}

impl std::fmt::Debug for FileWatchEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatchEndpoint")
            .field("path", &self.config.path)
            .field("consumers", &self.consumers.len())
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

impl FileWatchEndpoint {
    /// Creates a stopped endpoint. The configuration is validated by
    /// [`start`](Self::start).
    #[must_use]
    pub fn new(config: WatchConfig) -> Self {
        Self {
            config,
            consumers: Vec::new(),
            state: Arc::new(StateCell::new()),
            loop_stats: Arc::new(LoopStats::new()),
            session: Mutex::new(None),
        }
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Attaches a consumer group using the endpoint's own settings.
    ///
    /// # Errors
    ///
    /// See [`add_consumer_with`](Self::add_consumer_with).
    pub fn add_consumer(
        &mut self,
        processor: impl EventProcessor,
    ) -> Result<ConsumerHandle, WatchError> {
        let options = ConsumerOptions::from_config(&self.config);
        self.add_consumer_with(options, processor)
    }

    /// Attaches a consumer group with its own filter, concurrency and queue.
    ///
    /// # Errors
    ///
    /// - [`WatchError::AlreadyStarted`] if the endpoint is running
    /// - [`WatchError::Config`] if the options are invalid
    pub fn add_consumer_with(
        &mut self,
        options: ConsumerOptions,
        processor: impl EventProcessor,
    ) -> Result<ConsumerHandle, WatchError> {
        if self.session.get_mut().is_some() {
            return Err(WatchError::AlreadyStarted);
        }
        options.compile()?;

        let id = self.consumers.len();
        let name = format!("fw-consumer-{id}");
        let stats = Arc::new(ConsumerStats::new());
        self.consumers.push(ConsumerGroup {
            name: name.clone(),
            options,
            processor: Arc::new(processor),
            stats: Arc::clone(&stats),
        });

        Ok(ConsumerHandle { id, name, stats })
    }

    /// Always `true`: any number of consumer groups can share one watch.
    #[inline]
    #[must_use]
    pub const fn supports_multiple_consumers(&self) -> bool {
        true
    }

    /// Returns the watch loop's state.
    ///
    /// A loop halted by a fault reports [`LoopState::Stopping`] until
    /// [`stop`](Self::stop) is called; `stop` then returns the fault.
    #[inline]
    #[must_use]
    pub fn state(&self) -> LoopState {
        self.state.get()
    }

    /// Returns `true` while events are being delivered.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.get() == LoopState::Running
    }

    /// Returns the resolved watch root while started.
    #[must_use]
    pub fn root(&self) -> Option<Utf8PathBuf> {
        self.session.lock().as_ref().map(|session| session.root.clone())
    }

    /// Returns the watch loop's counters.
    #[must_use]
    pub fn loop_stats(&self) -> LoopStatsSnapshot {
        self.loop_stats.snapshot()
    }

    /// Starts watching.
    ///
    /// Validates the configuration, prepares the root directory and
    /// registers the tree on the calling thread, starts the watch thread and
    /// waits for it to run, then starts one worker pool per consumer group.
    ///
    /// # Errors
    ///
    /// - [`WatchError::AlreadyStarted`] if already started
    /// - [`WatchError::Config`] or [`WatchError::NoConsumers`] before
    ///   anything is touched on disk
    /// - [`WatchError::DirectoryNotFound`], [`WatchError::NotADirectory`],
    ///   [`WatchError::CreateRoot`] or a primitive error if the root cannot
    ///   be watched; no thread has been started in that case
    pub fn start(&self) -> Result<(), WatchError> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Err(WatchError::AlreadyStarted);
        }

        self.config.validate()?;
        if self.consumers.is_empty() {
            return Err(WatchError::NoConsumers);
        }
        let matchers = self
            .consumers
            .iter()
            .map(|group| group.options.compile())
            .collect::<Result<Vec<_>, _>>()?;

        if !self.state.transition(LoopState::Stopped, LoopState::Starting) {
            return Err(WatchError::AlreadyStarted);
        }
        match self.launch(matchers) {
            Ok(started) => {
                tracing::info!(
                    root = %started.root,
                    consumers = started.pools.len(),
                    "File watch endpoint started"
                );
                *session = Some(started);
                Ok(())
            }
            Err(e) => {
                self.state.set(LoopState::Stopped);
                tracing::error!(path = %self.config.path, error = %e, "Failed to start file watch endpoint");
                Err(e)
            }
        }
    }

    fn launch(&self, matchers: Vec<PathMatcher>) -> Result<Session, WatchError> {
        let root = ensure_root(&self.config.path, self.config.auto_create)?;

        let (primitive, raw_rx) = NotifyPrimitive::connect()?;
        let mut registrar = DirectoryRegistrar::new(primitive, root.clone());
        let registered = registrar.register_tree()?;
        self.loop_stats.add_registered(registered.len() as u64);

        let (trigger, signal) = shutdown_pair();
        let queues: Vec<EventQueue> = self
            .consumers
            .iter()
            .map(|group| {
                EventQueue::new(group.options.queue_size, signal.clone(), Arc::clone(&group.stats))
            })
            .collect();

        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let watch = WatchLoop::new(
            registrar,
            raw_rx,
            queues.clone(),
            signal.clone(),
            Arc::clone(&self.state),
            Arc::clone(&self.loop_stats),
        )
        .with_ready_signal(ready_tx);
        let watch_thread = std::thread::Builder::new()
            .name("fw-watch".to_owned())
            .spawn(move || watch.run())?;

        if ready_rx.recv().is_err() {
            trigger.trigger();
            return Err(match watch_thread.join() {
                Ok(Err(e)) => e,
                _ => WatchError::ThreadPanicked("watch"),
            });
        }

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut pools = Vec::with_capacity(self.consumers.len());
        for ((group, queue), matcher) in self.consumers.iter().zip(queues).zip(matchers) {
            let filter = Arc::new(ConsumerFilter::new(root.clone(), group.options.events, matcher));
            let settings =
                PoolSettings::new(&group.name, group.options.concurrent_consumers, poll_interval);
            let started = ConsumerPool::start(
                &settings,
                queue,
                filter,
                Arc::clone(&group.processor),
                signal.clone(),
                Arc::clone(&group.stats),
            );
            match started {
                Ok(pool) => pools.push(pool),
                Err(e) => {
                    trigger.trigger();
                    let _ = watch_thread.join();
                    for pool in pools {
                        let _ = pool.join();
                    }
                    return Err(e);
                }
            }
        }

        Ok(Session {
            root,
            trigger,
            watch_thread,
            pools,
        })
    }

    /// Stops watching and waits for in-flight callbacks.
    ///
    /// Events still queued are discarded. Calling `stop` on a stopped
    /// endpoint does nothing.
    ///
    /// # Errors
    ///
    /// Returns the fault that ended the watch loop early, if any, or
    /// [`WatchError::ThreadPanicked`] if a pipeline thread died.
    pub fn stop(&self) -> Result<(), WatchError> {
        let mut guard = self.session.lock();
        let Some(session) = guard.take() else {
            return Ok(());
        };

        tracing::info!(root = %session.root, "Stopping file watch endpoint");
        self.state.set(LoopState::Stopping);
        session.trigger.trigger();

        let watched = match session.watch_thread.join() {
            Ok(result) => result,
            Err(_) => Err(WatchError::ThreadPanicked("watch")),
        };

        let mut consumed = Ok(());
        for pool in session.pools {
            if let Err(e) = pool.join() {
                consumed = Err(e);
            }
        }

        self.state.set(LoopState::Stopped);
        tracing::info!(root = %session.root, "File watch endpoint stopped");
        watched.and(consumed)
    }
}

impl Drop for FileWatchEndpoint {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "File watch endpoint stopped with an error");
        }
    }
}
