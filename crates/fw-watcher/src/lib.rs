//! Directory watch pipeline with a bounded hand-off queue and a consumer pool.
//!
//! This crate watches a directory tree through the `notify` crate and
//! delivers every change, once, to application code running on a fixed pool
//! of worker threads.
//!
//! # Overview
//!
//! - One dedicated watch thread drains OS notifications, keeps a
//!   non-recursive watch on every directory of the tree, and registers new
//!   directories before their creation event is emitted
//! - One [`EventQueue`] per consumer group absorbs bursts; a full queue drops
//!   the event instead of stalling the watch thread
//! - One [`ConsumerPool`] per group filters by event kind and include
//!   pattern, then calls the group's [`EventProcessor`]
//! - [`FileWatchEndpoint`] starts and stops all of it
//!
//! # Architecture
//!
//! ```text
//! filesystem change
//!        │
//!        ▼
//! ┌──────────────┐   ┌───────────────────┐
//! │ notify       │──►│ WatchLoop         │──► DirectoryRegistrar
//! │ (per-dir)    │   │ (fw-watch thread) │    (watch key ↔ path)
//! └──────────────┘   └─────────┬─────────┘
//!                              │ push
//!                              ▼
//!                      EventQueue (per group)
//!                              │ pop(poll interval)
//!                              ▼
//!                      ConsumerPool workers ──► ConsumerFilter ──► EventProcessor
//! ```
//!
//! # Crate Dependencies
//!
//! ```text
//! fw-cli ──► fw-watcher ──► fw-core
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use fw_core::{EventKind, EventSet, WatchConfig};
//! use fw_watcher::{ChangeEvent, FileWatchEndpoint};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = WatchConfig::new("/var/spool/inbox")
//!     .with_events(EventSet::empty().with(EventKind::Created))
//!     .with_include_pattern("**/*.xml")
//!     .with_concurrent_consumers(4)
//!     .with_queue_size(1024);
//!
//! let mut endpoint = FileWatchEndpoint::new(config);
//! let orders = endpoint.add_consumer(|event: &ChangeEvent| -> anyhow::Result<()> {
//!     let body = std::fs::read_to_string(&event.path)?;
//!     println!("{} bytes from {}", body.len(), event.path);
//!     Ok(())
//! })?;
//!
//! endpoint.start()?;
//! std::thread::sleep(std::time::Duration::from_secs(60));
//! endpoint.stop()?;
//!
//! println!("dropped: {}", orders.stats().dropped);
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Configuration and startup problems are returned by
//! [`FileWatchEndpoint::start`] before any thread runs. A fault that ends
//! the watch loop later is returned by [`FileWatchEndpoint::stop`]:
//!
//! ```
//! use fw_watcher::WatchError;
//!
//! fn report(err: &WatchError) {
//!     if err.is_runtime_fault() {
//!         eprintln!("watch ended, no more events will arrive: {err}");
//!     } else if err.is_config() {
//!         eprintln!("fix the configuration: {err}");
//!     } else {
//!         eprintln!("could not start: {err}");
//!     }
//! }
//! ```
//!
//! # Platform Notes
//!
//! - Rapid writes are not coalesced: a single save can produce several
//!   `Modified` events.
//! - Entries created inside a new directory before its watch is in place
//!   are picked up by scanning the directory right after registering it.
//!   Backends that report changes with a delay (FSEvents) may still reorder
//!   events around that scan.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod endpoint;
pub mod error;
pub mod events;
pub mod filter;
pub mod matcher;
pub mod pool;
pub mod primitive;
pub mod processor;
pub mod queue;
pub mod registrar;
pub mod shutdown;
pub mod stats;
pub mod watch_loop;

// Re-export error types
pub use error::WatchError;

// Re-export event types
pub use events::ChangeEvent;

// Re-export matching and filtering
pub use filter::{ConsumerFilter, EventFilter};
pub use matcher::PathMatcher;

// Re-export pipeline components
pub use endpoint::{ConsumerHandle, ConsumerOptions, FileWatchEndpoint};
pub use pool::{ConsumerPool, PoolSettings};
pub use primitive::{NotifyPrimitive, RawNotification, WatchPrimitive};
pub use processor::EventProcessor;
pub use queue::EventQueue;
pub use registrar::{DirectoryRegistrar, SubtreeScan, WatchKey, WatchRegistration, ensure_root};
pub use shutdown::{ShutdownSignal, ShutdownTrigger, shutdown_pair};
pub use watch_loop::{LoopState, MAX_CONSECUTIVE_ERRORS, StateCell, WatchLoop};

// Re-export statistics
pub use stats::{ConsumerStats, ConsumerStatsSnapshot, LoopStats, LoopStatsSnapshot};
