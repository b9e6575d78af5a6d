//! Core types, errors, and utilities for the file-watch workspace.
//!
//! This crate provides the foundational types shared by the watcher
//! pipeline and the CLI host:
//!
//! - [`WatchConfig`] - the immutable endpoint configuration
//! - [`EventKind`] and [`EventSet`] - the change kinds an endpoint reports
//! - [`ConfigError`] - configuration parsing and validation failures

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod event;

pub use config::{DEFAULT_INCLUDE_PATTERN, DEFAULT_POLL_INTERVAL_MS, WatchConfig};
pub use error::ConfigError;
pub use event::{EventKind, EventSet};
