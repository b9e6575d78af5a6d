//! Endpoint configuration.
//!
//! This module provides [`WatchConfig`], the immutable option set an
//! endpoint is constructed from. It mirrors the connection options of a
//! file-watch endpoint:
//!
//! | option | default | effect |
//! |---|---|---|
//! | `path` | required | root directory to watch |
//! | `events` | `CREATE,MODIFY,DELETE` | kinds delivered to consumers |
//! | `auto_create` | `true` | create the root if it is missing |
//! | `concurrent_consumers` | `1` | worker pool size |
//! | `include_pattern` | `**` | glob applied to the root-relative path |
//! | `queue_size` | unbounded | hand-off queue capacity |
//!
//! Values are checked by [`WatchConfig::validate`], which the endpoint runs
//! before starting any thread.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::event::EventSet;

/// Include pattern that matches every relative path.
pub const DEFAULT_INCLUDE_PATTERN: &str = "**";

/// Default interval, in milliseconds, at which idle workers re-check the
/// stop signal.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Configuration for a file-watch endpoint.
///
/// # Examples
///
/// ```
/// use fw_core::{EventKind, WatchConfig};
///
/// let config = WatchConfig::new("/var/inbox")
///     .with_events("CREATE".parse().unwrap())
///     .with_include_pattern("**/*.csv")
///     .with_concurrent_consumers(4);
///
/// assert!(config.validate().is_ok());
/// assert!(config.events.contains(EventKind::Created));
/// assert!(config.auto_create);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Root directory to watch.
    pub path: Utf8PathBuf,

    /// Event kinds delivered to consumers.
    pub events: EventSet,

    /// Whether to create the root directory when it does not exist.
    pub auto_create: bool,

    /// Number of worker threads draining the event queue.
    pub concurrent_consumers: usize,

    /// Glob matched against the path relative to the root.
    pub include_pattern: String,

    /// Capacity of the event queue. `None` means unbounded.
    pub queue_size: Option<usize>,

    /// How long an idle worker waits on the queue before re-checking the
    /// stop signal.
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            path: Utf8PathBuf::new(),
            events: EventSet::all(),
            auto_create: true,
            concurrent_consumers: 1,
            include_pattern: DEFAULT_INCLUDE_PATTERN.to_owned(),
            queue_size: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WatchConfig {
    /// Creates a configuration for `path` with default options.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Sets the delivered event kinds.
    #[must_use]
    pub const fn with_events(mut self, events: EventSet) -> Self {
        self.events = events;
        self
    }

    /// Sets whether a missing root directory is created.
    #[must_use]
    pub const fn with_auto_create(mut self, auto_create: bool) -> Self {
        self.auto_create = auto_create;
        self
    }

    /// Sets the number of concurrent consumers.
    #[must_use]
    pub const fn with_concurrent_consumers(mut self, consumers: usize) -> Self {
        self.concurrent_consumers = consumers;
        self
    }

    /// Sets the include pattern.
    #[must_use]
    pub fn with_include_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.include_pattern = pattern.into();
        self
    }

    /// Sets the queue capacity.
    #[must_use]
    pub const fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = Some(queue_size);
        self
    }

    /// Sets the worker poll interval in milliseconds.
    #[must_use]
    pub const fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Parses a configuration from a JSON document.
    ///
    /// Missing fields take their default values.
    ///
    /// # Examples
    ///
    /// ```
    /// use fw_core::WatchConfig;
    ///
    /// let config = WatchConfig::from_json_str(
    ///     r#"{"path": "/data/in", "events": "CREATE,DELETE", "queue_size": 64}"#,
    /// ).unwrap();
    /// assert_eq!(config.queue_size, Some(64));
    /// assert_eq!(config.concurrent_consumers, 1);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_json_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Returns the root directory as given (not yet resolved).
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.path
    }

    /// Checks the option invariants.
    ///
    /// Glob syntax is checked separately when the matcher is compiled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_str().trim().is_empty() {
            return Err(ConfigError::invalid_option("path", "is required"));
        }
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
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid_option(
                "poll_interval_ms",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    #[test]
    fn test_watch_config_defaults() {
        let config = WatchConfig::default();
        assert_eq!(config.events, EventSet::all());
        assert!(config.auto_create);
        assert_eq!(config.concurrent_consumers, 1);
        assert_eq!(config.include_pattern, "**");
        assert_eq!(config.queue_size, None);
        assert_eq!(config.poll_interval_ms, 100);
    }

    #[test]
    fn test_validate_requires_path() {
        let err = WatchConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("path"));
    }

    #[test]
    fn test_validate_rejects_zero_consumers() {
        let config = WatchConfig::new("/tmp/in").with_concurrent_consumers(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("concurrent_consumers"));
    }

    #[test]
    fn test_validate_rejects_zero_queue_size() {
        let config = WatchConfig::new("/tmp/in").with_queue_size(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("queue_size"));
    }

    #[test]
    fn test_validate_rejects_empty_event_set() {
        let config = WatchConfig::new("/tmp/in").with_events(EventSet::empty());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_builder_config() {
        let config = WatchConfig::new("/tmp/in")
            .with_events(EventSet::empty().with(EventKind::Deleted))
            .with_auto_create(false)
            .with_concurrent_consumers(8)
            .with_include_pattern("**/*.xml")
            .with_queue_size(1024)
            .with_poll_interval_ms(25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = WatchConfig::new("/data/in").with_queue_size(16);
        let json = serde_json::to_string(&config).unwrap();
        let parsed = WatchConfig::from_json_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_config_deserialize_with_missing_fields() {
        let config = WatchConfig::from_json_str(r#"{"path": "/data/in", "events": "MODIFY"}"#)
            .unwrap();
        assert_eq!(config.path, "/data/in");
        assert!(config.events.contains(EventKind::Modified));
        assert!(!config.events.contains(EventKind::Created));
        assert!(config.auto_create);
        assert_eq!(config.include_pattern, "**");
    }

    #[test]
    fn test_config_deserialize_rejects_unknown_event() {
        let err = WatchConfig::from_json_str(r#"{"path": "/data/in", "events": "CHMOD"}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_config_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("watch.json");
        std::fs::write(&file, r#"{"path": "/data/in", "concurrent_consumers": 3}"#).unwrap();

        let path = Utf8Path::from_path(&file).unwrap();
        let config = WatchConfig::from_json_file(path).unwrap();
        assert_eq!(config.concurrent_consumers, 3);
    }

    #[test]
    fn test_config_from_missing_file() {
        let err = WatchConfig::from_json_file(Utf8Path::new("/nonexistent/watch.json"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
