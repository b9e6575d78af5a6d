//! Error types for the fw-watcher crate.
//!
//! This module provides the [`WatchError`] type for errors that can occur
//! while starting, running, or stopping a watch endpoint.

use camino::Utf8PathBuf;
use fw_core::ConfigError;

/// Errors that can occur during file watching operations.
///
/// # Error Recovery Strategy
///
/// - **Configuration** ([`WatchError::Config`], [`WatchError::NotADirectory`]):
///   fail `start()` before any thread is spawned
/// - **Startup** ([`WatchError::DirectoryNotFound`], [`WatchError::CreateRoot`],
///   [`WatchError::Notify`], [`WatchError::Io`]): fail `start()`
/// - **Non-UTF-8 path** ([`WatchError::NonUtf8Path`]): recoverable, the
///   notification is skipped
/// - **Runtime faults** ([`WatchError::PrimitiveClosed`],
///   [`WatchError::RootRemoved`], [`WatchError::TooManyErrors`]): the watch
///   loop terminates and the error is returned from `stop()`
///
/// # Examples
///
/// ```
/// use fw_watcher::WatchError;
///
/// fn handle_error(err: &WatchError) {
///     if err.is_runtime_fault() {
///         eprintln!("watch stopped permanently: {err}");
///     } else if err.is_recoverable() {
///         eprintln!("skipped: {err}");
///     }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The endpoint configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The root directory does not exist and auto-create is disabled.
    #[error("directory does not exist: {0}")]
    DirectoryNotFound(Utf8PathBuf),

    /// The root path exists but is not a directory.
    #[error("path is not a directory: {0}")]
    NotADirectory(Utf8PathBuf),

    /// The root directory could not be created.
    #[error("failed to create directory {path}: {source}")]
    CreateRoot {
        /// The directory that could not be created.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to initialize or operate the notify watcher.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// A path is not valid UTF-8.
    ///
    /// Notifications for such paths are logged and skipped.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `start()` was called on an endpoint that is already running.
    #[error("endpoint is already started")]
    AlreadyStarted,

    /// `start()` was called with no consumer attached.
    #[error("no consumer attached to the endpoint")]
    NoConsumers,

    /// The notification channel from the watch primitive closed.
    #[error("watch primitive stopped delivering notifications")]
    PrimitiveClosed,

    /// The watched root directory itself was removed.
    #[error("watched root directory was removed: {0}")]
    RootRemoved(Utf8PathBuf),

    /// The watch primitive reported errors back to back without recovering.
    #[error("watch primitive failed {count} times in a row, last error: {last}")]
    TooManyErrors {
        /// Number of consecutive failures.
        count: u32,
        /// Display form of the last failure.
        last: String,
    },

    /// A pipeline thread panicked.
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

impl WatchError {
    /// Creates a new [`WatchError::DirectoryNotFound`] error.
    #[inline]
    pub fn directory_not_found(path: impl Into<Utf8PathBuf>) -> Self {
        Self::DirectoryNotFound(path.into())
    }

    /// Creates a new [`WatchError::NotADirectory`] error.
    #[inline]
    pub fn not_a_directory(path: impl Into<Utf8PathBuf>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Creates a new [`WatchError::NonUtf8Path`] error.
    #[inline]
    pub fn non_utf8_path(path: impl Into<std::path::PathBuf>) -> Self {
        Self::NonUtf8Path(path.into())
    }

    /// Returns `true` if this error is recoverable (watching can continue).
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::NonUtf8Path(_))
    }

    /// Returns `true` if this error is fatal (watching should stop).
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Returns `true` if this is a configuration error.
    #[inline]
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::NotADirectory(_))
    }

    /// Returns `true` if this error ended a running watch loop.
    #[inline]
    #[must_use]
    pub const fn is_runtime_fault(&self) -> bool {
        matches!(
            self,
            Self::PrimitiveClosed | Self::RootRemoved(_) | Self::TooManyErrors { .. }
        )
    }

    /// Returns the file path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::DirectoryNotFound(path)
            | Self::NotADirectory(path)
            | Self::RootRemoved(path)
            | Self::CreateRoot { path, .. } => Some(path),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;

    #[test]
    fn test_watch_error_directory_not_found() {
        let err = WatchError::directory_not_found("/data/inbox");
        assert!(err.is_fatal());
        assert!(!err.is_config());
        assert_eq!(err.path().map(|p| p.as_str()), Some("/data/inbox"));
        insta::assert_snapshot!(err.to_string(), @"directory does not exist: /data/inbox");
    }

    #[test]
    fn test_watch_error_not_a_directory_is_config() {
        let err = WatchError::not_a_directory("/data/file.txt");
        assert!(err.is_config());
        assert!(err.to_string().contains("/data/file.txt"));
    }

    #[test]
    fn test_watch_error_config_is_transparent() {
        let err = WatchError::from(ConfigError::invalid_option("queue_size", "must be at least 1"));
        assert!(err.is_config());
        assert_eq!(
            err.to_string(),
            "invalid configuration option 'queue_size': must be at least 1"
        );
    }

    #[test]
    fn test_watch_error_non_utf8() {
        let err = WatchError::non_utf8_path(PathBuf::from("test"));
        assert!(err.is_recoverable());
        assert!(!err.is_fatal());
        assert!(err.path().is_none());
    }

    #[test]
    fn test_watch_error_runtime_faults() {
        assert!(WatchError::PrimitiveClosed.is_runtime_fault());
        assert!(WatchError::RootRemoved(Utf8PathBuf::from("/r")).is_runtime_fault());
        let err = WatchError::TooManyErrors {
            count: 16,
            last: "queue overflow".to_owned(),
        };
        assert!(err.is_runtime_fault());
        assert!(err.to_string().contains("16 times"));
        assert!(!WatchError::AlreadyStarted.is_runtime_fault());
    }

    #[test]
    fn test_watch_error_create_root() {
        let err = WatchError::CreateRoot {
            path: Utf8PathBuf::from("/root/denied"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "access denied"),
        };
        assert!(err.is_fatal());
        assert_eq!(err.path().map(|p| p.as_str()), Some("/root/denied"));
        assert!(err.to_string().contains("access denied"));
    }
}
