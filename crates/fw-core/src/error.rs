//! Error types for the fw-core crate.
//!
//! This module provides the [`ConfigError`] type for configuration failures
//! detected while loading or validating a [`WatchConfig`](crate::WatchConfig).
//! Every variant is raised before any watch thread is spawned.

use camino::Utf8PathBuf;

/// Errors that can occur during configuration loading and validation.
///
/// # Examples
///
/// ```
/// use fw_core::ConfigError;
///
/// let error = ConfigError::invalid_option("concurrent_consumers", "must be at least 1");
/// assert!(error.to_string().contains("concurrent_consumers"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration option has an invalid value.
    #[error("invalid configuration option '{option}': {reason}")]
    InvalidOption {
        /// The name of the invalid option.
        option: String,
        /// Explanation of why the option is invalid.
        reason: String,
    },

    /// An event kind name could not be parsed.
    #[error("unknown event kind '{0}' (expected CREATE, MODIFY or DELETE)")]
    UnknownEventKind(String),

    /// The include pattern is not a valid relative glob.
    #[error("invalid include pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The rejected pattern.
        pattern: String,
        /// Explanation of why the pattern was rejected.
        reason: String,
    },

    /// The configuration file could not be read.
    #[error("failed to read configuration {path}: {source}")]
    Read {
        /// The configuration file path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the configuration document.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates a new [`ConfigError::InvalidOption`] error.
    #[inline]
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new [`ConfigError::InvalidPattern`] error.
    #[inline]
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_option_display() {
        let error = ConfigError::invalid_option("queue_size", "must be at least 1");
        let msg = error.to_string();
        assert!(msg.contains("queue_size"));
        assert!(msg.contains("must be at least 1"));
    }

    #[test]
    fn test_unknown_event_kind_display() {
        let error = ConfigError::UnknownEventKind("RENAME".to_owned());
        insta::assert_snapshot!(
            error.to_string(),
            @"unknown event kind 'RENAME' (expected CREATE, MODIFY or DELETE)"
        );
    }

    #[test]
    fn test_invalid_pattern_display() {
        let error = ConfigError::invalid_pattern("/abs/*.txt", "pattern must be relative");
        insta::assert_snapshot!(
            error.to_string(),
            @"invalid include pattern '/abs/*.txt': pattern must be relative"
        );
    }

    #[test]
    fn test_read_error_display() {
        let error = ConfigError::Read {
            path: Utf8PathBuf::from("/etc/watch.json"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(error.to_string().contains("/etc/watch.json"));
    }
}
