//! Include-pattern matching for root-relative paths.
//!
//! Patterns use glob wildcards: `*` matches any run of characters within a
//! single path component, `**` matches across components, and `?` matches a
//! single character. Patterns are always relative to the watch root, so a
//! pattern starting with a path separator is rejected when it is compiled.
//!
//! # Examples
//!
//! ```
//! use fw_watcher::PathMatcher;
//!
//! let matcher = PathMatcher::new("**/*.txt").unwrap();
//! assert!(matcher.matches("a/b/c.txt"));
//! assert!(!matcher.matches("a/b/c.log"));
//! assert!(!matcher.matches("/a/b/c.txt"));
//!
//! assert!(PathMatcher::new("/abs/*.txt").is_err());
//! ```

use std::borrow::Cow;

use fw_core::{ConfigError, DEFAULT_INCLUDE_PATTERN};
use globset::{GlobBuilder, GlobMatcher};

/// A compiled include pattern.
///
/// Compilation happens once at setup time; [`matches`](Self::matches) is a
/// pure function and safe to call from every worker concurrently.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    pattern: String,
    glob: GlobMatcher,
}

impl PathMatcher {
    /// Compiles `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] if the pattern is empty,
    /// starts with a path separator, or is not valid glob syntax.
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        if pattern.trim().is_empty() {
            return Err(ConfigError::invalid_pattern(pattern, "pattern is empty"));
        }
        if pattern.starts_with(['/', '\\']) {
            return Err(ConfigError::invalid_pattern(
                pattern,
                "pattern must be relative to the watch root",
            ));
        }

        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| ConfigError::invalid_pattern(pattern, e.to_string()))?
            .compile_matcher();

        Ok(Self {
            pattern: pattern.to_owned(),
            glob,
        })
    }

    /// Returns a matcher that accepts every relative path.
    pub fn match_all() -> Result<Self, ConfigError> {
        Self::new(DEFAULT_INCLUDE_PATTERN)
    }

    /// Returns the source pattern.
    #[inline]
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns `true` if `relative_path` matches the pattern.
    ///
    /// Absolute paths never match.
    #[must_use]
    pub fn matches(&self, relative_path: impl AsRef<str>) -> bool {
        let path = relative_path.as_ref();
        if path.starts_with(['/', '\\']) {
            return false;
        }
        let normalized = normalize_separators(path);
        self.glob.is_match(&*normalized)
    }
}

/// Compiles `pattern` and tests `relative_path` against it in one call.
///
/// Prefer [`PathMatcher`] when matching more than once.
pub fn matches(pattern: &str, relative_path: &str) -> Result<bool, ConfigError> {
    Ok(PathMatcher::new(pattern)?.matches(relative_path))
}

fn normalize_separators(path: &str) -> Cow<'_, str> {
    if std::path::MAIN_SEPARATOR == '/' {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(path.replace(std::path::MAIN_SEPARATOR, "/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_star_crosses_directories() {
        let matcher = PathMatcher::new("**/*.txt").unwrap();
        assert!(matcher.matches("a/b/c.txt"));
        assert!(matcher.matches("c.txt"));
        assert!(!matcher.matches("a/b/c.log"));
    }

    #[test]
    fn test_leading_separator_never_matches() {
        let matcher = PathMatcher::new("**/*.txt").unwrap();
        assert!(!matcher.matches("/a/b/c.txt"));
    }

    #[test]
    fn test_single_star_stays_in_component() {
        let matcher = PathMatcher::new("*.csv").unwrap();
        assert!(matcher.matches("orders.csv"));
        assert!(!matcher.matches("2024/orders.csv"));

        let nested = PathMatcher::new("in/*/data.csv").unwrap();
        assert!(nested.matches("in/eu/data.csv"));
        assert!(!nested.matches("in/eu/west/data.csv"));
    }

    #[test]
    fn test_question_mark_matches_one_character() {
        let matcher = PathMatcher::new("file?.dat").unwrap();
        assert!(matcher.matches("file1.dat"));
        assert!(!matcher.matches("file10.dat"));
        assert!(!matcher.matches("file.dat"));
    }

    #[test]
    fn test_match_all() {
        let matcher = PathMatcher::match_all().unwrap();
        assert_eq!(matcher.pattern(), "**");
        assert!(matcher.matches("a"));
        assert!(matcher.matches("a/b/c.d"));
    }

    #[test]
    fn test_rejects_absolute_pattern() {
        let err = PathMatcher::new("/a/**").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn test_rejects_empty_pattern() {
        assert!(PathMatcher::new("").is_err());
        assert!(PathMatcher::new("   ").is_err());
    }

    #[test]
    fn test_rejects_malformed_pattern() {
        let err = PathMatcher::new("data/[abc").unwrap_err();
        assert!(err.to_string().contains("data/[abc"));
        assert!(PathMatcher::new("{a,b").is_err());
    }

    #[test]
    fn test_free_function() {
        assert!(matches("**/*.txt", "x/y.txt").unwrap());
        assert!(!matches("**/*.txt", "x/y.bin").unwrap());
        assert!(matches("/x", "x").is_err());
    }

    #[test]
    fn test_matcher_is_shareable_across_threads() {
        let matcher = std::sync::Arc::new(PathMatcher::new("**/*.log").unwrap());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let matcher = std::sync::Arc::clone(&matcher);
                std::thread::spawn(move || matcher.matches(format!("dir{i}/app.log")))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
