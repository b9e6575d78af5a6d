//! Filesystem change kinds.
//!
//! This module provides [`EventKind`], the three change kinds an endpoint
//! reports, and [`EventSet`], the set of kinds a consumer is interested in.
//!
//! Both parse from the names used in connection options (`CREATE`,
//! `MODIFY`, `DELETE`). An [`EventSet`] is written as a comma-separated
//! list, and an empty list selects every kind.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The kind of a filesystem change.
///
/// # Examples
///
/// ```
/// use fw_core::EventKind;
///
/// let kind: EventKind = "modify".parse().unwrap();
/// assert_eq!(kind, EventKind::Modified);
/// assert_eq!(kind.label(), "MODIFY");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    /// A file or directory was created (or renamed into place).
    #[serde(rename = "CREATE", alias = "CREATED")]
    Created,

    /// A file or directory was modified.
    #[serde(rename = "MODIFY", alias = "MODIFIED")]
    Modified,

    /// A file or directory was deleted (or renamed away).
    #[serde(rename = "DELETE", alias = "DELETED")]
    Deleted,
}

impl EventKind {
    /// All kinds, in reporting order.
    pub const ALL: [Self; 3] = [Self::Created, Self::Modified, Self::Deleted];

    /// Returns the option name for this kind.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Created => "CREATE",
            Self::Modified => "MODIFY",
            Self::Deleted => "DELETE",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::Created => 0b001,
            Self::Modified => 0b010,
            Self::Deleted => 0b100,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EventKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CREATE" | "CREATED" => Ok(Self::Created),
            "MODIFY" | "MODIFIED" => Ok(Self::Modified),
            "DELETE" | "DELETED" => Ok(Self::Deleted),
            _ => Err(ConfigError::UnknownEventKind(s.trim().to_owned())),
        }
    }
}

/// A set of [`EventKind`]s.
///
/// Defaults to all kinds. Serialized as a comma-separated list of names.
///
/// # Examples
///
/// ```
/// use fw_core::{EventKind, EventSet};
///
/// let set: EventSet = "CREATE, DELETE".parse().unwrap();
/// assert!(set.contains(EventKind::Created));
/// assert!(!set.contains(EventKind::Modified));
///
/// // An empty list means every kind.
/// let all: EventSet = "".parse().unwrap();
/// assert_eq!(all, EventSet::all());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventSet(u8);

impl EventSet {
    /// Returns a set containing every kind.
    #[inline]
    #[must_use]
    pub const fn all() -> Self {
        Self(0b111)
    }

    /// Returns a set containing no kinds.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Returns a copy of this set with `kind` added.
    #[inline]
    #[must_use]
    pub const fn with(self, kind: EventKind) -> Self {
        Self(self.0 | kind.bit())
    }

    /// Returns `true` if the set contains `kind`.
    #[inline]
    #[must_use]
    pub const fn contains(self, kind: EventKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Returns `true` if the set contains no kinds.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates over the kinds in this set in reporting order.
    pub fn iter(self) -> impl Iterator<Item = EventKind> {
        EventKind::ALL.into_iter().filter(move |kind| self.contains(*kind))
    }
}

impl Default for EventSet {
    fn default() -> Self {
        Self::all()
    }
}

impl FromIterator<EventKind> for EventSet {
    fn from_iter<T: IntoIterator<Item = EventKind>>(iter: T) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

impl FromStr for EventSet {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let set = s
            .split(',')
            .filter(|name| !name.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Self, _>>()?;

        Ok(if set.is_empty() { Self::all() } else { set })
    }
}

impl TryFrom<String> for EventSet {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EventSet> for String {
    fn from(set: EventSet) -> Self {
        set.to_string()
    }
}

impl fmt::Display for EventSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for kind in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            f.write_str(kind.label())?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Debug for EventSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
