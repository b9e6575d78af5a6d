//! Directory watch registration.
//!
//! The [`DirectoryRegistrar`] owns the [`WatchPrimitive`] and the mapping
//! between watch keys and the directories they cover. It is owned by the
//! watch thread once the endpoint is running, which makes it the single
//! writer of that mapping.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use ignore::WalkBuilder;
use rustc_hash::FxHashMap;

use crate::error::WatchError;
use crate::primitive::WatchPrimitive;

/// Opaque handle for one registered directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchKey(u64);

impl WatchKey {
    /// Returns the raw key value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A directory newly added to the watch primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRegistration {
    /// Key assigned to the directory.
    pub key: WatchKey,
    /// Absolute path of the directory.
    pub path: Utf8PathBuf,
}

/// Result of registering a directory and everything below it.
#[derive(Debug, Default)]
pub struct SubtreeScan {
    /// Directories that were not registered before the scan.
    pub registered: Vec<WatchRegistration>,
    /// Every file and directory found below the scanned directory, parents
    /// before children. The scanned directory itself is not included.
    pub entries: Vec<Utf8PathBuf>,
}

/// Makes sure `path` exists as a directory and returns its canonical
/// form.
///
/// With `auto_create`, a missing directory is created together with any
/// missing parents.
///
/// # Errors
///
/// - [`WatchError::DirectoryNotFound`] if the path is missing and
///   `auto_create` is false
/// - [`WatchError::CreateRoot`] if creating it fails
/// - [`WatchError::NotADirectory`] if the path names something else
pub fn ensure_root(path: &Utf8Path, auto_create: bool) -> Result<Utf8PathBuf, WatchError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(WatchError::not_a_directory(path)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if !auto_create {
                return Err(WatchError::directory_not_found(path));
            }
            std::fs::create_dir_all(path).map_err(|source| WatchError::CreateRoot {
                path: path.to_owned(),
                source,
            })?;
            tracing::info!(path = %path, "Created missing watch root");
        }
        Err(e) => return Err(WatchError::Io(e)),
    }

    Ok(path.canonicalize_utf8()?)
}

/// Maintains one non-recursive watch per directory under the root.
pub struct DirectoryRegistrar<P> {
    primitive: P,
    root: Utf8PathBuf,
    next_key: u64,
    paths: FxHashMap<WatchKey, Utf8PathBuf>,
    keys: FxHashMap<Utf8PathBuf, WatchKey>,
}

impl<P> fmt::Debug for DirectoryRegistrar<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryRegistrar")
            .field("root", &self.root)
            .field("registered", &self.paths.len())
            .finish_non_exhaustive()
    }
}

impl<P: WatchPrimitive> DirectoryRegistrar<P> {
    /// Creates a registrar for `root` with nothing registered yet.
    pub fn new(primitive: P, root: Utf8PathBuf) -> Self {
        Self {
            primitive,
            root,
            next_key: 0,
            paths: FxHashMap::default(),
            keys: FxHashMap::default(),
        }
    }

    /// Returns the watch root.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Registers the root and every directory below it.
    ///
    /// Subdirectories that cannot be read or watched are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the root itself cannot be watched.
    pub fn register_tree(&mut self) -> Result<Vec<WatchRegistration>, WatchError> {
        let root = self.root.clone();
        let mut registered: Vec<_> = self.register_one(&root)?.into_iter().collect();
        registered.extend(self.register_subtree(&root).registered);

        tracing::debug!(
            root = %root,
            directories = registered.len(),
            "Registered directory tree"
        );
        Ok(registered)
    }

    /// Registers `dir` and every directory below it, and lists what it
    /// contains.
    ///
    /// Directories already registered are left alone. Failures are logged
    /// and skipped.
    pub fn register_subtree(&mut self, dir: &Utf8Path) -> SubtreeScan {
        let mut scan = SubtreeScan::default();

        let walker = WalkBuilder::new(dir)
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(dir = %dir, error = %e, "Skipping unreadable entry while registering");
                    continue;
                }
            };

            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            let depth = entry.depth();
            let path = match Utf8PathBuf::from_path_buf(entry.into_path()) {
                Ok(p) => p,
                Err(path) => {
                    tracing::warn!(path = %path.display(), "Skipping non-UTF-8 path");
                    continue;
                }
            };

            if is_dir {
                match self.register_one(&path) {
                    Ok(Some(registration)) => scan.registered.push(registration),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(path = %path, error = %e, "Failed to watch directory");
                    }
                }
            }
            if depth > 0 {
                scan.entries.push(path);
            }
        }

        scan
    }

    /// Registers a single directory.
    ///
    /// Returns `None` if it was already registered.
    ///
    /// # Errors
    ///
    /// Returns the primitive's error if the watch cannot be added.
    pub fn register_one(&mut self, dir: &Utf8Path) -> Result<Option<WatchRegistration>, WatchError> {
        if self.keys.contains_key(dir) {
            return Ok(None);
        }

        self.primitive.watch(dir)?;

        let key = WatchKey(self.next_key);
        self.next_key += 1;
        self.paths.insert(key, dir.to_owned());
        self.keys.insert(dir.to_owned(), key);

        tracing::trace!(key = %key, dir = %dir, "Registered directory");
        Ok(Some(WatchRegistration {
            key,
            path: dir.to_owned(),
        }))
    }

    /// Returns the directory registered under `key`.
    #[inline]
    #[must_use]
    pub fn resolve(&self, key: WatchKey) -> Option<&Utf8Path> {
        self.paths.get(&key).map(Utf8PathBuf::as_path)
    }

    /// Returns the key `dir` is registered under.
    #[inline]
    #[must_use]
    pub fn key_for(&self, dir: &Utf8Path) -> Option<WatchKey> {
        self.keys.get(dir).copied()
    }

    /// Returns `true` if `dir` is registered.
    #[inline]
    #[must_use]
    pub fn is_registered(&self, dir: &Utf8Path) -> bool {
        self.keys.contains_key(dir)
    }

    /// Returns the number of registered directories.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Unregisters `dir` and every registered directory below it.
    ///
    /// The primitive usually drops watches on deleted directories by itself,
    /// so failures to remove a watch are only logged at debug level.
    pub fn unregister(&mut self, dir: &Utf8Path) -> Vec<WatchRegistration> {
        let mut doomed: Vec<WatchRegistration> = self
            .keys
            .iter()
            .filter(|(path, _)| path.starts_with(dir))
            .map(|(path, key)| WatchRegistration {
                key: *key,
                path: path.clone(),
            })
            .collect();
        doomed.sort_by(|a, b| b.path.cmp(&a.path));

        for registration in &doomed {
            self.keys.remove(&registration.path);
            self.paths.remove(&registration.key);
            if let Err(e) = self.primitive.unwatch(&registration.path) {
                tracing::debug!(
                    dir = %registration.path,
                    error = %e,
                    "Watch already gone"
                );
            }
        }

        doomed
    }

    /// Unregisters every directory, returning how many were removed.
    pub fn unregister_all(&mut self) -> usize {
        let root = self.root.clone();
        let mut removed = self.unregister(&root).len();

        // Directories outside the root only exist if registered by hand.
        let leftovers: Vec<Utf8PathBuf> = self.keys.keys().cloned().collect();
        for dir in leftovers {
            removed += self.unregister(&dir).len();
        }
        removed
    }
}
