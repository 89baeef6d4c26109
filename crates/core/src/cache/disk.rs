//! Filesystem-backed cache store.
//!
//! Entries live as `<sha256(key)>.entry` files directly inside the cache
//! directory. The aggregate size of those files is tracked in memory behind a
//! mutex that also serializes every file mutation, so concurrent callers
//! sharing one `DiskCache` never lose size updates.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::entry::CacheEntry;
use super::hash::{ENTRY_EXTENSION, cache_file_name};
use super::{CacheStore, Error};
use crate::config::AppConfig;

/// Free and total bytes of the filesystem holding the cache directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskSpace {
    pub available: u64,
    pub total: u64,
}

type SpaceQuery = fn(&Path) -> io::Result<DiskSpace>;

fn filesystem_space(dir: &Path) -> io::Result<DiskSpace> {
    Ok(DiskSpace { available: fs2::available_space(dir)?, total: fs2::total_space(dir)? })
}

/// Share of the filesystem that must stay free after a write.
const FREE_SPACE_MARGIN_PERCENT: u64 = 5;

/// Cache store keeping one JSON file per entry under a size budget.
#[derive(Debug)]
pub struct DiskCache {
    dir: PathBuf,
    capacity: u64,
    current_size: Mutex<u64>,
    space: SpaceQuery,
}

impl DiskCache {
    /// Open a cache rooted at `dir` with a budget of `capacity` bytes.
    ///
    /// Sums the sizes of existing entry files into the current size. Files
    /// that disappear or cannot be inspected during the scan are skipped.
    pub fn open(dir: impl AsRef<Path>, capacity: u64) -> Result<Self, Error> {
        Self::open_with_space_query(dir.as_ref(), capacity, filesystem_space)
    }

    /// Open the cache described by `cache_dir` and `cache_capacity_bytes`.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let dir = config.cache_dir.as_ref().ok_or_else(|| crate::config::ConfigError::Missing {
            field: "cache_dir".into(),
            hint: "Set SETTEE_CACHE_DIR environment variable".into(),
        })?;
        Self::open(dir, config.cache_capacity_bytes)
    }

    fn open_with_space_query(dir: &Path, capacity: u64, space: SpaceQuery) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::Configuration("cache capacity must be greater than 0".into()));
        }

        let meta = fs::metadata(dir)
            .map_err(|e| Error::InvalidCacheLocation(format!("{}: {}", dir.display(), e)))?;
        if !meta.is_dir() {
            return Err(Error::InvalidCacheLocation(format!("{} is not a directory", dir.display())));
        }
        tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| Error::InvalidCacheLocation(format!("{} is not writable: {}", dir.display(), e)))?;
        let listing = fs::read_dir(dir)
            .map_err(|e| Error::InvalidCacheLocation(format!("{} is not readable: {}", dir.display(), e)))?;

        let mut current = 0u64;
        let mut files = 0usize;
        for entry in listing {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            if !is_entry_file(&path) {
                continue;
            }
            match fs::symlink_metadata(&path) {
                Ok(m) if m.is_file() => {
                    current += m.len();
                    files += 1;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping cache file during scan"),
            }
        }

        tracing::debug!(dir = %dir.display(), files, current_size = current, capacity, "opened disk cache");

        Ok(Self { dir: dir.to_path_buf(), capacity, current_size: Mutex::new(current), space })
    }

    /// Bytes currently accounted to cache entries.
    pub fn current_size(&self) -> u64 {
        *self.lock()
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Path of the file that holds (or would hold) the entry for `key`.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(cache_file_name(key))
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        self.current_size.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>, Error> {
        let listing = fs::read_dir(&self.dir).map_err(|e| io_error("read cache directory", &self.dir, e))?;
        let mut paths = Vec::new();
        for entry in listing {
            let entry = entry.map_err(|e| io_error("read cache directory", &self.dir, e))?;
            let path = entry.path();
            if is_entry_file(&path) {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    fn check_free_space(&self, growth: u64) -> Result<(), Error> {
        let space = (self.space)(&self.dir).map_err(|e| io_error("query free space", &self.dir, e))?;
        let margin = space.total / 100 * FREE_SPACE_MARGIN_PERCENT;
        if space.available.saturating_sub(growth) < margin {
            return Err(Error::InsufficientDiskSpace { needed: growth, available: space.available });
        }
        Ok(())
    }
}

impl CacheStore for DiskCache {
    fn set(&self, key: &str, value: &Value, expires_at: Option<DateTime<Utc>>) -> Result<bool, Error> {
        if key.is_empty() {
            return Err(Error::InvalidCacheArgs("key must not be empty".into()));
        }
        if let Some(at) = expires_at
            && at <= Utc::now()
        {
            return Err(Error::InvalidCacheArgs(format!("expiration {} is not in the future", at.to_rfc3339())));
        }

        let encoded = serde_json::to_vec(&CacheEntry::new(value.clone(), expires_at))?;
        let new_size = encoded.len() as u64;
        let path = self.entry_path(key);

        let mut current = self.lock();

        let old_size = match fs::symlink_metadata(&path) {
            Ok(m) if m.file_type().is_symlink() => {
                return Err(Error::CacheIo(format!("refusing to write through symlink {}", path.display())));
            }
            Ok(m) if m.is_file() => m.len(),
            Ok(_) => return Err(Error::CacheIo(format!("{} is not a regular file", path.display()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(io_error("inspect cache file", &path, e)),
        };

        self.check_free_space(new_size.saturating_sub(old_size))?;

        let projected = current.saturating_sub(old_size) + new_size;
        if projected > self.capacity {
            tracing::warn!(
                key,
                current_size = *current,
                entry_size = new_size,
                capacity = self.capacity,
                "cache write rejected: capacity exceeded"
            );
            return Ok(false);
        }

        write_atomic(&path, &encoded).map_err(|e| io_error("write cache file", &path, e))?;
        let written = fs::metadata(&path).map(|m| m.len()).unwrap_or(new_size);

        *current = current.saturating_sub(old_size) + written;
        tracing::debug!(key, size = written, current_size = *current, "cache write");

        Ok(true)
    }

    fn get(&self, key: &str) -> Result<Option<Value>, Error> {
        if key.is_empty() {
            return Err(Error::InvalidCacheArgs("key must not be empty".into()));
        }
        let path = self.entry_path(key);
        let _guard = self.lock();

        let contents = match fs::read(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(key, "cache miss");
                return Ok(None);
            }
            Err(e) => return Err(io_error("read cache file", &path, e)),
        };

        let entry: CacheEntry = serde_json::from_slice(&contents)
            .map_err(|e| Error::CacheIo(format!("corrupt cache file {}: {}", path.display(), e)))?;

        if entry.is_expired() {
            tracing::debug!(key, "cache miss (expired)");
            return Ok(None);
        }

        tracing::debug!(key, "cache hit");
        Ok(Some(entry.value))
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        if key.is_empty() {
            return Err(Error::InvalidCacheArgs("key must not be empty".into()));
        }
        let path = self.entry_path(key);
        let mut current = self.lock();

        let size = match fs::symlink_metadata(&path) {
            Ok(m) if m.is_file() => m.len(),
            Ok(_) => 0,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_error("inspect cache file", &path, e)),
        };

        fs::remove_file(&path).map_err(|e| io_error("remove cache file", &path, e))?;
        *current = current.saturating_sub(size);
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        let mut current = self.lock();

        for path in self.entry_files()? {
            let size = fs::symlink_metadata(&path).map(|m| if m.is_file() { m.len() } else { 0 }).unwrap_or(0);
            match fs::remove_file(&path) {
                Ok(()) => *current = current.saturating_sub(size),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_error("remove cache file", &path, e)),
            }
        }

        *current = 0;
        tracing::debug!(dir = %self.dir.display(), "cache cleared");
        Ok(())
    }

    fn prune(&self) -> Result<u64, Error> {
        let mut current = self.lock();
        let now = Utc::now();
        let mut removed = 0u64;

        for path in self.entry_files()? {
            let meta = match fs::symlink_metadata(&path) {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let parsed = fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|c| serde_json::from_slice::<CacheEntry>(&c).map_err(|e| e.to_string()));
            let entry = match parsed {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable cache file during prune");
                    continue;
                }
            };
            if !entry.is_expired_at(now) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    *current = current.saturating_sub(meta.len());
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_error("remove cache file", &path, e)),
            }
        }

        tracing::debug!(removed, current_size = *current, "cache pruned");
        Ok(removed)
    }
}

fn is_entry_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION)
}

fn io_error(action: &str, path: &Path, err: io::Error) -> Error {
    Error::CacheIo(format!("{} {}: {}", action, path.display(), err))
}

/// Write `contents` to a sibling temp file, then rename it over `path`.
///
/// The rename replaces a directory entry rather than following it, so the
/// result is always a regular file.
fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    let _ = fs::remove_file(&tmp);

    let result = (|| -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    fs::rename(&tmp, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp);
    })
}
