//! Core RevisionStore implementation

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::{debug, info};

/// Repository id -> last confirmed revision
pub type Watermarks = BTreeMap<String, u64>;

/// Errors raised by the watermark store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Revision file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid store path: {0}")]
    InvalidPath(PathBuf),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// File-backed watermark store
#[derive(Debug, Clone)]
pub struct RevisionStore {
    path: PathBuf,
    lock_path: PathBuf,
    tmp_path: PathBuf,
}

impl RevisionStore {
    /// Open the store backed by `path`, creating its parent directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file_name = path
            .file_name()
            .ok_or_else(|| StoreError::InvalidPath(path.clone()))?
            .to_os_string();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let sibling = |suffix: &str| {
            let mut name = OsString::from(&file_name);
            name.push(suffix);
            path.with_file_name(name)
        };
        let store = Self {
            lock_path: sibling(".lock"),
            tmp_path: sibling(".tmp"),
            path,
        };
        debug!(path = ?store.path, "Opened revision store");
        Ok(store)
    }

    /// Path of the backing JSON file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the committed watermarks from disk
    ///
    /// A missing or blank file is an empty map. A file that does not parse is
    /// an error; callers must not treat it as "everything is new".
    pub fn load(&self) -> Result<Watermarks, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "No revision file yet");
                return Ok(Watermarks::new());
            }
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        if content.trim().is_empty() {
            return Ok(Watermarks::new());
        }

        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Watermark for one repository, 0 when never recorded
    pub fn get(&self, repo: &str) -> Result<u64, StoreError> {
        Ok(self.load()?.get(repo).copied().unwrap_or(0))
    }

    /// Merge proposed watermarks into the store
    ///
    /// Each value is raised to `max(stored, proposed)`, so a stale proposal can
    /// never move a watermark backwards. Returns the resulting full map.
    pub fn commit(&self, updates: &Watermarks) -> Result<Watermarks, StoreError> {
        debug!(count = updates.len(), "RevisionStore::commit: called");
        self.modify(|marks| {
            for (repo, &revision) in updates {
                let entry = marks.entry(repo.clone()).or_insert(0);
                if revision > *entry {
                    info!(repo = %repo, from = *entry, to = revision, "Watermark advanced");
                    *entry = revision;
                }
            }
        })
        .map(|(_, marks)| marks)
    }

    /// Force a watermark to an exact value, returning the previous one
    pub fn set(&self, repo: &str, revision: u64) -> Result<Option<u64>, StoreError> {
        self.modify(|marks| marks.insert(repo.to_string(), revision))
            .map(|(previous, _)| previous)
    }

    /// Forget a repository entirely, returning the previous watermark
    pub fn remove(&self, repo: &str) -> Result<Option<u64>, StoreError> {
        self.modify(|marks| marks.remove(repo)).map(|(previous, _)| previous)
    }

    /// Locked read-modify-write cycle
    fn modify<T>(&self, f: impl FnOnce(&mut Watermarks) -> T) -> Result<(T, Watermarks), StoreError> {
        let lock = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| StoreError::io(&self.lock_path, e))?;
        lock.lock_exclusive().map_err(|source| StoreError::Lock {
            path: self.lock_path.clone(),
            source,
        })?;

        let result = self.load().and_then(|mut marks| {
            let out = f(&mut marks);
            self.write_atomic(&marks)?;
            Ok((out, marks))
        });

        let _ = FileExt::unlock(&lock);
        result
    }

    fn write_atomic(&self, marks: &Watermarks) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(marks).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp = fs::File::create(&self.tmp_path).map_err(|e| StoreError::io(&self.tmp_path, e))?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.write_all(b"\n"))
            .and_then(|_| tmp.sync_all())
            .map_err(|e| StoreError::io(&self.tmp_path, e))?;
        drop(tmp);

        fs::rename(&self.tmp_path, &self.path).map_err(|e| StoreError::io(&self.path, e))?;
        debug!(path = ?self.path, entries = marks.len(), "Wrote revision file");
        Ok(())
    }
}
