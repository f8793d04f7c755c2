//! RevStore - durable per-repository revision watermarks
//!
//! Keeps the last confirmed revision for every watched repository in a single
//! JSON object file. Writers take an exclusive advisory lock on a sidecar file,
//! re-read the current contents, merge and atomically replace the file, so a
//! reader always sees a complete committed snapshot.
//!
//! # Layout
//!
//! ```text
//! ~/.local/share/svnwatch/
//! ├── last_revisions.json        # {"repo-id": 1234, ...}
//! └── last_revisions.json.lock   # advisory lock, never holds data
//! ```
//!
//! # Example
//!
//! ```ignore
//! use revstore::RevisionStore;
//!
//! let store = RevisionStore::open("/tmp/last_revisions.json")?;
//! let marks = store.load()?;
//! store.commit(&[("trunk".to_string(), 42)].into_iter().collect())?;
//! ```

pub mod cli;
pub mod config;
mod store;

use std::path::PathBuf;

pub use store::{RevisionStore, StoreError, Watermarks};

/// File name of the watermark file inside the data directory
pub const DEFAULT_FILE_NAME: &str = "last_revisions.json";

/// Default watermark file location shared by the monitor and this CLI
pub fn default_revisions_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("svnwatch")
        .join(DEFAULT_FILE_NAME)
}
