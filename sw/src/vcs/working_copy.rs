//! Working copy inspection and last-resort lock removal

use std::path::Path;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::error::VcsError;

/// Name of the svn administrative directory
pub const ADMIN_DIR: &str = ".svn";

/// A directory is a working copy only if it carries svn metadata
pub fn is_working_copy(path: &Path) -> bool {
    path.join(ADMIN_DIR).is_dir()
}

/// Delete lock marker files under the administrative directory
///
/// Used only when `svn cleanup` itself reports a lock. Returns the number of
/// files removed.
pub fn remove_lock_files(wc: &Path) -> Result<usize, VcsError> {
    let admin = wc.join(ADMIN_DIR);
    debug!(?admin, "remove_lock_files: called");
    if !admin.is_dir() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in WalkDir::new(&admin).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if !name.contains("lock") {
            continue;
        }

        match std::fs::remove_file(entry.path()) {
            Ok(()) => {
                debug!(path = ?entry.path(), "Removed lock file");
                removed += 1;
            }
            Err(e) => {
                warn!(path = ?entry.path(), error = %e, "Failed to remove lock file");
            }
        }
    }

    info!(?wc, removed, "Manual lock removal finished");
    Ok(removed)
}

/// Remove a directory that exists but is not a usable working copy
pub async fn discard(path: &Path) -> Result<(), VcsError> {
    if !path.exists() {
        return Ok(());
    }
    warn!(?path, "Discarding invalid working copy");
    tokio::fs::remove_dir_all(path).await.map_err(|source| VcsError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Make sure the parent directory of a future checkout exists
pub async fn prepare_parent(path: &Path) -> Result<(), VcsError> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => tokio::fs::create_dir_all(parent).await.map_err(|source| VcsError::Io {
            path: parent.to_path_buf(),
            source,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_is_working_copy() {
        let temp = TempDir::new().unwrap();
        assert!(!is_working_copy(temp.path()));

        // A plain file named .svn does not count
        fs::write(temp.path().join(ADMIN_DIR), "").unwrap();
        assert!(!is_working_copy(temp.path()));

        fs::remove_file(temp.path().join(ADMIN_DIR)).unwrap();
        fs::create_dir(temp.path().join(ADMIN_DIR)).unwrap();
        assert!(is_working_copy(temp.path()));
    }

    #[test]
    fn test_remove_lock_files() {
        let temp = TempDir::new().unwrap();
        let admin = temp.path().join(ADMIN_DIR);
        fs::create_dir_all(admin.join("tmp")).unwrap();
        fs::write(admin.join("wc.db"), "db").unwrap();
        fs::write(admin.join("lock"), "").unwrap();
        fs::write(admin.join("tmp").join("WC.LOCK"), "").unwrap();
        fs::write(admin.join("entries"), "").unwrap();
        // Outside .svn is never touched
        fs::write(temp.path().join("deadlock.txt"), "user file").unwrap();

        let removed = remove_lock_files(temp.path()).unwrap();

        assert_eq!(removed, 2);
        assert!(admin.join("wc.db").exists());
        assert!(admin.join("entries").exists());
        assert!(!admin.join("lock").exists());
        assert!(!admin.join("tmp").join("WC.LOCK").exists());
        assert!(temp.path().join("deadlock.txt").exists());
    }

    #[test]
    fn test_remove_lock_files_without_admin_dir() {
        let temp = TempDir::new().unwrap();
        assert_eq!(remove_lock_files(temp.path()).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_discard_and_prepare_parent() {
        let temp = TempDir::new().unwrap();
        let wc = temp.path().join("repos").join("core");
        fs::create_dir_all(wc.join("trunk")).unwrap();

        discard(&wc).await.unwrap();
        assert!(!wc.exists());
        // Missing directory is fine
        discard(&wc).await.unwrap();

        let nested = temp.path().join("a").join("b").join("wc");
        prepare_parent(&nested).await.unwrap();
        assert!(temp.path().join("a").join("b").is_dir());
        assert!(!nested.exists());
    }
}
