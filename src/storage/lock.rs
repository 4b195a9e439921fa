//! Exclusive writer lock.
//!
//! File-backed storage uses an advisory `fs2` lock on a lock file inside the
//! database directory; in-memory storage uses a registry shared by all clones
//! of the storage. Either way the lock is released when the guard drops.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use fs2::FileExt;
use parking_lot::Mutex;

use crate::error::{Result, TesseraError};

/// Guard holding the exclusive writer lock.
#[derive(Debug)]
pub struct StorageLock {
    kind: LockKind,
}

#[derive(Debug)]
enum LockKind {
    File(File),
    Registry {
        registry: Arc<Mutex<HashSet<String>>>,
        name: String,
    },
}

impl StorageLock {
    /// Lock a file on disk.
    pub(crate) fn acquire_file(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                TesseraError::database_lock(format!(
                    "failed to open lock file '{}': {e}",
                    path.display()
                ))
            })?;
        file.try_lock_exclusive().map_err(|_| {
            TesseraError::database_lock(format!(
                "database at '{}' is already locked for writing",
                path.parent().unwrap_or(path).display()
            ))
        })?;
        Ok(StorageLock {
            kind: LockKind::File(file),
        })
    }

    /// Lock a name in an in-process registry.
    pub(crate) fn acquire_registry(
        registry: Arc<Mutex<HashSet<String>>>,
        name: &str,
    ) -> Result<Self> {
        if !registry.lock().insert(name.to_string()) {
            return Err(TesseraError::database_lock(format!(
                "in-memory database lock '{name}' is already held"
            )));
        }
        Ok(StorageLock {
            kind: LockKind::Registry {
                registry,
                name: name.to_string(),
            },
        })
    }
}

impl Drop for StorageLock {
    fn drop(&mut self) {
        match &self.kind {
            LockKind::File(file) => {
                if let Err(e) = FileExt::unlock(file) {
                    log::warn!("failed to release database lock: {e}");
                }
            }
            LockKind::Registry { registry, name } => {
                registry.lock().remove(name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_lock_is_exclusive() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tessera.lock");

        let first = StorageLock::acquire_file(&path).unwrap();
        let err = StorageLock::acquire_file(&path).unwrap_err();
        assert!(matches!(err, TesseraError::DatabaseLock(_)));

        drop(first);
        assert!(StorageLock::acquire_file(&path).is_ok());
    }

    #[test]
    fn test_registry_lock_is_exclusive() {
        let registry = Arc::new(Mutex::new(HashSet::new()));
        let first = StorageLock::acquire_registry(registry.clone(), "db").unwrap();
        assert!(StorageLock::acquire_registry(registry.clone(), "db").is_err());
        drop(first);
        assert!(StorageLock::acquire_registry(registry, "db").is_ok());
    }
}
