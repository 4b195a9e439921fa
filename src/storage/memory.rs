//! In-memory storage.
//!
//! Files live in a shared map; clones of a [`MemoryStorage`] see the same
//! files, which is how several handles open "the same" in-memory database.

use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};
use crate::storage::lock::StorageLock;
use crate::storage::{Storage, StorageInput, StorageOutput};

/// Configuration for [`MemoryStorage`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStorageConfig {
    /// Initial capacity hint for newly created files.
    #[serde(default)]
    pub initial_file_capacity: usize,
}

type FileMap = Arc<RwLock<BTreeMap<String, Arc<Vec<u8>>>>>;

/// Storage keeping every file in memory.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    files: FileMap,
    locks: Arc<Mutex<HashSet<String>>>,
    config: MemoryStorageConfig,
}

impl MemoryStorage {
    /// Create an empty in-memory storage.
    pub fn new(config: MemoryStorageConfig) -> Self {
        MemoryStorage {
            files: Arc::new(RwLock::new(BTreeMap::new())),
            locks: Arc::new(Mutex::new(HashSet::new())),
            config,
        }
    }

    /// Total bytes held across all files.
    pub fn total_size(&self) -> usize {
        self.files.read().values().map(|f| f.len()).sum()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(MemoryStorageConfig::default())
    }
}

impl Storage for MemoryStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let data = self
            .files
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TesseraError::not_found(format!("file '{name}' does not exist")))?;
        Ok(Box::new(MemoryInput {
            cursor: Cursor::new(data),
        }))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        Ok(Box::new(MemoryOutput {
            name: name.to_string(),
            buffer: Vec::with_capacity(self.config.initial_file_capacity),
            files: self.files.clone(),
            published: false,
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.files.read().contains_key(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.files.write().remove(name);
        Ok(())
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        let mut files = self.files.write();
        let data = files
            .remove(old_name)
            .ok_or_else(|| TesseraError::not_found(format!("file '{old_name}' does not exist")))?;
        files.insert(new_name.to_string(), data);
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        Ok(self.files.read().keys().cloned().collect())
    }

    fn lock(&self, name: &str) -> Result<StorageLock> {
        StorageLock::acquire_registry(self.locks.clone(), name)
    }
}

#[derive(Debug)]
struct MemoryInput {
    cursor: Cursor<Arc<Vec<u8>>>,
}

impl Read for MemoryInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let position = self.cursor.position() as usize;
        let data = self.cursor.get_ref();
        let available = data.len().saturating_sub(position);
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&data[position..position + n]);
        self.cursor.set_position((position + n) as u64);
        Ok(n)
    }
}

impl StorageInput for MemoryInput {
    fn size(&self) -> Result<u64> {
        Ok(self.cursor.get_ref().len() as u64)
    }
}

/// Output buffering into memory; the file appears on `close()` (or drop).
#[derive(Debug)]
struct MemoryOutput {
    name: String,
    buffer: Vec<u8>,
    files: FileMap,
    published: bool,
}

impl MemoryOutput {
    fn publish(&mut self) {
        self.files
            .write()
            .insert(self.name.clone(), Arc::new(self.buffer.clone()));
        self.published = true;
    }
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.published = false;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl StorageOutput for MemoryOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.publish();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.publish();
        Ok(())
    }
}

impl Drop for MemoryOutput {
    fn drop(&mut self) {
        if !self.published {
            self.publish();
        }
    }
}
