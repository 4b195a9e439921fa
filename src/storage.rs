//! Storage abstraction for database files.
//!
//! A [`Storage`] is a flat namespace of named files. Databases never touch the
//! file system directly; they go through this trait so that the same code can
//! run against a directory ([`file::FileStorage`]) or entirely in memory
//! ([`memory::MemoryStorage`]).
//!
//! # Modules
//!
//! - [`file`]: directory-backed storage
//! - [`memory`]: in-memory storage, mostly for tests and temporary databases
//! - [`structured`]: checksummed binary readers and writers
//! - [`lock`]: the exclusive writer lock

pub mod file;
pub mod lock;
pub mod memory;
pub mod structured;

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

use self::file::{FileStorage, FileStorageConfig};
use self::lock::StorageLock;
use self::memory::{MemoryStorage, MemoryStorageConfig};

/// A readable file handle.
pub trait StorageInput: Read + Send + std::fmt::Debug {
    /// Total size of the file in bytes.
    fn size(&self) -> Result<u64>;
}

/// A writable file handle.
pub trait StorageOutput: Write + Send + std::fmt::Debug {
    /// Flush buffered bytes and make them durable.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Finish writing. Implementations must make the content visible to
    /// subsequent `open_input` calls once this returns.
    fn close(&mut self) -> Result<()>;
}

/// A flat namespace of named files.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Open an existing file for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create (or truncate) a file for writing.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Check whether a file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Delete a file. Deleting a missing file is not an error.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// Atomically replace `new_name` with `old_name`.
    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()>;

    /// List all files.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Take the exclusive writer lock identified by `name`.
    ///
    /// Fails with `DatabaseLock` if another holder has it.
    fn lock(&self, name: &str) -> Result<StorageLock>;

    /// The on-disk location backing this storage, if any.
    fn location(&self) -> Option<PathBuf> {
        None
    }

    /// Make directory-level changes (creates, renames) durable.
    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

/// Name of the file holding one part of a committed generation.
pub fn generation_file_name(generation: u64, extension: &str) -> String {
    format!("{generation:010}.{extension}")
}

/// Parse the generation out of a name built by [`generation_file_name`].
pub fn parse_generation_file_name(name: &str) -> Option<(u64, &str)> {
    let (stem, extension) = name.split_once('.')?;
    if stem.len() != 10 {
        return None;
    }
    Some((stem.parse().ok()?, extension))
}

/// Configuration selecting a storage backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageConfig {
    /// Directory-backed storage.
    File(FileStorageConfig),
    /// In-memory storage.
    Memory(MemoryStorageConfig),
}

/// Factory creating storage backends from configuration.
pub struct StorageFactory;

impl StorageFactory {
    /// Create a storage backend.
    pub fn create(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        match config {
            StorageConfig::File(file_config) => Ok(Arc::new(FileStorage::new(file_config)?)),
            StorageConfig::Memory(memory_config) => Ok(Arc::new(MemoryStorage::new(memory_config))),
        }
    }

    /// Open existing directory-backed storage without creating the directory.
    pub fn open_existing(config: FileStorageConfig) -> Result<Arc<dyn Storage>> {
        Ok(Arc::new(FileStorage::open_existing(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn roundtrip(storage: Arc<dyn Storage>) {
        let mut output = storage.create_output("a.bin").unwrap();
        output.write_all(b"hello\0world").unwrap();
        output.close().unwrap();

        assert!(storage.file_exists("a.bin"));
        let mut input = storage.open_input("a.bin").unwrap();
        assert_eq!(input.size().unwrap(), 11);
        let mut buf = Vec::new();
        input.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello\0world");

        storage.rename_file("a.bin", "b.bin").unwrap();
        assert!(!storage.file_exists("a.bin"));
        assert_eq!(storage.list_files().unwrap(), vec!["b.bin".to_string()]);

        storage.delete_file("b.bin").unwrap();
        storage.delete_file("b.bin").unwrap();
        assert!(storage.list_files().unwrap().is_empty());
    }

    #[test]
    fn test_generation_file_names() {
        let name = generation_file_name(42, "postings");
        assert_eq!(name, "0000000042.postings");
        assert_eq!(parse_generation_file_name(&name), Some((42, "postings")));
        assert_eq!(parse_generation_file_name("manifest.json"), None);
        assert_eq!(parse_generation_file_name("tessera.lock"), None);
    }

    #[test]
    fn test_memory_storage_roundtrip() {
        let storage = StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default()))
            .unwrap();
        roundtrip(storage);
    }

    #[test]
    fn test_file_storage_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let storage =
            StorageFactory::create(StorageConfig::File(FileStorageConfig::new(temp_dir.path())))
                .unwrap();
        roundtrip(storage);
    }
}
