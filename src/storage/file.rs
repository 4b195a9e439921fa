//! Directory-backed storage.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};
use crate::storage::lock::StorageLock;
use crate::storage::{Storage, StorageInput, StorageOutput};

/// Configuration for [`FileStorage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStorageConfig {
    /// Directory holding the database files.
    pub path: PathBuf,

    /// Whether `close()` on an output also fsyncs the file.
    #[serde(default = "default_sync")]
    pub sync_writes: bool,
}

fn default_sync() -> bool {
    true
}

impl FileStorageConfig {
    /// Create a configuration for the given directory.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileStorageConfig {
            path: path.as_ref().to_path_buf(),
            sync_writes: true,
        }
    }

    /// Enable or disable fsync on close.
    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }
}

/// Storage rooted at a directory.
#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
    config: FileStorageConfig,
}

impl FileStorage {
    /// Create storage at the configured directory, creating it if needed.
    pub fn new(config: FileStorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        Ok(FileStorage {
            root: config.path.clone(),
            config,
        })
    }

    /// Open storage at an existing directory.
    pub fn open_existing(config: FileStorageConfig) -> Result<Self> {
        if !config.path.is_dir() {
            return Err(TesseraError::database_opening(format!(
                "no database directory at '{}'",
                config.path.display()
            )));
        }
        Ok(FileStorage {
            root: config.path.clone(),
            config,
        })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl Storage for FileStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let path = self.path_for(name);
        let file = File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TesseraError::not_found(format!("file '{}' does not exist", path.display()))
            } else {
                TesseraError::Io(e)
            }
        })?;
        let size = file.metadata()?.len();
        Ok(Box::new(FileInput {
            reader: BufReader::new(file),
            size,
        }))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.path_for(name))?;
        Ok(Box::new(FileOutput {
            writer: BufWriter::new(file),
            sync_on_close: self.config.sync_writes,
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.path_for(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        fs::rename(self.path_for(old_name), self.path_for(new_name))?;
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file()
                && let Some(name) = entry.file_name().to_str()
            {
                files.push(name.to_string());
            }
        }
        files.sort();
        Ok(files)
    }

    fn lock(&self, name: &str) -> Result<StorageLock> {
        StorageLock::acquire_file(&self.path_for(name))
    }

    fn location(&self) -> Option<PathBuf> {
        Some(self.root.clone())
    }

    fn sync(&self) -> Result<()> {
        if !self.config.sync_writes {
            return Ok(());
        }
        // Directory fsync is not supported everywhere; a failure here only
        // weakens durability of the rename, so it is not surfaced.
        if let Ok(dir) = File::open(&self.root) {
            let _ = dir.sync_all();
        }
        Ok(())
    }
}

#[derive(Debug)]
struct FileInput {
    reader: BufReader<File>,
    size: u64,
}

impl Read for FileInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl StorageInput for FileInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }
}

#[derive(Debug)]
struct FileOutput {
    writer: BufWriter<File>,
    sync_on_close: bool,
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl StorageOutput for FileOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.sync_on_close {
            self.flush_and_sync()
        } else {
            self.writer.flush()?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_existing_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nosuchdb");
        let err = FileStorage::open_existing(FileStorageConfig::new(&missing)).unwrap_err();
        assert!(matches!(err, TesseraError::DatabaseOpening(_)));
    }

    #[test]
    fn test_open_input_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(FileStorageConfig::new(temp_dir.path())).unwrap();
        let err = storage.open_input("missing").unwrap_err();
        assert!(matches!(err, TesseraError::NotFound(_)));
    }
}
