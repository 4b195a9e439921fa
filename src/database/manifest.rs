//! The manifest: which generation is current.
//!
//! Commit writes every file of a new generation first and then replaces the
//! manifest through a temporary file and a rename. Until the rename lands,
//! readers keep seeing the previous generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::doc_store::persist as doc_persist;
use crate::error::{Result, TesseraError};
use crate::storage::Storage;
use crate::storage::structured::{StructReader, StructWriter};
use crate::term_store::dictionary;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const LOCK_FILE: &str = "tessera.lock";
const FORMAT_VERSION: u32 = 1;

/// Contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    /// Current generation.
    pub generation: u64,
    /// Older generations whose files are still on disk.
    #[serde(default)]
    pub retained: Vec<u64>,
    pub doc_count: u64,
    pub last_doc_id: u64,
    pub committed_at: DateTime<Utc>,
}

impl Manifest {
    pub fn new(generation: u64, doc_count: u64, last_doc_id: u64) -> Self {
        Manifest {
            format_version: FORMAT_VERSION,
            generation,
            retained: Vec::new(),
            doc_count,
            last_doc_id,
            committed_at: Utc::now(),
        }
    }

    /// Load the manifest, or `None` if the location holds no database.
    pub fn load(storage: &dyn Storage) -> Result<Option<Manifest>> {
        if !storage.file_exists(MANIFEST_FILE) {
            return Ok(None);
        }
        let mut reader = StructReader::new(storage.open_input(MANIFEST_FILE)?, MANIFEST_FILE)?;
        let json = reader.read_bytes()?;
        let manifest: Manifest = serde_json::from_slice(&json)
            .map_err(|e| TesseraError::corrupt(format!("failed to parse manifest: {e}")))?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(TesseraError::database_opening(format!(
                "unsupported database format version {}",
                manifest.format_version
            )));
        }
        Ok(Some(manifest))
    }

    /// Atomically replace the manifest.
    pub fn store(&self, storage: &dyn Storage) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        let tmp_file = format!("{MANIFEST_FILE}.tmp");
        let mut writer = StructWriter::new(storage.create_output(&tmp_file)?);
        writer.write_bytes(&json)?;
        writer.close()?;
        storage.rename_file(&tmp_file, MANIFEST_FILE)?;
        storage.sync()
    }

    /// Generations that must stay on disk.
    pub fn live_generations(&self) -> impl Iterator<Item = u64> + '_ {
        std::iter::once(self.generation).chain(self.retained.iter().copied())
    }
}

/// Every file belonging to `generation`.
pub fn generation_files(generation: u64) -> Vec<String> {
    let mut files = dictionary::generation_files(generation).to_vec();
    files.extend(doc_persist::generation_files(generation));
    files
}
