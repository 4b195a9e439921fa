//! Database handles.
//!
//! A database lives in a [`Storage`] location and is made of immutable
//! generations: each commit writes a fresh set of files and then switches
//! the manifest over to them. Read-only [`Database`] handles load one
//! generation into an immutable [`Snapshot`] and keep seeing it until
//! [`Database::reopen`] is called. A single [`WritableDatabase`] per location
//! holds the writer lock and stages changes until `commit()`.
//!
//! # Modules
//!
//! - [`config`]: [`DatabaseConfig`] and [`OpenMode`]
//! - [`manifest`]: the current-generation pointer
//! - [`snapshot`]: one loaded generation
//! - [`writable`]: the writer
//! - [`multi`]: several databases searched as one
//! - [`stub`]: resolving stub descriptor files to database locations

pub mod config;
pub mod manifest;
pub mod multi;
pub mod snapshot;
pub mod stub;
pub mod writable;

use std::path::Path;
use std::sync::Arc;

use crate::document::{DocId, Document, TermPos, ValueSlot};
use crate::error::{Result, TesseraError};
use crate::storage::file::FileStorageConfig;
use crate::storage::{Storage, StorageFactory};
use crate::term_store::PostingIterator;

use self::manifest::Manifest;

pub use self::config::{DatabaseConfig, OpenMode};
pub use self::multi::MultiReader;
pub use self::snapshot::Snapshot;
pub use self::stub::{DescriptorFileResolver, StubResolver};
pub use self::writable::WritableDatabase;

/// Read access to one consistent state of an index.
///
/// Implemented by [`Snapshot`] (one generation of one database) and
/// [`MultiReader`] (several databases with interleaved document ids). The
/// match and expand engines only ever talk to this trait.
pub trait IndexReader: Send + Sync + std::fmt::Debug {
    /// Number of live documents.
    fn doc_count(&self) -> u64;

    /// Highest document id in use (0 when empty).
    fn last_doc_id(&self) -> DocId;

    /// Sum of the lengths of all documents.
    fn total_length(&self) -> u64;

    /// Average document length.
    fn avg_length(&self) -> f64 {
        match self.doc_count() {
            0 => 0.0,
            n => self.total_length() as f64 / n as f64,
        }
    }

    /// Number of documents indexed by `term`.
    fn term_freq(&self, term: &str) -> u64;

    /// Occurrences of `term` over the whole collection.
    fn collection_freq(&self, term: &str) -> u64;

    fn term_exists(&self, term: &str) -> bool {
        self.term_freq(term) > 0
    }

    /// Cursor over the postings of `term`.
    fn postings(&self, term: &str) -> Result<PostingIterator>;

    /// Terms beginning with `prefix`, with document frequencies, sorted.
    fn all_terms(&self, prefix: &str) -> Vec<(String, u64)>;

    /// All live document ids, ascending.
    fn doc_ids(&self) -> Box<dyn Iterator<Item = DocId> + '_>;

    fn contains(&self, doc_id: DocId) -> bool;

    /// The stored document, positions included.
    fn document(&self, doc_id: DocId) -> Result<Document>;

    fn doc_length(&self, doc_id: DocId) -> Result<u64>;

    /// Terms of a document with their wdfs, sorted by term.
    fn termlist(&self, doc_id: DocId) -> Result<Vec<(String, u32)>>;

    /// Positions of `term` in `doc_id`; `NotFound` if the term is absent.
    fn positions(&self, term: &str, doc_id: DocId) -> Result<Vec<TermPos>>;

    fn value(&self, doc_id: DocId, slot: ValueSlot) -> Option<&[u8]>;

    /// Documents having a value in `slot`, ascending by id.
    fn value_entries(&self, slot: ValueSlot) -> Box<dyn Iterator<Item = (DocId, &[u8])> + '_>;

    fn value_freq(&self, slot: ValueSlot) -> u64;

    fn value_lower_bound(&self, slot: ValueSlot) -> Vec<u8>;

    fn value_upper_bound(&self, slot: ValueSlot) -> Vec<u8>;

    /// Metadata value; unset keys read as an empty string.
    fn metadata(&self, key: &str) -> Result<String>;

    fn metadata_keys(&self, prefix: &str) -> Vec<String>;

    /// Whether positional information is stored.
    fn has_positions(&self) -> bool;
}

#[derive(Debug, Clone)]
enum Origin {
    Storage {
        storage: Arc<dyn Storage>,
        generation: u64,
    },
    Shards(Vec<Database>),
    Fixed,
}

/// A read-only database handle.
///
/// Cheap to clone; clones share the loaded snapshot.
#[derive(Debug, Clone)]
pub struct Database {
    reader: Arc<dyn IndexReader>,
    origin: Origin,
}

impl Database {
    /// Open the database at `path`.
    ///
    /// A directory is opened as a database; a regular file is read as a stub
    /// descriptor with [`DescriptorFileResolver`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_resolver(path, &DescriptorFileResolver)
    }

    /// Open `path`, resolving stub files with `resolver`.
    pub fn open_with_resolver<P: AsRef<Path>>(path: P, resolver: &dyn StubResolver) -> Result<Self> {
        let path = path.as_ref();
        if path.is_file() {
            let locations = resolver.resolve(path)?;
            log::info!(
                "opening stub '{}' with {} databases",
                path.display(),
                locations.len()
            );
            let shards = locations
                .iter()
                .map(|location| Self::open_with_resolver(location, resolver))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Self::combine(shards));
        }
        let storage = StorageFactory::open_existing(FileStorageConfig::new(path))?;
        Self::from_storage(storage)
    }

    /// Open the database held in `storage`.
    pub fn from_storage(storage: Arc<dyn Storage>) -> Result<Self> {
        let (manifest, snapshot) = Snapshot::load_latest(storage.as_ref())?.ok_or_else(|| {
            TesseraError::database_opening(match storage.location() {
                Some(path) => format!("no database at '{}'", path.display()),
                None => "no database in storage".to_string(),
            })
        })?;
        log::info!(
            "opened database generation {} with {} documents",
            snapshot.generation(),
            snapshot.doc_count()
        );
        Ok(Database {
            reader: Arc::new(snapshot),
            origin: Origin::Storage {
                storage,
                generation: manifest.generation,
            },
        })
    }

    /// Search several databases as one.
    ///
    /// Document ids interleave: local id `l` of the `i`-th of `n` databases
    /// becomes `(l - 1) * n + i + 1`.
    pub fn combine(databases: Vec<Database>) -> Self {
        let reader = MultiReader::new(databases.iter().map(|db| db.reader.clone()).collect());
        Database {
            reader: Arc::new(reader),
            origin: Origin::Shards(databases),
        }
    }

    /// Wrap an in-memory reader that cannot be reopened.
    pub(crate) fn from_reader(reader: Arc<dyn IndexReader>) -> Self {
        Database {
            reader,
            origin: Origin::Fixed,
        }
    }

    /// Move to the latest committed state. Returns whether anything changed.
    pub fn reopen(&mut self) -> Result<bool> {
        match &mut self.origin {
            Origin::Storage {
                storage,
                generation,
            } => {
                let latest = Manifest::load(storage.as_ref())?
                    .ok_or_else(|| TesseraError::database_opening("database has been removed"))?;
                if latest.generation == *generation {
                    return Ok(false);
                }
                let (manifest, snapshot) = Snapshot::load_latest(storage.as_ref())?
                    .ok_or_else(|| TesseraError::database_opening("database has been removed"))?;
                log::debug!("reopened at generation {}", manifest.generation);
                *generation = manifest.generation;
                self.reader = Arc::new(snapshot);
                Ok(true)
            }
            Origin::Shards(shards) => {
                let mut changed = false;
                for shard in shards.iter_mut() {
                    changed |= shard.reopen()?;
                }
                if changed {
                    self.reader = Arc::new(MultiReader::new(
                        shards.iter().map(|db| db.reader.clone()).collect(),
                    ));
                }
                Ok(changed)
            }
            Origin::Fixed => Ok(false),
        }
    }

    /// The reader behind this handle.
    pub fn reader(&self) -> &dyn IndexReader {
        self.reader.as_ref()
    }

    pub fn doc_count(&self) -> u64 {
        self.reader.doc_count()
    }

    pub fn last_doc_id(&self) -> DocId {
        self.reader.last_doc_id()
    }

    pub fn avg_length(&self) -> f64 {
        self.reader.avg_length()
    }

    pub fn term_freq(&self, term: &str) -> u64 {
        self.reader.term_freq(term)
    }

    pub fn collection_freq(&self, term: &str) -> u64 {
        self.reader.collection_freq(term)
    }

    pub fn term_exists(&self, term: &str) -> bool {
        self.reader.term_exists(term)
    }

    pub fn postings(&self, term: &str) -> Result<PostingIterator> {
        self.reader.postings(term)
    }

    pub fn all_terms(&self, prefix: &str) -> Vec<(String, u64)> {
        self.reader.all_terms(prefix)
    }

    pub fn document(&self, doc_id: DocId) -> Result<Document> {
        self.reader.document(doc_id)
    }

    pub fn doc_length(&self, doc_id: DocId) -> Result<u64> {
        self.reader.doc_length(doc_id)
    }

    pub fn termlist(&self, doc_id: DocId) -> Result<Vec<(String, u32)>> {
        self.reader.termlist(doc_id)
    }

    pub fn positions(&self, term: &str, doc_id: DocId) -> Result<Vec<TermPos>> {
        self.reader.positions(term, doc_id)
    }

    pub fn value_freq(&self, slot: ValueSlot) -> u64 {
        self.reader.value_freq(slot)
    }

    pub fn value_lower_bound(&self, slot: ValueSlot) -> Vec<u8> {
        self.reader.value_lower_bound(slot)
    }

    pub fn value_upper_bound(&self, slot: ValueSlot) -> Vec<u8> {
        self.reader.value_upper_bound(slot)
    }

    pub fn metadata(&self, key: &str) -> Result<String> {
        self.reader.metadata(key)
    }

    pub fn metadata_keys(&self, prefix: &str) -> Vec<String> {
        self.reader.metadata_keys(prefix)
    }

    pub fn has_positions(&self) -> bool {
        self.reader.has_positions()
    }
}
