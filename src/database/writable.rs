//! The writer.
//!
//! A [`WritableDatabase`] holds the exclusive lock on its location and a
//! pending copy of the index state. Changes stay private to the writer until
//! [`commit`](WritableDatabase::commit) writes them out as a new generation;
//! dropping the writer or calling [`cancel`](WritableDatabase::cancel)
//! discards them.

use std::path::Path;
use std::sync::Arc;

use crate::database::config::{DatabaseConfig, OpenMode};
use crate::database::manifest::{LOCK_FILE, MANIFEST_FILE, Manifest, generation_files};
use crate::database::snapshot::Snapshot;
use crate::database::Database;
use crate::doc_store::DocumentStore;
use crate::document::{DocId, Document, TermPos, ValueSlot};
use crate::error::{Result, TesseraError};
use crate::storage::file::FileStorageConfig;
use crate::storage::lock::StorageLock;
use crate::storage::memory::MemoryStorage;
use crate::storage::{Storage, StorageConfig, StorageFactory, parse_generation_file_name};
use crate::term_store::TermStore;

#[derive(Debug)]
struct Transaction {
    terms: TermStore,
    docs: DocumentStore,
    pending_changes: usize,
    modified: bool,
    flushed: bool,
}

/// A database open for writing.
#[derive(Debug)]
pub struct WritableDatabase {
    storage: Arc<dyn Storage>,
    config: DatabaseConfig,
    manifest: Manifest,
    terms: TermStore,
    docs: DocumentStore,
    pending_changes: usize,
    modified: bool,
    transaction: Option<Transaction>,
    _lock: StorageLock,
}

impl WritableDatabase {
    /// Open a database directory for writing.
    pub fn open<P: AsRef<Path>>(path: P, config: DatabaseConfig) -> Result<Self> {
        let file_config = FileStorageConfig::new(path.as_ref());
        let storage = match config.open_mode {
            OpenMode::Open => StorageFactory::open_existing(file_config)?,
            _ => StorageFactory::create(StorageConfig::File(file_config))?,
        };
        Self::open_storage(storage, config)
    }

    /// Create a database living only in memory.
    pub fn inmemory() -> Result<Self> {
        Self::open_storage(
            Arc::new(MemoryStorage::default()),
            DatabaseConfig::new(OpenMode::CreateOrOverwrite),
        )
    }

    /// Open the database held in `storage` for writing.
    pub fn open_storage(storage: Arc<dyn Storage>, config: DatabaseConfig) -> Result<Self> {
        let lock = storage.lock(LOCK_FILE)?;
        let existing = Manifest::load(storage.as_ref())?;

        let (manifest, terms, docs, fresh) = match (config.open_mode, existing) {
            (OpenMode::Open, None) => {
                return Err(TesseraError::database_opening(
                    "no database exists at this location",
                ));
            }
            (OpenMode::Create, Some(_)) => {
                return Err(TesseraError::database_opening(
                    "a database already exists at this location",
                ));
            }
            (OpenMode::CreateOrOverwrite, Some(old)) => {
                let manifest = Manifest {
                    retained: Vec::new(),
                    ..Manifest::new(old.generation, 0, 0)
                };
                (manifest, TermStore::new(), DocumentStore::new(), true)
            }
            (_, Some(manifest)) => {
                let snapshot = Snapshot::load(storage.as_ref(), manifest.generation)?;
                if snapshot.docs().doc_count() != manifest.doc_count {
                    return Err(TesseraError::corrupt(format!(
                        "manifest records {} documents but generation {} holds {}",
                        manifest.doc_count,
                        manifest.generation,
                        snapshot.docs().doc_count()
                    )));
                }
                let terms = snapshot.terms().clone();
                let docs = snapshot.docs().clone();
                (manifest, terms, docs, false)
            }
            (_, None) => (
                Manifest::new(0, 0, 0),
                TermStore::new(),
                DocumentStore::new(),
                true,
            ),
        };

        let mut db = WritableDatabase {
            storage,
            config,
            manifest,
            terms,
            docs,
            pending_changes: 0,
            modified: false,
            transaction: None,
            _lock: lock,
        };
        if fresh {
            db.write_generation()?;
        }
        db.remove_orphans()?;
        log::info!(
            "opened writable database at generation {} with {} documents",
            db.manifest.generation,
            db.docs.doc_count()
        );
        Ok(db)
    }

    /// Delete files no live generation refers to, e.g. from a crashed commit.
    fn remove_orphans(&self) -> Result<()> {
        let live: Vec<u64> = self.manifest.live_generations().collect();
        let tmp_manifest = format!("{MANIFEST_FILE}.tmp");
        for name in self.storage.list_files()? {
            let orphan = match parse_generation_file_name(&name) {
                Some((generation, _)) => !live.contains(&generation),
                None => name == tmp_manifest,
            };
            if orphan {
                log::debug!("removing orphaned file '{name}'");
                if let Err(e) = self.storage.delete_file(&name) {
                    log::warn!("failed to remove orphaned file '{name}': {e}");
                }
            }
        }
        Ok(())
    }

    fn record_change(&mut self) -> Result<()> {
        self.modified = true;
        self.pending_changes += 1;
        if self.config.flush_threshold > 0
            && self.pending_changes >= self.config.flush_threshold
            && self.transaction.is_none()
        {
            log::debug!("auto-committing after {} changes", self.pending_changes);
            self.commit()?;
        }
        Ok(())
    }

    /// Add a document under the next free id.
    pub fn add_document(&mut self, doc: &Document) -> Result<DocId> {
        let doc_id = self.docs.put(&mut self.terms, doc)?;
        self.record_change()?;
        Ok(doc_id)
    }

    /// Store `doc` under `doc_id`, replacing whatever was there.
    pub fn replace_document(&mut self, doc_id: DocId, doc: &Document) -> Result<()> {
        self.docs.replace(&mut self.terms, doc_id, doc)?;
        self.record_change()
    }

    /// Delete a document and its postings.
    pub fn delete_document(&mut self, doc_id: DocId) -> Result<()> {
        self.docs.delete(&mut self.terms, doc_id)?;
        self.record_change()
    }

    /// Delete every document indexed by `term`. Returns how many went.
    pub fn delete_documents_by_term(&mut self, term: &str) -> Result<usize> {
        let ids: Vec<DocId> = self.terms.postings_for(term).map(|p| p.doc_id).collect();
        for &doc_id in &ids {
            self.docs.delete(&mut self.terms, doc_id)?;
        }
        if !ids.is_empty() {
            self.record_change()?;
        }
        Ok(ids.len())
    }

    /// Replace the documents indexed by `term` with `doc`.
    ///
    /// The first matching id is reused and the others are deleted; with no
    /// match the document is added under a new id.
    pub fn replace_document_by_term(&mut self, term: &str, doc: &Document) -> Result<DocId> {
        let ids: Vec<DocId> = self.terms.postings_for(term).map(|p| p.doc_id).collect();
        let Some((&first, rest)) = ids.split_first() else {
            return self.add_document(doc);
        };
        self.docs.replace(&mut self.terms, first, doc)?;
        for &doc_id in rest {
            self.docs.delete(&mut self.terms, doc_id)?;
        }
        self.record_change()?;
        Ok(first)
    }

    pub fn set_value(&mut self, doc_id: DocId, slot: ValueSlot, value: &[u8]) -> Result<()> {
        self.docs.set_value(doc_id, slot, value)?;
        self.record_change()
    }

    /// Set a metadata entry; an empty value removes it.
    pub fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.docs.set_metadata(key, value)?;
        self.modified = true;
        Ok(())
    }

    pub fn metadata(&self, key: &str) -> Result<String> {
        self.docs.get_metadata(key)
    }

    pub fn metadata_keys(&self, prefix: &str) -> Vec<String> {
        self.docs.metadata_keys(prefix)
    }

    pub fn document(&self, doc_id: DocId) -> Result<Document> {
        self.docs.get(&self.terms, doc_id)
    }

    pub fn doc_count(&self) -> u64 {
        self.docs.doc_count()
    }

    pub fn last_doc_id(&self) -> DocId {
        self.docs.last_doc_id()
    }

    pub fn term_freq(&self, term: &str) -> u64 {
        self.terms.document_frequency(term)
    }

    pub fn positions(&self, term: &str, doc_id: DocId) -> Result<Vec<TermPos>> {
        Ok(self.terms.positions(term, doc_id)?.to_vec())
    }

    /// Whether there are changes not yet committed.
    pub fn has_pending_changes(&self) -> bool {
        self.modified
    }

    /// A read-only view of the current state, uncommitted changes included.
    pub fn reader(&self) -> Database {
        Database::from_reader(Arc::new(Snapshot::new(
            self.manifest.generation,
            self.terms.clone(),
            self.docs.clone(),
        )))
    }

    /// The committed generation.
    pub fn generation(&self) -> u64 {
        self.manifest.generation
    }

    /// Make pending changes durable and visible to newly opened readers.
    pub fn commit(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            return Err(TesseraError::invalid_operation(
                "can't commit during a transaction",
            ));
        }
        if !self.modified {
            return Ok(());
        }
        self.write_generation()?;
        self.pending_changes = 0;
        self.modified = false;
        Ok(())
    }

    fn write_generation(&mut self) -> Result<()> {
        let generation = self.manifest.generation + 1;
        Snapshot::write(self.storage.as_ref(), generation, &self.terms, &self.docs)?;

        let mut retained: Vec<u64> = self.manifest.live_generations().filter(|&g| g > 0).collect();
        retained.truncate(self.config.retained_generations);
        let dropped: Vec<u64> = self
            .manifest
            .live_generations()
            .filter(|g| *g > 0 && !retained.contains(g))
            .collect();

        let manifest = Manifest {
            retained,
            ..Manifest::new(generation, self.docs.doc_count(), self.docs.last_doc_id())
        };
        manifest.store(self.storage.as_ref())?;
        self.manifest = manifest;

        for old in dropped {
            for name in generation_files(old) {
                if let Err(e) = self.storage.delete_file(&name) {
                    log::warn!("failed to remove '{name}' of generation {old}: {e}");
                }
            }
        }
        log::debug!(
            "committed generation {generation} with {} documents",
            self.docs.doc_count()
        );
        Ok(())
    }

    /// Discard changes made since the last commit.
    pub fn cancel(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            return Err(TesseraError::invalid_operation(
                "use cancel_transaction() while a transaction is open",
            ));
        }
        if !self.modified {
            return Ok(());
        }
        let snapshot = Snapshot::load(self.storage.as_ref(), self.manifest.generation)?;
        self.terms = snapshot.terms().clone();
        self.docs = snapshot.docs().clone();
        self.pending_changes = 0;
        self.modified = false;
        Ok(())
    }

    /// Start a transaction.
    ///
    /// With `flushed`, pending changes are committed first and
    /// [`commit_transaction`](Self::commit_transaction) commits the
    /// transaction's changes; otherwise they simply stay pending.
    pub fn begin_transaction(&mut self, flushed: bool) -> Result<()> {
        if self.transaction.is_some() {
            return Err(TesseraError::invalid_operation(
                "transactions can't be nested",
            ));
        }
        if flushed {
            self.commit()?;
        }
        self.transaction = Some(Transaction {
            terms: self.terms.clone(),
            docs: self.docs.clone(),
            pending_changes: self.pending_changes,
            modified: self.modified,
            flushed,
        });
        Ok(())
    }

    /// Keep the transaction's changes.
    pub fn commit_transaction(&mut self) -> Result<()> {
        let transaction = self
            .transaction
            .take()
            .ok_or_else(|| TesseraError::invalid_operation("no transaction in progress"))?;
        if transaction.flushed {
            self.commit()?;
        }
        Ok(())
    }

    /// Throw away the transaction's changes.
    pub fn cancel_transaction(&mut self) -> Result<()> {
        let transaction = self
            .transaction
            .take()
            .ok_or_else(|| TesseraError::invalid_operation("no transaction in progress"))?;
        self.terms = transaction.terms;
        self.docs = transaction.docs;
        self.pending_changes = transaction.pending_changes;
        self.modified = transaction.modified;
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }
}

impl Drop for WritableDatabase {
    fn drop(&mut self) {
        if self.modified {
            log::debug!("discarding uncommitted changes on close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc(text: &str) -> Document {
        let mut doc = Document::with_data(text);
        for (i, word) in text.split_whitespace().enumerate() {
            doc.add_posting(word, i as TermPos + 1).unwrap();
        }
        doc
    }

    #[test]
    fn test_commit_makes_changes_visible() -> Result<()> {
        let dir = TempDir::new()?;
        let mut db = WritableDatabase::open(dir.path(), DatabaseConfig::default())?;
        assert_eq!(db.add_document(&doc("hello world"))?, 1);
        assert_eq!(db.add_document(&doc("hello there"))?, 2);

        let reader = Database::open(dir.path())?;
        assert_eq!(reader.doc_count(), 0);

        db.commit()?;
        let reader = Database::open(dir.path())?;
        assert_eq!(reader.doc_count(), 2);
        assert_eq!(reader.term_freq("hello"), 2);
        assert_eq!(reader.positions("there", 2)?, vec![2]);
        Ok(())
    }

    #[test]
    fn test_reopen_after_commit() -> Result<()> {
        let dir = TempDir::new()?;
        let mut db = WritableDatabase::open(dir.path(), DatabaseConfig::default())?;
        let mut reader = Database::open(dir.path())?;
        assert!(!reader.reopen()?);

        db.add_document(&doc("one"))?;
        db.commit()?;
        assert_eq!(reader.doc_count(), 0);
        assert!(reader.reopen()?);
        assert_eq!(reader.doc_count(), 1);
        Ok(())
    }

    #[test]
    fn test_second_writer_is_locked_out() -> Result<()> {
        let dir = TempDir::new()?;
        let _db = WritableDatabase::open(dir.path(), DatabaseConfig::default())?;
        let err = WritableDatabase::open(dir.path(), DatabaseConfig::default()).unwrap_err();
        assert!(matches!(err, TesseraError::DatabaseLock(_)));
        Ok(())
    }

    #[test]
    fn test_open_modes() -> Result<()> {
        let dir = TempDir::new()?;
        let err = WritableDatabase::open(dir.path(), DatabaseConfig::new(OpenMode::Open)).unwrap_err();
        assert!(matches!(err, TesseraError::DatabaseOpening(_)));

        {
            let mut db = WritableDatabase::open(dir.path(), DatabaseConfig::new(OpenMode::Create))?;
            db.add_document(&doc("kept"))?;
            db.commit()?;
        }
        let err = WritableDatabase::open(dir.path(), DatabaseConfig::new(OpenMode::Create)).unwrap_err();
        assert!(matches!(err, TesseraError::DatabaseOpening(_)));

        let db = WritableDatabase::open(dir.path(), DatabaseConfig::new(OpenMode::Open))?;
        assert_eq!(db.doc_count(), 1);
        drop(db);

        let db = WritableDatabase::open(dir.path(), DatabaseConfig::new(OpenMode::CreateOrOverwrite))?;
        assert_eq!(db.doc_count(), 0);
        drop(db);
        assert_eq!(Database::open(dir.path())?.doc_count(), 0);
        Ok(())
    }

    #[test]
    fn test_cancel_discards_pending() -> Result<()> {
        let mut db = WritableDatabase::inmemory()?;
        db.add_document(&doc("a"))?;
        db.commit()?;
        db.add_document(&doc("b"))?;
        db.delete_document(1)?;
        assert!(db.has_pending_changes());
        db.cancel()?;
        assert!(!db.has_pending_changes());
        assert_eq!(db.doc_count(), 1);
        assert_eq!(db.document(1)?.data(), b"a");
        assert!(db.document(2).is_err());
        Ok(())
    }

    #[test]
    fn test_transactions() -> Result<()> {
        let mut db = WritableDatabase::inmemory()?;
        db.begin_transaction(false)?;
        assert!(db.begin_transaction(false).is_err());
        assert!(db.commit().is_err());
        db.add_document(&doc("x"))?;
        db.cancel_transaction()?;
        assert_eq!(db.doc_count(), 0);

        db.begin_transaction(true)?;
        db.add_document(&doc("y"))?;
        db.commit_transaction()?;
        assert!(!db.has_pending_changes());
        assert_eq!(db.generation(), 2);
        assert!(db.commit_transaction().is_err());
        Ok(())
    }

    #[test]
    fn test_by_term_operations() -> Result<()> {
        let mut db = WritableDatabase::inmemory()?;
        let mut first = doc("a");
        first.add_boolean_term("Qkey")?;
        db.add_document(&first)?;
        db.add_document(&first)?;
        db.add_document(&doc("b"))?;

        let replaced = db.replace_document_by_term("Qkey", &doc("c"))?;
        assert_eq!(replaced, 1);
        assert_eq!(db.doc_count(), 2);
        assert_eq!(db.term_freq("Qkey"), 0);

        assert_eq!(db.replace_document_by_term("Qmissing", &doc("d"))?, 4);
        assert_eq!(db.delete_documents_by_term("b")?, 1);
        assert_eq!(db.delete_documents_by_term("b")?, 0);
        assert_eq!(db.doc_count(), 2);
        Ok(())
    }

    #[test]
    fn test_auto_commit_at_threshold() -> Result<()> {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::default());
        let config = DatabaseConfig::new(OpenMode::CreateOrOpen).with_flush_threshold(2);
        let mut db = WritableDatabase::open_storage(storage.clone(), config)?;
        db.add_document(&doc("a"))?;
        assert_eq!(db.generation(), 1);
        db.add_document(&doc("b"))?;
        assert_eq!(db.generation(), 2);
        assert!(!db.has_pending_changes());
        Ok(())
    }

    #[test]
    fn test_old_generations_are_removed() -> Result<()> {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::default());
        let mut db = WritableDatabase::open_storage(storage.clone(), DatabaseConfig::default())?;
        for word in ["a", "b", "c"] {
            db.add_document(&doc(word))?;
            db.commit()?;
        }
        let mut generations: Vec<u64> = storage
            .list_files()?
            .iter()
            .filter_map(|name| parse_generation_file_name(name).map(|(g, _)| g))
            .collect();
        generations.sort_unstable();
        generations.dedup();
        assert_eq!(generations, vec![3, 4]);
        Ok(())
    }

    #[test]
    fn test_reader_sees_pending_state() -> Result<()> {
        let mut db = WritableDatabase::inmemory()?;
        db.add_document(&doc("pending"))?;
        db.set_metadata("k", "v")?;
        let reader = db.reader();
        assert_eq!(reader.doc_count(), 1);
        assert_eq!(reader.metadata("k")?, "v");
        Ok(())
    }
}
