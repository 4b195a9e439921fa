//! Merging databases.
//!
//! The [`Compactor`] reads every document of its sources in turn and writes
//! them to a fresh database, so the result holds a single generation with
//! document ids `1..=n`. Documents keep their relative order: all of the
//! first source, then all of the second, and so on.
//!
//! A failed compaction removes whatever it wrote to a destination that was
//! missing or empty beforehand. An overwritten destination is not restored.

use std::fs;
use std::path::{Path, PathBuf};

use ahash::AHashSet;

use crate::database::{Database, DatabaseConfig, OpenMode, WritableDatabase};
use crate::error::{Result, TesseraError};

/// What a compaction produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompactionStats {
    pub source_count: usize,
    pub doc_count: u64,
    pub term_count: usize,
    pub metadata_count: usize,
}

enum Source {
    Path(PathBuf),
    Database(Database),
}

impl Source {
    fn open(&self) -> Result<Database> {
        match self {
            Source::Path(path) => Database::open(path).map_err(|e| {
                TesseraError::compaction(format!("cannot read source '{}': {e}", path.display()))
            }),
            Source::Database(db) => Ok(db.clone()),
        }
    }
}

/// Builds one database from several.
#[derive(Default)]
pub struct Compactor {
    sources: Vec<Source>,
    destination: Option<PathBuf>,
    overwrite: bool,
}

impl Compactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the database (or stub) at `path` as the next source.
    pub fn add_source<P: AsRef<Path>>(&mut self, path: P) -> &mut Self {
        self.sources.push(Source::Path(path.as_ref().to_path_buf()));
        self
    }

    /// Add an open database as the next source.
    pub fn add_database(&mut self, database: &Database) -> &mut Self {
        self.sources.push(Source::Database(database.clone()));
        self
    }

    pub fn set_destination<P: AsRef<Path>>(&mut self, path: P) -> &mut Self {
        self.destination = Some(path.as_ref().to_path_buf());
        self
    }

    /// Replace an existing database at the destination instead of failing.
    pub fn set_overwrite(&mut self, overwrite: bool) -> &mut Self {
        self.overwrite = overwrite;
        self
    }

    /// Write the merged database.
    ///
    /// When two sources carry the same metadata key, the value from the one
    /// added first is kept.
    pub fn compact(&self) -> Result<CompactionStats> {
        if self.sources.is_empty() {
            return Err(TesseraError::compaction("no sources to compact"));
        }
        let Some(destination) = &self.destination else {
            return Err(TesseraError::compaction("no destination set"));
        };
        self.check_destination(destination)?;

        // Open everything before touching the destination.
        let sources = self
            .sources
            .iter()
            .map(Source::open)
            .collect::<Result<Vec<_>>>()?;

        let fresh = !destination.exists();
        let was_empty = destination.is_dir() && destination.read_dir()?.next().is_none();
        match self.write(&sources, destination) {
            Ok(stats) => {
                log::info!(
                    "compacted {} sources into '{}': {} documents, {} terms",
                    stats.source_count,
                    destination.display(),
                    stats.doc_count,
                    stats.term_count
                );
                Ok(stats)
            }
            Err(e) => {
                if fresh || was_empty {
                    discard(destination, fresh);
                }
                Err(e)
            }
        }
    }

    fn write(&self, sources: &[Database], destination: &Path) -> Result<CompactionStats> {
        let mode = if self.overwrite {
            OpenMode::CreateOrOverwrite
        } else {
            OpenMode::Create
        };
        let config = DatabaseConfig::new(mode)
            .with_flush_threshold(0)
            .with_retained_generations(0);
        let mut output = WritableDatabase::open(destination, config)
            .map_err(|e| TesseraError::compaction(format!("cannot create destination: {e}")))?;

        let mut seen_keys: AHashSet<String> = AHashSet::new();
        for (i, source) in sources.iter().enumerate() {
            let reader = source.reader();
            let first_id = output.last_doc_id() + 1;
            for doc_id in reader.doc_ids() {
                output.add_document(&reader.document(doc_id)?)?;
            }
            for key in reader.metadata_keys("") {
                if seen_keys.contains(&key) {
                    continue;
                }
                output.set_metadata(&key, &reader.metadata(&key)?)?;
                seen_keys.insert(key);
            }
            log::debug!(
                "copied {} documents of source {i} to ids {first_id}..={}",
                reader.doc_count(),
                output.last_doc_id()
            );
        }
        output.commit()?;

        Ok(CompactionStats {
            source_count: sources.len(),
            doc_count: output.doc_count(),
            term_count: output.reader().all_terms("").len(),
            metadata_count: seen_keys.len(),
        })
    }

    fn check_destination(&self, destination: &Path) -> Result<()> {
        let occupied = destination.is_file()
            || (destination.is_dir() && destination.read_dir()?.next().is_some());
        if occupied && !self.overwrite {
            return Err(TesseraError::compaction(format!(
                "destination '{}' already exists",
                destination.display()
            )));
        }
        if let Ok(target) = destination.canonicalize() {
            for source in &self.sources {
                if let Source::Path(path) = source
                    && path.canonicalize().is_ok_and(|p| p == target)
                {
                    return Err(TesseraError::compaction(format!(
                        "destination '{}' is also a source",
                        destination.display()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Remove what a failed compaction left at `destination`. The output handle
/// must already be dropped so its lock is released.
fn discard(destination: &Path, remove_dir: bool) {
    let result = if remove_dir {
        fs::remove_dir_all(destination)
    } else {
        fs::read_dir(destination).and_then(|mut entries| {
            entries.try_for_each(|entry| {
                let path = entry?.path();
                if path.is_dir() {
                    fs::remove_dir_all(path)
                } else {
                    fs::remove_file(path)
                }
            })
        })
    };
    if let Err(e) = result {
        log::warn!(
            "failed to clean up '{}' after compaction error: {e}",
            destination.display()
        );
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use std::sync::Arc;

    use super::*;
    use crate::database::IndexReader;
    use crate::document::{DocId, Document, TermPos, ValueSlot};
    use crate::term_store::PostingIterator;

    fn build(path: &Path, words: &[&str], metadata: &[(&str, &str)]) -> Result<()> {
        let mut db = WritableDatabase::open(path, DatabaseConfig::default())?;
        for word in words {
            let mut doc = Document::with_data(*word);
            doc.add_posting(word, 1)?;
            db.add_document(&doc)?;
        }
        for (key, value) in metadata {
            db.set_metadata(key, value)?;
        }
        db.commit()
    }

    #[test]
    fn test_compact_renumbers_and_merges() -> Result<()> {
        let dir = TempDir::new()?;
        let (a, b, out) = (dir.path().join("a"), dir.path().join("b"), dir.path().join("out"));
        build(&a, &["apple", "banana"], &[("k", "from-a"), ("only-a", "1")])?;
        build(&b, &["banana", "cherry", "date"], &[("k", "from-b")])?;

        let stats = Compactor::new()
            .add_source(&a)
            .add_source(&b)
            .set_destination(&out)
            .compact()?;
        assert_eq!(
            stats,
            CompactionStats {
                source_count: 2,
                doc_count: 5,
                term_count: 4,
                metadata_count: 2,
            }
        );

        let db = Database::open(&out)?;
        assert_eq!(db.last_doc_id(), 5);
        assert_eq!(db.document(3)?.data(), b"banana");
        assert_eq!(db.term_freq("banana"), 2);
        assert_eq!(db.metadata("k")?, "from-a");
        assert_eq!(db.metadata("only-a")?, "1");
        Ok(())
    }

    #[test]
    fn test_compact_errors() -> Result<()> {
        let dir = TempDir::new()?;
        let (a, out) = (dir.path().join("a"), dir.path().join("out"));
        build(&a, &["apple"], &[])?;

        assert!(Compactor::new().set_destination(&out).compact().is_err());
        assert!(Compactor::new().add_source(&a).compact().is_err());

        let missing = Compactor::new()
            .add_source(dir.path().join("missing"))
            .set_destination(&out)
            .compact();
        assert!(matches!(missing, Err(TesseraError::Compaction(_))));

        Compactor::new().add_source(&a).set_destination(&out).compact()?;
        let again = Compactor::new().add_source(&a).set_destination(&out).compact();
        assert!(matches!(again, Err(TesseraError::Compaction(_))));
        Compactor::new()
            .add_source(&a)
            .set_destination(&out)
            .set_overwrite(true)
            .compact()?;

        let onto_source = Compactor::new()
            .add_source(&a)
            .set_destination(&a)
            .set_overwrite(true)
            .compact();
        assert!(matches!(onto_source, Err(TesseraError::Compaction(_))));
        Ok(())
    }

    #[test]
    fn test_compact_skips_deleted_documents() -> Result<()> {
        let dir = TempDir::new()?;
        let out = dir.path().join("out");
        let mut source = WritableDatabase::inmemory()?;
        for word in ["one", "two", "three"] {
            let mut doc = Document::new();
            doc.add_term(word, 1)?;
            source.add_document(&doc)?;
        }
        source.delete_document(2)?;

        let stats = Compactor::new()
            .add_database(&source.reader())
            .set_destination(&out)
            .compact()?;
        assert_eq!(stats.doc_count, 2);
        let db = Database::open(&out)?;
        assert_eq!(db.postings("three")?.next().map(|p| p.doc_id), Some(2));
        Ok(())
    }

    /// Lists its documents but fails to read any of them.
    #[derive(Debug)]
    struct UnreadableDocs(Database);

    impl IndexReader for UnreadableDocs {
        fn doc_count(&self) -> u64 {
            self.0.doc_count()
        }
        fn last_doc_id(&self) -> DocId {
            self.0.last_doc_id()
        }
        fn total_length(&self) -> u64 {
            self.0.reader().total_length()
        }
        fn term_freq(&self, term: &str) -> u64 {
            self.0.term_freq(term)
        }
        fn collection_freq(&self, term: &str) -> u64 {
            self.0.collection_freq(term)
        }
        fn postings(&self, term: &str) -> Result<PostingIterator> {
            self.0.postings(term)
        }
        fn all_terms(&self, prefix: &str) -> Vec<(String, u64)> {
            self.0.all_terms(prefix)
        }
        fn doc_ids(&self) -> Box<dyn Iterator<Item = DocId> + '_> {
            self.0.reader().doc_ids()
        }
        fn contains(&self, doc_id: DocId) -> bool {
            self.0.reader().contains(doc_id)
        }
        fn document(&self, doc_id: DocId) -> Result<Document> {
            Err(TesseraError::corrupt(format!("document {doc_id} is unreadable")))
        }
        fn doc_length(&self, doc_id: DocId) -> Result<u64> {
            self.0.doc_length(doc_id)
        }
        fn termlist(&self, doc_id: DocId) -> Result<Vec<(String, u32)>> {
            self.0.termlist(doc_id)
        }
        fn positions(&self, term: &str, doc_id: DocId) -> Result<Vec<TermPos>> {
            self.0.positions(term, doc_id)
        }
        fn value(&self, doc_id: DocId, slot: ValueSlot) -> Option<&[u8]> {
            self.0.reader().value(doc_id, slot)
        }
        fn value_entries(&self, slot: ValueSlot) -> Box<dyn Iterator<Item = (DocId, &[u8])> + '_> {
            self.0.reader().value_entries(slot)
        }
        fn value_freq(&self, slot: ValueSlot) -> u64 {
            self.0.value_freq(slot)
        }
        fn value_lower_bound(&self, slot: ValueSlot) -> Vec<u8> {
            self.0.value_lower_bound(slot)
        }
        fn value_upper_bound(&self, slot: ValueSlot) -> Vec<u8> {
            self.0.value_upper_bound(slot)
        }
        fn metadata(&self, key: &str) -> Result<String> {
            self.0.metadata(key)
        }
        fn metadata_keys(&self, prefix: &str) -> Vec<String> {
            self.0.metadata_keys(prefix)
        }
        fn has_positions(&self) -> bool {
            self.0.has_positions()
        }
    }

    #[test]
    fn test_failed_compaction_leaves_no_destination() -> Result<()> {
        let dir = TempDir::new()?;
        let (a, out) = (dir.path().join("a"), dir.path().join("out"));
        build(&a, &["apple", "banana"], &[])?;
        let broken = Database::from_reader(Arc::new(UnreadableDocs(Database::open(&a)?)));

        let failed = Compactor::new()
            .add_source(&a)
            .add_database(&broken)
            .set_destination(&out)
            .compact();
        assert!(matches!(failed, Err(TesseraError::DatabaseCorrupt(_))));
        assert!(!out.exists());

        let empty = dir.path().join("empty");
        fs::create_dir(&empty)?;
        let failed = Compactor::new()
            .add_database(&broken)
            .set_destination(&empty)
            .compact();
        assert!(failed.is_err());
        assert!(empty.is_dir());
        assert_eq!(empty.read_dir()?.count(), 0);

        // Retrying without overwrite now succeeds.
        let stats = Compactor::new().add_source(&a).set_destination(&out).compact()?;
        assert_eq!(stats.doc_count, 2);
        Ok(())
    }
}
