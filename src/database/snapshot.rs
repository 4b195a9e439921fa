//! One loaded generation.

use crate::database::IndexReader;
use crate::database::manifest::Manifest;
use crate::doc_store::{DocumentStore, persist as doc_persist};
use crate::document::{DocId, Document, TermPos, ValueSlot};
use crate::error::{Result, TesseraError};
use crate::storage::Storage;
use crate::term_store::{PostingIterator, TermStore, dictionary};

/// Attempts at loading while a concurrent commit removes old generations.
const LOAD_ATTEMPTS: usize = 3;

/// An immutable database state: a term store and a document store.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    generation: u64,
    terms: TermStore,
    docs: DocumentStore,
    has_positions: bool,
}

impl Snapshot {
    pub fn new(generation: u64, terms: TermStore, docs: DocumentStore) -> Self {
        let has_positions = terms.has_positions();
        Snapshot {
            generation,
            terms,
            docs,
            has_positions,
        }
    }

    /// Load generation `generation` from `storage`.
    pub fn load(storage: &dyn Storage, generation: u64) -> Result<Self> {
        let terms = dictionary::read_generation(storage, generation)?;
        let docs = doc_persist::read_generation(storage, generation)?;
        Ok(Self::new(generation, terms, docs))
    }

    /// Load whatever generation the manifest currently names.
    ///
    /// Returns `None` if there is no manifest. A generation that disappears
    /// between reading the manifest and reading its files (because a writer
    /// committed twice in between) is retried against the new manifest.
    pub fn load_latest(storage: &dyn Storage) -> Result<Option<(Manifest, Snapshot)>> {
        let mut attempt = 0;
        loop {
            let Some(manifest) = Manifest::load(storage)? else {
                return Ok(None);
            };
            match Self::load(storage, manifest.generation) {
                Ok(snapshot) => {
                    if snapshot.doc_count() != manifest.doc_count {
                        return Err(TesseraError::corrupt(format!(
                            "manifest records {} documents but generation {} holds {}",
                            manifest.doc_count,
                            manifest.generation,
                            snapshot.doc_count()
                        )));
                    }
                    return Ok(Some((manifest, snapshot)));
                }
                Err(TesseraError::NotFound(msg)) => {
                    attempt += 1;
                    if attempt >= LOAD_ATTEMPTS {
                        return Err(TesseraError::corrupt(format!(
                            "generation {} is incomplete: {msg}",
                            manifest.generation
                        )));
                    }
                    log::debug!(
                        "generation {} vanished while loading, retrying",
                        manifest.generation
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Write this state's files as generation `generation`.
    pub(crate) fn write(storage: &dyn Storage, generation: u64, terms: &TermStore, docs: &DocumentStore) -> Result<()> {
        dictionary::write_generation(storage, generation, terms)?;
        doc_persist::write_generation(storage, generation, docs)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn terms(&self) -> &TermStore {
        &self.terms
    }

    pub fn docs(&self) -> &DocumentStore {
        &self.docs
    }
}

impl IndexReader for Snapshot {
    fn doc_count(&self) -> u64 {
        self.docs.doc_count()
    }

    fn last_doc_id(&self) -> DocId {
        self.docs.last_doc_id()
    }

    fn total_length(&self) -> u64 {
        self.docs.total_length()
    }

    fn term_freq(&self, term: &str) -> u64 {
        self.terms.document_frequency(term)
    }

    fn collection_freq(&self, term: &str) -> u64 {
        self.terms.collection_frequency(term)
    }

    fn postings(&self, term: &str) -> Result<PostingIterator> {
        Ok(self.terms.postings_for(term))
    }

    fn all_terms(&self, prefix: &str) -> Vec<(String, u64)> {
        self.terms
            .all_terms(prefix)
            .map(|(term, freq)| (term.to_string(), freq))
            .collect()
    }

    fn doc_ids(&self) -> Box<dyn Iterator<Item = DocId> + '_> {
        Box::new(self.docs.doc_ids())
    }

    fn contains(&self, doc_id: DocId) -> bool {
        self.docs.contains(doc_id)
    }

    fn document(&self, doc_id: DocId) -> Result<Document> {
        self.docs.get(&self.terms, doc_id)
    }

    fn doc_length(&self, doc_id: DocId) -> Result<u64> {
        self.docs.doc_length(doc_id)
    }

    fn termlist(&self, doc_id: DocId) -> Result<Vec<(String, u32)>> {
        Ok(self.docs.termlist(doc_id)?.to_vec())
    }

    fn positions(&self, term: &str, doc_id: DocId) -> Result<Vec<TermPos>> {
        Ok(self.terms.positions(term, doc_id)?.to_vec())
    }

    fn value(&self, doc_id: DocId, slot: ValueSlot) -> Option<&[u8]> {
        self.docs.value(doc_id, slot)
    }

    fn value_entries(&self, slot: ValueSlot) -> Box<dyn Iterator<Item = (DocId, &[u8])> + '_> {
        Box::new(self.docs.value_entries(slot))
    }

    fn value_freq(&self, slot: ValueSlot) -> u64 {
        self.docs.value_freq(slot)
    }

    fn value_lower_bound(&self, slot: ValueSlot) -> Vec<u8> {
        self.docs.value_lower_bound(slot)
    }

    fn value_upper_bound(&self, slot: ValueSlot) -> Vec<u8> {
        self.docs.value_upper_bound(slot)
    }

    fn metadata(&self, key: &str) -> Result<String> {
        self.docs.get_metadata(key)
    }

    fn metadata_keys(&self, prefix: &str) -> Vec<String> {
        self.docs.metadata_keys(prefix)
    }

    fn has_positions(&self) -> bool {
        self.has_positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_load_latest_without_manifest() -> Result<()> {
        let storage = MemoryStorage::default();
        assert!(Snapshot::load_latest(&storage)?.is_none());
        Ok(())
    }

    #[test]
    fn test_write_and_load() -> Result<()> {
        let storage = MemoryStorage::default();
        let mut terms = TermStore::new();
        let mut docs = DocumentStore::new();
        let mut doc = Document::with_data("hello");
        doc.add_posting("hello", 1)?;
        docs.put(&mut terms, &doc)?;

        Snapshot::write(&storage, 1, &terms, &docs)?;
        Manifest::new(1, 1, 1).store(&storage)?;

        let (manifest, snapshot) = Snapshot::load_latest(&storage)?.unwrap();
        assert_eq!(manifest.generation, 1);
        assert_eq!(snapshot.doc_count(), 1);
        assert!(snapshot.has_positions());
        assert_eq!(snapshot.document(1)?, doc);
        assert_eq!(snapshot.positions("hello", 1)?, vec![1]);
        Ok(())
    }

    #[test]
    fn test_missing_generation_files_are_corrupt() -> Result<()> {
        let storage = MemoryStorage::default();
        Manifest::new(5, 0, 0).store(&storage)?;
        assert!(matches!(
            Snapshot::load_latest(&storage),
            Err(TesseraError::DatabaseCorrupt(_))
        ));
        Ok(())
    }
}
