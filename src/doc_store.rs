//! Document store.
//!
//! Holds, per document, the payload and the term list (term and wdf), plus
//! per-slot value streams and the database metadata. Operations that add or
//! remove a document take the [`TermStore`] alongside so that the document
//! and its postings always change together; every check runs before the
//! first mutation, so a failing call leaves both stores untouched.

pub mod persist;

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use crate::document::{DocId, Document, DocumentTerm, ValueSlot};
use crate::error::{Result, TesseraError};
use crate::term_store::{Posting, TermStore};

/// Stored form of a document, minus its values and positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DocRecord {
    pub data: Vec<u8>,
    pub terms: Vec<(String, u32)>,
    pub length: u64,
}

type ValueStream = Arc<BTreeMap<DocId, Vec<u8>>>;

/// Documents, value slots and metadata of one database state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentStore {
    records: BTreeMap<DocId, Arc<DocRecord>>,
    values: BTreeMap<ValueSlot, ValueStream>,
    metadata: BTreeMap<String, String>,
    last_doc_id: DocId,
    total_length: u64,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `doc` under the next unused id.
    pub fn put(&mut self, terms: &mut TermStore, doc: &Document) -> Result<DocId> {
        let doc_id = self
            .last_doc_id
            .checked_add(1)
            .ok_or_else(|| TesseraError::invalid_operation("document ids exhausted"))?;
        self.index(terms, doc_id, doc);
        Ok(doc_id)
    }

    /// Store `doc` under `doc_id`, replacing any document already there.
    ///
    /// Replacing an id that was never used creates it and moves the id
    /// counter past it.
    pub fn replace(&mut self, terms: &mut TermStore, doc_id: DocId, doc: &Document) -> Result<()> {
        if doc_id == 0 {
            return Err(TesseraError::invalid_argument("docid 0 is invalid"));
        }
        if self.records.contains_key(&doc_id) {
            self.check_postings(terms, doc_id)?;
            self.unindex(terms, doc_id);
        }
        self.index(terms, doc_id, doc);
        Ok(())
    }

    /// Delete `doc_id` and all of its postings.
    pub fn delete(&mut self, terms: &mut TermStore, doc_id: DocId) -> Result<()> {
        if !self.records.contains_key(&doc_id) {
            return Err(TesseraError::doc_not_found(doc_id));
        }
        self.check_postings(terms, doc_id)?;
        self.unindex(terms, doc_id);
        Ok(())
    }

    /// Rebuild the full document, including positions.
    pub fn get(&self, terms: &TermStore, doc_id: DocId) -> Result<Document> {
        let record = self.record(doc_id)?;
        let mut doc = Document::with_data(record.data.clone());
        for (slot, stream) in &self.values {
            if let Some(value) = stream.get(&doc_id) {
                doc.add_value(*slot, value.clone());
            }
        }
        for (term, wdf) in &record.terms {
            let positions = terms
                .posting(term, doc_id)
                .map(|p| p.positions.clone())
                .unwrap_or_default();
            doc.insert_term(
                term,
                DocumentTerm {
                    wdf: *wdf,
                    positions,
                },
            );
        }
        Ok(doc)
    }

    fn record(&self, doc_id: DocId) -> Result<&Arc<DocRecord>> {
        self.records
            .get(&doc_id)
            .ok_or_else(|| TesseraError::doc_not_found(doc_id))
    }

    fn check_postings(&self, terms: &TermStore, doc_id: DocId) -> Result<()> {
        let record = self.record(doc_id)?;
        for (term, _) in &record.terms {
            if terms.posting(term, doc_id).is_none() {
                return Err(TesseraError::corrupt(format!(
                    "document {doc_id} lists term '{term}' but has no posting for it"
                )));
            }
        }
        Ok(())
    }

    fn index(&mut self, terms: &mut TermStore, doc_id: DocId, doc: &Document) {
        let mut term_list = Vec::with_capacity(doc.termlist_count());
        for (term, entry) in doc.terms() {
            terms.insert_posting(
                term,
                Posting {
                    doc_id,
                    wdf: entry.wdf,
                    positions: entry.positions.clone(),
                },
            );
            term_list.push((term.to_string(), entry.wdf));
        }
        for (slot, value) in doc.values() {
            Arc::make_mut(self.values.entry(slot).or_default()).insert(doc_id, value.to_vec());
        }
        let length = doc.length();
        self.total_length += length;
        self.last_doc_id = self.last_doc_id.max(doc_id);
        self.records.insert(
            doc_id,
            Arc::new(DocRecord {
                data: doc.data().to_vec(),
                terms: term_list,
                length,
            }),
        );
    }

    fn unindex(&mut self, terms: &mut TermStore, doc_id: DocId) {
        let Some(record) = self.records.remove(&doc_id) else {
            return;
        };
        for (term, _) in &record.terms {
            // Presence was checked by check_postings.
            let _ = terms.remove_term(term, doc_id);
        }
        self.values.retain(|_, stream| {
            if stream.contains_key(&doc_id) {
                Arc::make_mut(stream).remove(&doc_id);
            }
            !stream.is_empty()
        });
        self.total_length -= record.length;
    }

    /// Set (or with an empty value, clear) one value slot of a document.
    pub fn set_value(&mut self, doc_id: DocId, slot: ValueSlot, value: &[u8]) -> Result<()> {
        self.record(doc_id)?;
        if value.is_empty() {
            if let Some(stream) = self.values.get_mut(&slot) {
                Arc::make_mut(stream).remove(&doc_id);
                if stream.is_empty() {
                    self.values.remove(&slot);
                }
            }
        } else {
            Arc::make_mut(self.values.entry(slot).or_default()).insert(doc_id, value.to_vec());
        }
        Ok(())
    }

    pub fn value(&self, doc_id: DocId, slot: ValueSlot) -> Option<&[u8]> {
        self.values
            .get(&slot)?
            .get(&doc_id)
            .map(Vec::as_slice)
    }

    /// Documents with a value in `slot`, ascending by id.
    pub fn value_entries(&self, slot: ValueSlot) -> impl Iterator<Item = (DocId, &[u8])> {
        self.values
            .get(&slot)
            .into_iter()
            .flat_map(|stream| stream.iter().map(|(id, v)| (*id, v.as_slice())))
    }

    /// Number of documents with a value in `slot`.
    pub fn value_freq(&self, slot: ValueSlot) -> u64 {
        self.values.get(&slot).map_or(0, |s| s.len() as u64)
    }

    /// Smallest value in `slot`; empty if the slot is unused.
    pub fn value_lower_bound(&self, slot: ValueSlot) -> Vec<u8> {
        self.value_entries(slot)
            .map(|(_, v)| v)
            .min()
            .map(<[u8]>::to_vec)
            .unwrap_or_default()
    }

    /// Largest value in `slot`; empty if the slot is unused.
    pub fn value_upper_bound(&self, slot: ValueSlot) -> Vec<u8> {
        self.value_entries(slot)
            .map(|(_, v)| v)
            .max()
            .map(<[u8]>::to_vec)
            .unwrap_or_default()
    }

    /// Slots holding at least one value.
    pub fn used_slots(&self) -> impl Iterator<Item = ValueSlot> + '_ {
        self.values.keys().copied()
    }

    /// Metadata value for `key`; unset keys read as an empty string.
    pub fn get_metadata(&self, key: &str) -> Result<String> {
        check_metadata_key(key)?;
        Ok(self.metadata.get(key).cloned().unwrap_or_default())
    }

    /// Set metadata; an empty value removes the key.
    pub fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        check_metadata_key(key)?;
        if value.is_empty() {
            self.metadata.remove(key);
        } else {
            self.metadata.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    /// Metadata keys starting with `prefix`, in lexicographic order.
    pub fn metadata_keys(&self, prefix: &str) -> Vec<String> {
        self.metadata
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub(crate) fn metadata_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.metadata.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn doc_count(&self) -> u64 {
        self.records.len() as u64
    }

    /// Highest id ever assigned (0 for a fresh store).
    pub fn last_doc_id(&self) -> DocId {
        self.last_doc_id
    }

    /// Sum of all document lengths.
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn contains(&self, doc_id: DocId) -> bool {
        self.records.contains_key(&doc_id)
    }

    pub fn doc_length(&self, doc_id: DocId) -> Result<u64> {
        Ok(self.record(doc_id)?.length)
    }

    pub fn data(&self, doc_id: DocId) -> Result<&[u8]> {
        Ok(&self.record(doc_id)?.data)
    }

    /// Terms of a document with their wdfs, in lexicographic order.
    pub fn termlist(&self, doc_id: DocId) -> Result<&[(String, u32)]> {
        Ok(&self.record(doc_id)?.terms)
    }

    /// Live document ids in ascending order.
    pub fn doc_ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.records.keys().copied()
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = (DocId, &DocRecord)> {
        self.records.iter().map(|(id, r)| (*id, r.as_ref()))
    }

    pub(crate) fn value_streams(&self) -> impl Iterator<Item = (ValueSlot, &BTreeMap<DocId, Vec<u8>>)> {
        self.values.iter().map(|(slot, s)| (*slot, s.as_ref()))
    }

    pub(crate) fn restore(
        records: BTreeMap<DocId, Arc<DocRecord>>,
        values: BTreeMap<ValueSlot, ValueStream>,
        metadata: BTreeMap<String, String>,
        last_doc_id: DocId,
    ) -> Self {
        let total_length = records.values().map(|r| r.length).sum();
        DocumentStore {
            records,
            values,
            metadata,
            last_doc_id,
            total_length,
        }
    }
}

fn check_metadata_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(TesseraError::invalid_argument("empty metadata key is invalid"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        let mut doc = Document::with_data(b"is there\0anybody".to_vec());
        for (pos, word) in ["is", "there", "anybody", "out", "there"].iter().enumerate() {
            doc.add_posting(word, pos as u32 + 1).unwrap();
        }
        doc.add_value(0, "v0");
        doc
    }

    #[test]
    fn test_put_get_roundtrip() -> Result<()> {
        let mut terms = TermStore::new();
        let mut docs = DocumentStore::new();
        let doc = sample();
        let id = docs.put(&mut terms, &doc)?;
        assert_eq!(id, 1);
        assert_eq!(docs.get(&terms, id)?, doc);
        assert_eq!(docs.termlist(id)?.len(), 4);
        assert_eq!(docs.total_length(), 5);
        assert_eq!(terms.document_frequency("there"), 1);
        Ok(())
    }

    #[test]
    fn test_delete_removes_postings() -> Result<()> {
        let mut terms = TermStore::new();
        let mut docs = DocumentStore::new();
        let id = docs.put(&mut terms, &sample())?;
        docs.delete(&mut terms, id)?;
        assert!(terms.is_empty());
        assert_eq!(docs.value_freq(0), 0);
        assert_eq!(docs.total_length(), 0);

        let err = docs.get(&terms, id).unwrap_err();
        assert_eq!(err.to_string(), "Docid 1 not found");
        assert!(matches!(
            docs.delete(&mut terms, id),
            Err(TesseraError::DocNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_delete_with_missing_posting_leaves_state_untouched() -> Result<()> {
        let mut terms = TermStore::new();
        let mut docs = DocumentStore::new();
        let id = docs.put(&mut terms, &sample())?;
        terms.remove_term("out", id)?;
        let before = (terms.clone(), docs.clone());

        assert!(matches!(
            docs.delete(&mut terms, id),
            Err(TesseraError::DatabaseCorrupt(_))
        ));
        assert_eq!((terms, docs), before);
        Ok(())
    }

    #[test]
    fn test_replace_creates_and_advances_counter() -> Result<()> {
        let mut terms = TermStore::new();
        let mut docs = DocumentStore::new();
        docs.replace(&mut terms, 10, &sample())?;
        assert_eq!(docs.last_doc_id(), 10);
        assert_eq!(docs.put(&mut terms, &Document::new())?, 11);

        let mut other = Document::with_data("new");
        other.add_term("fresh", 1)?;
        docs.replace(&mut terms, 10, &other)?;
        assert!(!terms.term_exists("there"));
        assert_eq!(terms.document_frequency("fresh"), 1);
        assert_eq!(docs.get(&terms, 10)?.data(), b"new");
        Ok(())
    }

    #[test]
    fn test_values_and_bounds() -> Result<()> {
        let mut terms = TermStore::new();
        let mut docs = DocumentStore::new();
        for value in ["m", "c", "x"] {
            let mut doc = Document::new();
            doc.add_value(2, value);
            docs.put(&mut terms, &doc)?;
        }
        assert_eq!(docs.value_freq(2), 3);
        assert_eq!(docs.value_lower_bound(2), b"c");
        assert_eq!(docs.value_upper_bound(2), b"x");
        assert!(docs.value_lower_bound(9).is_empty());

        docs.set_value(1, 2, b"")?;
        assert_eq!(docs.value_freq(2), 2);
        assert!(docs.set_value(99, 2, b"a").is_err());
        Ok(())
    }

    #[test]
    fn test_metadata() -> Result<()> {
        let mut docs = DocumentStore::new();
        assert_eq!(docs.get_metadata("unset")?, "");
        docs.set_metadata("a:1", "x")?;
        docs.set_metadata("a:2", "y")?;
        docs.set_metadata("b", "z")?;
        assert_eq!(docs.metadata_keys("a:"), vec!["a:1", "a:2"]);
        docs.set_metadata("a:1", "")?;
        assert_eq!(docs.metadata_keys("a"), vec!["a:2"]);
        assert!(matches!(
            docs.set_metadata("", "v"),
            Err(TesseraError::InvalidArgument(_))
        ));
        assert!(docs.get_metadata("").is_err());
        Ok(())
    }
}
