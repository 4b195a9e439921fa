//! Several databases searched as one.
//!
//! Document ids are interleaved: with `n` shards, local id `l` of shard `i`
//! (counting from 0) appears as `(l - 1) * n + i + 1`. Term and value
//! statistics are summed over the shards. Metadata is read from the first
//! shard only.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::database::IndexReader;
use crate::document::{DocId, Document, TermPos, ValueSlot};
use crate::error::{Result, TesseraError};
use crate::term_store::{PostingIterator, PostingList};

/// An [`IndexReader`] over several shards.
#[derive(Debug, Clone)]
pub struct MultiReader {
    shards: Vec<Arc<dyn IndexReader>>,
}

impl MultiReader {
    pub fn new(shards: Vec<Arc<dyn IndexReader>>) -> Self {
        MultiReader { shards }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Combined id of `local` in shard `shard`.
    pub fn combined_id(&self, shard: usize, local: DocId) -> DocId {
        (local - 1) * self.shards.len() as u64 + shard as u64 + 1
    }

    /// Shard index and local id of a combined id.
    pub fn locate(&self, doc_id: DocId) -> Option<(usize, DocId)> {
        let n = self.shards.len() as u64;
        if n == 0 || doc_id == 0 {
            return None;
        }
        Some((((doc_id - 1) % n) as usize, (doc_id - 1) / n + 1))
    }

    fn shard_for(&self, doc_id: DocId) -> Result<(&dyn IndexReader, DocId)> {
        self.locate(doc_id)
            .map(|(shard, local)| (self.shards[shard].as_ref(), local))
            .ok_or_else(|| TesseraError::doc_not_found(doc_id))
    }
}

impl IndexReader for MultiReader {
    fn doc_count(&self) -> u64 {
        self.shards.iter().map(|s| s.doc_count()).sum()
    }

    fn last_doc_id(&self) -> DocId {
        self.shards
            .iter()
            .enumerate()
            .filter(|(_, s)| s.last_doc_id() > 0)
            .map(|(i, s)| self.combined_id(i, s.last_doc_id()))
            .max()
            .unwrap_or(0)
    }

    fn total_length(&self) -> u64 {
        self.shards.iter().map(|s| s.total_length()).sum()
    }

    fn term_freq(&self, term: &str) -> u64 {
        self.shards.iter().map(|s| s.term_freq(term)).sum()
    }

    fn collection_freq(&self, term: &str) -> u64 {
        self.shards.iter().map(|s| s.collection_freq(term)).sum()
    }

    fn postings(&self, term: &str) -> Result<PostingIterator> {
        let mut merged = Vec::new();
        for (i, shard) in self.shards.iter().enumerate() {
            for mut posting in shard.postings(term)? {
                posting.doc_id = self.combined_id(i, posting.doc_id);
                merged.push(posting);
            }
        }
        merged.sort_by_key(|p| p.doc_id);
        let mut list = PostingList::new();
        for posting in merged {
            list.push(posting);
        }
        Ok(PostingIterator::new(Arc::new(list)))
    }

    fn all_terms(&self, prefix: &str) -> Vec<(String, u64)> {
        let mut merged: BTreeMap<String, u64> = BTreeMap::new();
        for shard in &self.shards {
            for (term, freq) in shard.all_terms(prefix) {
                *merged.entry(term).or_default() += freq;
            }
        }
        merged.into_iter().collect()
    }

    fn doc_ids(&self) -> Box<dyn Iterator<Item = DocId> + '_> {
        let mut ids: Vec<DocId> = self
            .shards
            .iter()
            .enumerate()
            .flat_map(|(i, s)| s.doc_ids().map(move |local| self.combined_id(i, local)))
            .collect();
        ids.sort_unstable();
        Box::new(ids.into_iter())
    }

    fn contains(&self, doc_id: DocId) -> bool {
        self.shard_for(doc_id)
            .is_ok_and(|(shard, local)| shard.contains(local))
    }

    fn document(&self, doc_id: DocId) -> Result<Document> {
        let (shard, local) = self.shard_for(doc_id)?;
        shard
            .document(local)
            .map_err(|e| remap_not_found(e, doc_id))
    }

    fn doc_length(&self, doc_id: DocId) -> Result<u64> {
        let (shard, local) = self.shard_for(doc_id)?;
        shard
            .doc_length(local)
            .map_err(|e| remap_not_found(e, doc_id))
    }

    fn termlist(&self, doc_id: DocId) -> Result<Vec<(String, u32)>> {
        let (shard, local) = self.shard_for(doc_id)?;
        shard.termlist(local).map_err(|e| remap_not_found(e, doc_id))
    }

    fn positions(&self, term: &str, doc_id: DocId) -> Result<Vec<TermPos>> {
        let (shard, local) = self.shard_for(doc_id)?;
        shard.positions(term, local)
    }

    fn value(&self, doc_id: DocId, slot: ValueSlot) -> Option<&[u8]> {
        let (shard, local) = self.shard_for(doc_id).ok()?;
        shard.value(local, slot)
    }

    fn value_entries(&self, slot: ValueSlot) -> Box<dyn Iterator<Item = (DocId, &[u8])> + '_> {
        let mut entries: Vec<(DocId, &[u8])> = self
            .shards
            .iter()
            .enumerate()
            .flat_map(|(i, s)| {
                s.value_entries(slot)
                    .map(move |(local, v)| (self.combined_id(i, local), v))
            })
            .collect();
        entries.sort_unstable_by_key(|(id, _)| *id);
        Box::new(entries.into_iter())
    }

    fn value_freq(&self, slot: ValueSlot) -> u64 {
        self.shards.iter().map(|s| s.value_freq(slot)).sum()
    }

    fn value_lower_bound(&self, slot: ValueSlot) -> Vec<u8> {
        self.shards
            .iter()
            .filter(|s| s.value_freq(slot) > 0)
            .map(|s| s.value_lower_bound(slot))
            .min()
            .unwrap_or_default()
    }

    fn value_upper_bound(&self, slot: ValueSlot) -> Vec<u8> {
        self.shards
            .iter()
            .map(|s| s.value_upper_bound(slot))
            .max()
            .unwrap_or_default()
    }

    fn metadata(&self, key: &str) -> Result<String> {
        match self.shards.first() {
            Some(shard) => shard.metadata(key),
            None if key.is_empty() => Err(TesseraError::invalid_argument(
                "empty metadata key is invalid",
            )),
            None => Ok(String::new()),
        }
    }

    fn metadata_keys(&self, prefix: &str) -> Vec<String> {
        self.shards
            .first()
            .map(|s| s.metadata_keys(prefix))
            .unwrap_or_default()
    }

    fn has_positions(&self) -> bool {
        self.shards.iter().any(|s| s.has_positions())
    }
}

fn remap_not_found(err: TesseraError, doc_id: DocId) -> TesseraError {
    match err {
        TesseraError::DocNotFound(_) => TesseraError::doc_not_found(doc_id),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::snapshot::Snapshot;
    use crate::doc_store::DocumentStore;
    use crate::term_store::TermStore;

    fn shard(words: &[&str]) -> Arc<dyn IndexReader> {
        let mut terms = TermStore::new();
        let mut docs = DocumentStore::new();
        for word in words {
            let mut doc = Document::with_data(*word);
            doc.add_term(word, 1).unwrap();
            doc.add_term("common", 1).unwrap();
            docs.put(&mut terms, &doc).unwrap();
        }
        Arc::new(Snapshot::new(1, terms, docs))
    }

    #[test]
    fn test_interleaved_ids() -> Result<()> {
        let multi = MultiReader::new(vec![shard(&["a", "b", "c"]), shard(&["x"])]);
        assert_eq!(multi.doc_count(), 4);
        assert_eq!(multi.doc_ids().collect::<Vec<_>>(), vec![1, 2, 3, 5]);
        assert_eq!(multi.document(2)?.data(), b"x");
        assert_eq!(multi.document(3)?.data(), b"b");
        assert_eq!(multi.last_doc_id(), 5);
        assert!(!multi.contains(4));
        assert_eq!(multi.document(4).unwrap_err().to_string(), "Docid 4 not found");
        Ok(())
    }

    #[test]
    fn test_merged_postings_and_stats() -> Result<()> {
        let multi = MultiReader::new(vec![shard(&["a", "b"]), shard(&["a"])]);
        assert_eq!(multi.term_freq("common"), 3);
        assert_eq!(multi.term_freq("a"), 2);
        let ids: Vec<_> = multi.postings("common")?.map(|p| p.doc_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(
            multi.all_terms(""),
            vec![
                ("a".to_string(), 2),
                ("b".to_string(), 1),
                ("common".to_string(), 3)
            ]
        );
        Ok(())
    }

    #[test]
    fn test_empty_multi() {
        let multi = MultiReader::new(Vec::new());
        assert_eq!(multi.doc_count(), 0);
        assert_eq!(multi.last_doc_id(), 0);
        assert!(multi.document(1).is_err());
        assert_eq!(multi.metadata("k").unwrap(), "");
    }
}
