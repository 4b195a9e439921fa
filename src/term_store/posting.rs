//! Posting lists and the cursor over them.

use std::sync::Arc;

use crate::document::{DocId, TermPos};

/// One document's occurrence of a term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: DocId,
    pub wdf: u32,
    /// Ascending, duplicate-free.
    pub positions: Vec<TermPos>,
}

/// All postings of one term, sorted by document id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingList {
    postings: Vec<Posting>,
    collection_freq: u64,
}

impl PostingList {
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&self, doc_id: DocId) -> std::result::Result<usize, usize> {
        self.postings.binary_search_by_key(&doc_id, |p| p.doc_id)
    }

    pub fn get(&self, doc_id: DocId) -> Option<&Posting> {
        self.find(doc_id).ok().map(|idx| &self.postings[idx])
    }

    /// Add an occurrence. A repeated add for the same document bumps the wdf
    /// and merges the position instead of appending a second posting.
    pub(crate) fn add(&mut self, doc_id: DocId, wdf_inc: u32, position: Option<TermPos>) {
        let idx = match self.find(doc_id) {
            Ok(idx) => idx,
            Err(idx) => {
                self.postings.insert(
                    idx,
                    Posting {
                        doc_id,
                        wdf: 0,
                        positions: Vec::new(),
                    },
                );
                idx
            }
        };
        let posting = &mut self.postings[idx];
        posting.wdf = posting.wdf.saturating_add(wdf_inc);
        self.collection_freq += u64::from(wdf_inc);
        if let Some(pos) = position
            && let Err(at) = posting.positions.binary_search(&pos)
        {
            posting.positions.insert(at, pos);
        }
    }

    /// Append a posting whose id is greater than every id already present.
    pub(crate) fn push(&mut self, posting: Posting) {
        debug_assert!(self.postings.last().is_none_or(|p| p.doc_id < posting.doc_id));
        self.collection_freq += u64::from(posting.wdf);
        self.postings.push(posting);
    }

    pub(crate) fn remove(&mut self, doc_id: DocId) -> Option<Posting> {
        let idx = self.find(doc_id).ok()?;
        let posting = self.postings.remove(idx);
        self.collection_freq -= u64::from(posting.wdf);
        Some(posting)
    }

    /// Term frequency: the number of documents indexed by the term.
    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Sum of wdf over all postings.
    pub fn collection_frequency(&self) -> u64 {
        self.collection_freq
    }

    pub fn postings(&self) -> &[Posting] {
        &self.postings
    }

    pub fn max_wdf(&self) -> u32 {
        self.postings.iter().map(|p| p.wdf).max().unwrap_or(0)
    }
}

/// Forward-only cursor over a posting list.
///
/// The cursor starts before the first posting; call [`advance`](Self::advance)
/// or [`skip_to`](Self::skip_to) to position it. It also implements
/// [`Iterator`], yielding owned postings. To restart, build a new one.
#[derive(Debug, Clone)]
pub struct PostingIterator {
    list: Arc<PostingList>,
    index: Option<usize>,
}

impl PostingIterator {
    pub fn new(list: Arc<PostingList>) -> Self {
        PostingIterator { list, index: None }
    }

    /// An iterator over nothing.
    pub fn empty() -> Self {
        Self::new(Arc::new(PostingList::new()))
    }

    /// Number of postings in the underlying list.
    pub fn term_freq(&self) -> u64 {
        self.list.len() as u64
    }

    pub fn collection_freq(&self) -> u64 {
        self.list.collection_frequency()
    }

    pub fn max_wdf(&self) -> u32 {
        self.list.max_wdf()
    }

    /// Move to the next posting. Returns false once exhausted.
    pub fn advance(&mut self) -> bool {
        let next = self.index.map_or(0, |i| i + 1);
        self.index = Some(next.min(self.list.len()));
        next < self.list.len()
    }

    /// Move to the first posting with id `>= target`. Never moves backwards.
    pub fn skip_to(&mut self, target: DocId) -> bool {
        let start = self.index.unwrap_or(0);
        if let Some(current) = self.current()
            && current.doc_id >= target
        {
            return true;
        }
        let rest = &self.list.postings()[start.min(self.list.len())..];
        let offset = rest.partition_point(|p| p.doc_id < target);
        self.index = Some(start + offset);
        self.current().is_some()
    }

    /// The posting under the cursor.
    pub fn current(&self) -> Option<&Posting> {
        self.index.and_then(|i| self.list.postings().get(i))
    }

    pub fn is_exhausted(&self) -> bool {
        self.index.is_some_and(|i| i >= self.list.len())
    }
}

impl Iterator for PostingIterator {
    type Item = Posting;

    fn next(&mut self) -> Option<Posting> {
        if self.advance() {
            self.current().cloned()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(ids: &[DocId]) -> Arc<PostingList> {
        let mut list = PostingList::new();
        for &id in ids {
            list.add(id, 1, Some(1));
        }
        Arc::new(list)
    }

    #[test]
    fn test_add_keeps_sorted_and_unique() {
        let mut list = PostingList::new();
        list.add(5, 1, Some(3));
        list.add(2, 1, Some(1));
        list.add(5, 1, Some(1));
        list.add(5, 1, Some(3));
        let ids: Vec<_> = list.postings().iter().map(|p| p.doc_id).collect();
        assert_eq!(ids, vec![2, 5]);
        assert_eq!(list.get(5).unwrap().wdf, 3);
        assert_eq!(list.get(5).unwrap().positions, vec![1, 3]);
        assert_eq!(list.collection_frequency(), 4);

        list.remove(5);
        assert_eq!(list.collection_frequency(), 1);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_skip_to() {
        let mut it = PostingIterator::new(list(&[1, 4, 9, 12]));
        assert!(it.current().is_none());
        assert!(it.skip_to(5));
        assert_eq!(it.current().unwrap().doc_id, 9);
        assert!(it.skip_to(2));
        assert_eq!(it.current().unwrap().doc_id, 9);
        assert!(it.advance());
        assert_eq!(it.current().unwrap().doc_id, 12);
        assert!(!it.skip_to(13));
        assert!(it.is_exhausted());
    }

    #[test]
    fn test_iterator_restarts_by_reconstruction() {
        let shared = list(&[3, 7]);
        let first: Vec<_> = PostingIterator::new(shared.clone()).map(|p| p.doc_id).collect();
        let second: Vec<_> = PostingIterator::new(shared).map(|p| p.doc_id).collect();
        assert_eq!(first, vec![3, 7]);
        assert_eq!(first, second);
        assert_eq!(PostingIterator::empty().count(), 0);
    }
}
