//! Term store: the inverted index.
//!
//! Maps each term to a [`PostingList`] of `(doc id, wdf, positions)`, kept
//! sorted by document id and free of duplicates. Lists are shared behind
//! `Arc`s: cloning a store is cheap and a clone only copies the lists it
//! later modifies, which is how a writer keeps pending changes apart from
//! the committed snapshot readers are using.
//!
//! # Modules
//!
//! - [`posting`]: posting lists and the [`PostingIterator`] cursor
//! - [`dictionary`]: on-disk form (`fst` term dictionary plus postings file)

pub mod dictionary;
pub mod posting;

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use crate::document::{DocId, TermPos};
use crate::error::{Result, TesseraError};

pub use self::posting::{Posting, PostingIterator, PostingList};

/// Mapping of terms to posting lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermStore {
    terms: BTreeMap<String, Arc<PostingList>>,
}

impl TermStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(term: &str, doc_id: DocId) -> Result<()> {
        if term.is_empty() {
            return Err(TesseraError::invalid_argument("empty termnames aren't allowed"));
        }
        if doc_id == 0 {
            return Err(TesseraError::invalid_argument("docid 0 is invalid"));
        }
        Ok(())
    }

    fn list_mut(&mut self, term: &str) -> &mut PostingList {
        let list = self.terms.entry(term.to_string()).or_default();
        Arc::make_mut(list)
    }

    /// Record an occurrence of `term` at `position` in `doc_id`.
    pub fn add_posting(&mut self, term: &str, doc_id: DocId, position: TermPos) -> Result<()> {
        Self::check(term, doc_id)?;
        self.list_mut(term).add(doc_id, 1, Some(position));
        Ok(())
    }

    /// Record `wdf_inc` unpositioned occurrences of `term` in `doc_id`.
    pub fn add_term(&mut self, term: &str, doc_id: DocId, wdf_inc: u32) -> Result<()> {
        Self::check(term, doc_id)?;
        self.list_mut(term).add(doc_id, wdf_inc, None);
        Ok(())
    }

    /// Insert a complete posting, replacing any existing one for the document.
    pub(crate) fn insert_posting(&mut self, term: &str, posting: Posting) {
        let list = self.list_mut(term);
        list.remove(posting.doc_id);
        let Posting {
            doc_id,
            wdf,
            positions,
        } = posting;
        list.add(doc_id, wdf, None);
        for pos in positions {
            list.add(doc_id, 0, Some(pos));
        }
    }

    /// Append a posting with an id above every id already on the list.
    pub(crate) fn push_posting(&mut self, term: &str, posting: Posting) {
        self.list_mut(term).push(posting);
    }

    /// Remove the posting of `term` for `doc_id`.
    pub fn remove_term(&mut self, term: &str, doc_id: DocId) -> Result<()> {
        let missing =
            || TesseraError::not_found(format!("term '{term}' does not index document {doc_id}"));
        let list = self.terms.get_mut(term).ok_or_else(missing)?;
        if list.get(doc_id).is_none() {
            return Err(missing());
        }
        Arc::make_mut(list).remove(doc_id);
        if list.is_empty() {
            self.terms.remove(term);
        }
        Ok(())
    }

    /// Cursor over the postings of `term`; empty if the term is unknown.
    pub fn postings_for(&self, term: &str) -> PostingIterator {
        match self.terms.get(term) {
            Some(list) => PostingIterator::new(list.clone()),
            None => PostingIterator::empty(),
        }
    }

    pub fn posting_list(&self, term: &str) -> Option<&Arc<PostingList>> {
        self.terms.get(term)
    }

    pub fn posting(&self, term: &str, doc_id: DocId) -> Option<&Posting> {
        self.terms.get(term)?.get(doc_id)
    }

    /// Number of documents indexed by `term`.
    pub fn document_frequency(&self, term: &str) -> u64 {
        self.terms.get(term).map_or(0, |l| l.len() as u64)
    }

    /// Total occurrences of `term` across the collection.
    pub fn collection_frequency(&self, term: &str) -> u64 {
        self.terms.get(term).map_or(0, |l| l.collection_frequency())
    }

    pub fn term_exists(&self, term: &str) -> bool {
        self.terms.contains_key(term)
    }

    /// Terms starting with `prefix` with their document frequencies, in
    /// lexicographic order.
    pub fn all_terms<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, u64)> + 'a {
        self.terms
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(term, _)| term.starts_with(prefix))
            .map(|(term, list)| (term.as_str(), list.len() as u64))
    }

    /// Positions of `term` in `doc_id`.
    pub fn positions(&self, term: &str, doc_id: DocId) -> Result<&[TermPos]> {
        self.posting(term, doc_id)
            .map(|p| p.positions.as_slice())
            .ok_or_else(|| {
                TesseraError::not_found(format!("term '{term}' does not index document {doc_id}"))
            })
    }

    /// Number of distinct terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Whether any posting carries positional information.
    pub fn has_positions(&self) -> bool {
        self.terms
            .values()
            .any(|l| l.postings().iter().any(|p| !p.positions.is_empty()))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &Arc<PostingList>)> {
        self.terms.iter().map(|(t, l)| (t.as_str(), l))
    }
}
