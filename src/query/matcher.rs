//! Evaluation plans.
//!
//! A compiled query is a tree of [`Matcher`] cursors that walk matching
//! documents in ascending id order. Leaves read posting lists or
//! precomputed id lists; the operators in [`boolean`] and [`positional`]
//! merge their children by id.
//!
//! Every matcher starts before its first match. [`Matcher::skip_to`] moves to
//! the first match at or after a target id and never moves backwards;
//! [`Matcher::next`] moves past the current match.

pub mod boolean;
pub mod positional;

use std::fmt::Debug;

use crate::document::{DocId, TermPos};
use crate::error::Result;
use crate::term_store::PostingIterator;
use crate::weight::TermWeight;

/// Bounds on how many documents a matcher will produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Estimate {
    pub min: u64,
    pub est: u64,
    pub max: u64,
}

impl Estimate {
    pub fn exact(count: u64) -> Self {
        Estimate {
            min: count,
            est: count,
            max: count,
        }
    }

    /// Build from a floating point guess, keeping `min <= est <= max`.
    pub(crate) fn clamped(min: u64, est: f64, max: u64) -> Self {
        let max = max.max(min);
        let est = (est.round().max(0.0) as u64).clamp(min, max);
        Estimate { min, est, max }
    }
}

/// Position of a composite matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Cursor {
    #[default]
    Unstarted,
    At(DocId),
    Done,
}

impl Cursor {
    pub(crate) fn doc_id(self) -> Option<DocId> {
        match self {
            Cursor::At(doc_id) => Some(doc_id),
            _ => None,
        }
    }

    /// Whether a `skip_to(target)` can be answered without moving.
    pub(crate) fn satisfies(self, target: DocId) -> Option<bool> {
        match self {
            Cursor::At(doc_id) if doc_id >= target => Some(true),
            Cursor::Done => Some(false),
            _ => None,
        }
    }
}

/// A cursor over the documents matching one (sub)query.
pub trait Matcher: Debug {
    /// Move to the first match with id `>= target`. Returns false once
    /// exhausted.
    fn skip_to(&mut self, target: DocId) -> Result<bool>;

    /// Move to the next match.
    fn next(&mut self) -> Result<bool> {
        let target = self.doc_id().map_or(1, |doc_id| doc_id + 1);
        self.skip_to(target)
    }

    /// The current match, if positioned on one.
    fn doc_id(&self) -> Option<DocId>;

    /// Weight of the current match, given its document length.
    fn weight(&self, doc_len: u64) -> f64;

    /// Upper bound on [`weight`](Self::weight).
    fn max_weight(&self) -> f64;

    /// How many documents this matcher produces in a collection of
    /// `collection_size` documents.
    fn estimate(&self, collection_size: u64) -> Estimate;

    /// Occurrences of the matched terms in the current document.
    fn wdf(&self) -> u32;

    /// Upper bound on [`wdf`](Self::wdf).
    fn wdf_upper_bound(&self) -> u32;

    /// Positions of the matched terms in the current document, sorted.
    fn positions(&self) -> Vec<TermPos>;
}

/// Skip `matcher` to `target` and return where it landed.
pub(crate) fn seek(matcher: &mut dyn Matcher, target: DocId) -> Result<Option<DocId>> {
    if matcher.skip_to(target)? {
        Ok(matcher.doc_id())
    } else {
        Ok(None)
    }
}

/// Matches the postings of one term.
#[derive(Debug)]
pub struct TermMatcher {
    postings: PostingIterator,
    weight: Option<Box<dyn TermWeight>>,
}

impl TermMatcher {
    /// A term matcher; without a `weight` it matches with weight 0.
    pub fn new(postings: PostingIterator, weight: Option<Box<dyn TermWeight>>) -> Self {
        TermMatcher { postings, weight }
    }
}

impl Matcher for TermMatcher {
    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        Ok(self.postings.skip_to(target))
    }

    fn next(&mut self) -> Result<bool> {
        Ok(self.postings.advance())
    }

    fn doc_id(&self) -> Option<DocId> {
        self.postings.current().map(|p| p.doc_id)
    }

    fn weight(&self, doc_len: u64) -> f64 {
        match (&self.weight, self.postings.current()) {
            (Some(weight), Some(posting)) => weight.sum_part(posting.wdf, doc_len),
            _ => 0.0,
        }
    }

    fn max_weight(&self) -> f64 {
        self.weight.as_ref().map_or(0.0, |w| w.max_part())
    }

    fn estimate(&self, _collection_size: u64) -> Estimate {
        Estimate::exact(self.postings.term_freq())
    }

    fn wdf(&self) -> u32 {
        self.postings.current().map_or(0, |p| p.wdf)
    }

    fn wdf_upper_bound(&self) -> u32 {
        self.postings.max_wdf()
    }

    fn positions(&self) -> Vec<TermPos> {
        self.postings
            .current()
            .map(|p| p.positions.clone())
            .unwrap_or_default()
    }
}

/// Matches a precomputed ascending list of ids with weight 0.
///
/// Used for `MatchAll` and value restrictions.
#[derive(Debug, Default)]
pub struct ListMatcher {
    ids: Vec<DocId>,
    index: Option<usize>,
}

impl ListMatcher {
    pub fn new(ids: Vec<DocId>) -> Self {
        debug_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        ListMatcher { ids, index: None }
    }
}

impl Matcher for ListMatcher {
    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        let start = self.index.unwrap_or(0).min(self.ids.len());
        if let Some(current) = self.doc_id()
            && current >= target
        {
            return Ok(true);
        }
        let offset = self.ids[start..].partition_point(|&id| id < target);
        self.index = Some(start + offset);
        Ok(self.doc_id().is_some())
    }

    fn doc_id(&self) -> Option<DocId> {
        self.index.and_then(|i| self.ids.get(i).copied())
    }

    fn weight(&self, _doc_len: u64) -> f64 {
        0.0
    }

    fn max_weight(&self) -> f64 {
        0.0
    }

    fn estimate(&self, _collection_size: u64) -> Estimate {
        Estimate::exact(self.ids.len() as u64)
    }

    fn wdf(&self) -> u32 {
        0
    }

    fn wdf_upper_bound(&self) -> u32 {
        0
    }

    fn positions(&self) -> Vec<TermPos> {
        Vec::new()
    }
}

/// Matches nothing.
#[derive(Debug, Default)]
pub struct EmptyMatcher;

impl Matcher for EmptyMatcher {
    fn skip_to(&mut self, _target: DocId) -> Result<bool> {
        Ok(false)
    }

    fn doc_id(&self) -> Option<DocId> {
        None
    }

    fn weight(&self, _doc_len: u64) -> f64 {
        0.0
    }

    fn max_weight(&self) -> f64 {
        0.0
    }

    fn estimate(&self, _collection_size: u64) -> Estimate {
        Estimate::default()
    }

    fn wdf(&self) -> u32 {
        0
    }

    fn wdf_upper_bound(&self) -> u32 {
        0
    }

    fn positions(&self) -> Vec<TermPos> {
        Vec::new()
    }
}

/// Drain `matcher`, collecting matching ids.
#[cfg(test)]
pub(crate) fn collect_ids(matcher: &mut dyn Matcher) -> Result<Vec<DocId>> {
    let mut ids = Vec::new();
    while matcher.next()? {
        if let Some(doc_id) = matcher.doc_id() {
            ids.push(doc_id);
        }
    }
    Ok(ids)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use super::*;
    use crate::term_store::PostingList;

    fn unit(list: PostingList) -> Box<dyn Matcher> {
        Box::new(TermMatcher::new(
            PostingIterator::new(Arc::new(list)),
            Some(Box::new(UnitWeight)),
        ))
    }

    /// A term occurring at `(doc, position)` pairs, weighing 1 per match.
    pub(crate) fn term(postings: &[(DocId, TermPos)]) -> Box<dyn Matcher> {
        let mut list = PostingList::new();
        for &(doc_id, pos) in postings {
            list.add(doc_id, 1, Some(pos));
        }
        unit(list)
    }

    /// A term without positions in `ids`, weighing 1 per match.
    pub(crate) fn ids(ids: &[DocId]) -> Box<dyn Matcher> {
        let mut list = PostingList::new();
        for &doc_id in ids {
            list.add(doc_id, 1, None);
        }
        unit(list)
    }

    #[derive(Debug)]
    struct UnitWeight;

    impl TermWeight for UnitWeight {
        fn sum_part(&self, _wdf: u32, _doc_len: u64) -> f64 {
            1.0
        }

        fn max_part(&self) -> f64 {
            1.0
        }
    }
}
