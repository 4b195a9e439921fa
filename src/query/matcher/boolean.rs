//! Merge-by-id operators.

use crate::document::{DocId, TermPos};
use crate::error::Result;
use crate::query::matcher::{Cursor, Estimate, Matcher, seek};
use crate::weight::TermWeight;

fn sorted_union(lists: impl Iterator<Item = Vec<TermPos>>) -> Vec<TermPos> {
    let mut positions: Vec<TermPos> = lists.flatten().collect();
    positions.sort_unstable();
    positions.dedup();
    positions
}

/// Documents matching every child.
///
/// Only the first `weighted` children contribute weight, which gives
/// `FILTER` when set to 1.
#[derive(Debug)]
pub struct AndMatcher {
    children: Vec<Box<dyn Matcher>>,
    weighted: usize,
    current: Cursor,
}

impl AndMatcher {
    pub fn new(children: Vec<Box<dyn Matcher>>) -> Self {
        let weighted = children.len();
        AndMatcher {
            children,
            weighted,
            current: Cursor::Unstarted,
        }
    }

    pub fn filter(children: Vec<Box<dyn Matcher>>) -> Self {
        AndMatcher {
            children,
            weighted: 1,
            current: Cursor::Unstarted,
        }
    }

    pub(crate) fn children(&self) -> &[Box<dyn Matcher>] {
        &self.children
    }
}

impl Matcher for AndMatcher {
    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        if let Some(answer) = self.current.satisfies(target) {
            return Ok(answer);
        }
        let mut target = target;
        'candidates: loop {
            for child in self.children.iter_mut() {
                match seek(child.as_mut(), target)? {
                    None => {
                        self.current = Cursor::Done;
                        return Ok(false);
                    }
                    Some(doc_id) if doc_id > target => {
                        target = doc_id;
                        continue 'candidates;
                    }
                    Some(_) => {}
                }
            }
            self.current = Cursor::At(target);
            return Ok(true);
        }
    }

    fn doc_id(&self) -> Option<DocId> {
        self.current.doc_id()
    }

    fn weight(&self, doc_len: u64) -> f64 {
        self.children[..self.weighted]
            .iter()
            .map(|c| c.weight(doc_len))
            .sum()
    }

    fn max_weight(&self) -> f64 {
        self.children[..self.weighted]
            .iter()
            .map(|c| c.max_weight())
            .sum()
    }

    fn estimate(&self, collection_size: u64) -> Estimate {
        let estimates: Vec<Estimate> = self
            .children
            .iter()
            .map(|c| c.estimate(collection_size))
            .collect();
        let max = estimates.iter().map(|e| e.max).min().unwrap_or(0);
        let slack = collection_size * (estimates.len() as u64).saturating_sub(1);
        let min = estimates
            .iter()
            .map(|e| e.min)
            .sum::<u64>()
            .saturating_sub(slack);
        let est = if collection_size == 0 {
            0.0
        } else {
            let n = collection_size as f64;
            estimates.iter().fold(n, |acc, e| acc * e.est as f64 / n)
        };
        Estimate::clamped(min, est, max)
    }

    fn wdf(&self) -> u32 {
        self.children.iter().map(|c| c.wdf()).sum()
    }

    fn wdf_upper_bound(&self) -> u32 {
        self.children.iter().map(|c| c.wdf_upper_bound()).sum()
    }

    fn positions(&self) -> Vec<TermPos> {
        sorted_union(self.children.iter().map(|c| c.positions()))
    }
}

/// Documents matching any child.
///
/// With an elite set size, a document's weight is the sum of its best
/// `elite` matching children only.
#[derive(Debug)]
pub struct OrMatcher {
    children: Vec<Box<dyn Matcher>>,
    elite: Option<usize>,
    current: Cursor,
}

impl OrMatcher {
    pub fn new(children: Vec<Box<dyn Matcher>>) -> Self {
        OrMatcher {
            children,
            elite: None,
            current: Cursor::Unstarted,
        }
    }

    pub fn elite_set(children: Vec<Box<dyn Matcher>>, size: usize) -> Self {
        OrMatcher {
            children,
            elite: Some(size),
            current: Cursor::Unstarted,
        }
    }

    fn matching(&self) -> impl Iterator<Item = &Box<dyn Matcher>> {
        let current = self.current.doc_id();
        self.children
            .iter()
            .filter(move |c| current.is_some() && c.doc_id() == current)
    }

    fn top(&self, mut weights: Vec<f64>) -> f64 {
        if let Some(size) = self.elite
            && size < weights.len()
        {
            weights.sort_unstable_by(|a, b| b.total_cmp(a));
            weights.truncate(size);
        }
        weights.iter().sum()
    }
}

impl Matcher for OrMatcher {
    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        if let Some(answer) = self.current.satisfies(target) {
            return Ok(answer);
        }
        let mut lowest: Option<DocId> = None;
        for child in self.children.iter_mut() {
            if let Some(doc_id) = seek(child.as_mut(), target)? {
                lowest = Some(lowest.map_or(doc_id, |l| l.min(doc_id)));
            }
        }
        self.current = lowest.map_or(Cursor::Done, Cursor::At);
        Ok(lowest.is_some())
    }

    fn doc_id(&self) -> Option<DocId> {
        self.current.doc_id()
    }

    fn weight(&self, doc_len: u64) -> f64 {
        self.top(self.matching().map(|c| c.weight(doc_len)).collect())
    }

    fn max_weight(&self) -> f64 {
        self.top(self.children.iter().map(|c| c.max_weight()).collect())
    }

    fn estimate(&self, collection_size: u64) -> Estimate {
        let estimates: Vec<Estimate> = self
            .children
            .iter()
            .map(|c| c.estimate(collection_size))
            .collect();
        let min = estimates.iter().map(|e| e.min).max().unwrap_or(0);
        let max = estimates
            .iter()
            .map(|e| e.max)
            .sum::<u64>()
            .min(collection_size);
        let est = if collection_size == 0 {
            0.0
        } else {
            let n = collection_size as f64;
            let miss = estimates
                .iter()
                .fold(1.0, |acc, e| acc * (1.0 - e.est as f64 / n));
            n * (1.0 - miss)
        };
        Estimate::clamped(min, est, max)
    }

    fn wdf(&self) -> u32 {
        self.matching().map(|c| c.wdf()).sum()
    }

    fn wdf_upper_bound(&self) -> u32 {
        self.children.iter().map(|c| c.wdf_upper_bound()).sum()
    }

    fn positions(&self) -> Vec<TermPos> {
        sorted_union(self.matching().map(|c| c.positions()))
    }
}

/// Documents matching `left` but not `right`.
#[derive(Debug)]
pub struct AndNotMatcher {
    left: Box<dyn Matcher>,
    right: Box<dyn Matcher>,
    current: Cursor,
}

impl AndNotMatcher {
    pub fn new(left: Box<dyn Matcher>, right: Box<dyn Matcher>) -> Self {
        AndNotMatcher {
            left,
            right,
            current: Cursor::Unstarted,
        }
    }
}

impl Matcher for AndNotMatcher {
    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        if let Some(answer) = self.current.satisfies(target) {
            return Ok(answer);
        }
        let mut target = target;
        loop {
            let Some(doc_id) = seek(self.left.as_mut(), target)? else {
                self.current = Cursor::Done;
                return Ok(false);
            };
            if seek(self.right.as_mut(), doc_id)? == Some(doc_id) {
                target = doc_id + 1;
                continue;
            }
            self.current = Cursor::At(doc_id);
            return Ok(true);
        }
    }

    fn doc_id(&self) -> Option<DocId> {
        self.current.doc_id()
    }

    fn weight(&self, doc_len: u64) -> f64 {
        self.left.weight(doc_len)
    }

    fn max_weight(&self) -> f64 {
        self.left.max_weight()
    }

    fn estimate(&self, collection_size: u64) -> Estimate {
        let left = self.left.estimate(collection_size);
        let right = self.right.estimate(collection_size);
        let est = if collection_size == 0 {
            0.0
        } else {
            left.est as f64 * (1.0 - right.est as f64 / collection_size as f64)
        };
        Estimate::clamped(left.min.saturating_sub(right.max), est, left.max)
    }

    fn wdf(&self) -> u32 {
        self.left.wdf()
    }

    fn wdf_upper_bound(&self) -> u32 {
        self.left.wdf_upper_bound()
    }

    fn positions(&self) -> Vec<TermPos> {
        self.left.positions()
    }
}

/// Documents matching `left`; `right` only adds weight where it matches too.
#[derive(Debug)]
pub struct AndMaybeMatcher {
    left: Box<dyn Matcher>,
    right: Box<dyn Matcher>,
    current: Cursor,
}

impl AndMaybeMatcher {
    pub fn new(left: Box<dyn Matcher>, right: Box<dyn Matcher>) -> Self {
        AndMaybeMatcher {
            left,
            right,
            current: Cursor::Unstarted,
        }
    }

    fn right_matches(&self) -> bool {
        self.current.doc_id().is_some() && self.right.doc_id() == self.current.doc_id()
    }
}

impl Matcher for AndMaybeMatcher {
    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        if let Some(answer) = self.current.satisfies(target) {
            return Ok(answer);
        }
        let Some(doc_id) = seek(self.left.as_mut(), target)? else {
            self.current = Cursor::Done;
            return Ok(false);
        };
        seek(self.right.as_mut(), doc_id)?;
        self.current = Cursor::At(doc_id);
        Ok(true)
    }

    fn doc_id(&self) -> Option<DocId> {
        self.current.doc_id()
    }

    fn weight(&self, doc_len: u64) -> f64 {
        let mut weight = self.left.weight(doc_len);
        if self.right_matches() {
            weight += self.right.weight(doc_len);
        }
        weight
    }

    fn max_weight(&self) -> f64 {
        self.left.max_weight() + self.right.max_weight()
    }

    fn estimate(&self, collection_size: u64) -> Estimate {
        self.left.estimate(collection_size)
    }

    fn wdf(&self) -> u32 {
        let mut wdf = self.left.wdf();
        if self.right_matches() {
            wdf += self.right.wdf();
        }
        wdf
    }

    fn wdf_upper_bound(&self) -> u32 {
        self.left.wdf_upper_bound() + self.right.wdf_upper_bound()
    }

    fn positions(&self) -> Vec<TermPos> {
        self.left.positions()
    }
}

/// Documents matching an odd number of children.
#[derive(Debug)]
pub struct XorMatcher {
    children: Vec<Box<dyn Matcher>>,
    current: Cursor,
}

impl XorMatcher {
    pub fn new(children: Vec<Box<dyn Matcher>>) -> Self {
        XorMatcher {
            children,
            current: Cursor::Unstarted,
        }
    }

    fn matching(&self) -> impl Iterator<Item = &Box<dyn Matcher>> {
        let current = self.current.doc_id();
        self.children
            .iter()
            .filter(move |c| current.is_some() && c.doc_id() == current)
    }
}

impl Matcher for XorMatcher {
    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        if let Some(answer) = self.current.satisfies(target) {
            return Ok(answer);
        }
        let mut target = target;
        loop {
            let mut lowest: Option<DocId> = None;
            for child in self.children.iter_mut() {
                if let Some(doc_id) = seek(child.as_mut(), target)? {
                    lowest = Some(lowest.map_or(doc_id, |l| l.min(doc_id)));
                }
            }
            let Some(doc_id) = lowest else {
                self.current = Cursor::Done;
                return Ok(false);
            };
            let count = self
                .children
                .iter()
                .filter(|c| c.doc_id() == Some(doc_id))
                .count();
            if count % 2 == 1 {
                self.current = Cursor::At(doc_id);
                return Ok(true);
            }
            target = doc_id + 1;
        }
    }

    fn doc_id(&self) -> Option<DocId> {
        self.current.doc_id()
    }

    fn weight(&self, doc_len: u64) -> f64 {
        self.matching().map(|c| c.weight(doc_len)).sum()
    }

    fn max_weight(&self) -> f64 {
        self.children.iter().map(|c| c.max_weight()).sum()
    }

    fn estimate(&self, collection_size: u64) -> Estimate {
        let estimates: Vec<Estimate> = self
            .children
            .iter()
            .map(|c| c.estimate(collection_size))
            .collect();
        let max = estimates
            .iter()
            .map(|e| e.max)
            .sum::<u64>()
            .min(collection_size);
        let est = if collection_size == 0 {
            0.0
        } else {
            // Probability a document matches an odd number of children.
            let n = collection_size as f64;
            estimates.iter().fold(0.0, |odd, e| {
                let p = e.est as f64 / n;
                odd * (1.0 - p) + (1.0 - odd) * p
            }) * n
        };
        Estimate::clamped(0, est, max)
    }

    fn wdf(&self) -> u32 {
        self.matching().map(|c| c.wdf()).sum()
    }

    fn wdf_upper_bound(&self) -> u32 {
        self.children.iter().map(|c| c.wdf_upper_bound()).sum()
    }

    fn positions(&self) -> Vec<TermPos> {
        sorted_union(self.matching().map(|c| c.positions()))
    }
}

/// An `OrMatcher` weighted as a single term whose wdf is the sum of the
/// children's.
#[derive(Debug)]
pub struct SynonymMatcher {
    inner: OrMatcher,
    weight: Option<Box<dyn TermWeight>>,
}

impl SynonymMatcher {
    pub fn new(inner: OrMatcher, weight: Option<Box<dyn TermWeight>>) -> Self {
        SynonymMatcher { inner, weight }
    }
}

impl Matcher for SynonymMatcher {
    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        self.inner.skip_to(target)
    }

    fn doc_id(&self) -> Option<DocId> {
        self.inner.doc_id()
    }

    fn weight(&self, doc_len: u64) -> f64 {
        self.weight
            .as_ref()
            .map_or(0.0, |w| w.sum_part(self.inner.wdf(), doc_len))
    }

    fn max_weight(&self) -> f64 {
        self.weight.as_ref().map_or(0.0, |w| w.max_part())
    }

    fn estimate(&self, collection_size: u64) -> Estimate {
        self.inner.estimate(collection_size)
    }

    fn wdf(&self) -> u32 {
        self.inner.wdf()
    }

    fn wdf_upper_bound(&self) -> u32 {
        self.inner.wdf_upper_bound()
    }

    fn positions(&self) -> Vec<TermPos> {
        self.inner.positions()
    }
}
