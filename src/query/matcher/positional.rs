//! `PHRASE` and `NEAR`.
//!
//! Both run an [`AndMatcher`] over their children and then check the
//! positions of each candidate. A window of `w` means every chosen position
//! lies within `w` consecutive positions.

use crate::document::{DocId, TermPos};
use crate::error::Result;
use crate::query::matcher::boolean::AndMatcher;
use crate::query::matcher::{Cursor, Estimate, Matcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionalOp {
    /// Children in order.
    Phrase,
    /// Children in any order, at distinct positions.
    Near,
}

#[derive(Debug)]
pub struct PositionalMatcher {
    inner: AndMatcher,
    op: PositionalOp,
    window: u32,
    current: Cursor,
}

impl PositionalMatcher {
    pub fn new(inner: AndMatcher, op: PositionalOp, window: u32) -> Self {
        PositionalMatcher {
            inner,
            op,
            window,
            current: Cursor::Unstarted,
        }
    }

    fn accepts_current(&self) -> bool {
        let lists: Vec<Vec<TermPos>> = self.inner.children().iter().map(|c| c.positions()).collect();
        match self.op {
            PositionalOp::Phrase => phrase_within(&lists, self.window),
            PositionalOp::Near => near_within(&lists, self.window),
        }
    }
}

impl Matcher for PositionalMatcher {
    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        if let Some(answer) = self.current.satisfies(target) {
            return Ok(answer);
        }
        let mut target = target;
        loop {
            if !self.inner.skip_to(target)? {
                self.current = Cursor::Done;
                return Ok(false);
            }
            let Some(doc_id) = self.inner.doc_id() else {
                self.current = Cursor::Done;
                return Ok(false);
            };
            if self.accepts_current() {
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
        self.inner.weight(doc_len)
    }

    fn max_weight(&self) -> f64 {
        self.inner.max_weight()
    }

    fn estimate(&self, collection_size: u64) -> Estimate {
        let and = self.inner.estimate(collection_size);
        Estimate::clamped(0, and.est as f64 / 2.0, and.max)
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

/// Whether one position from each list can be picked in increasing order,
/// spanning fewer than `window` positions.
pub(crate) fn phrase_within(lists: &[Vec<TermPos>], window: u32) -> bool {
    let Some((first, rest)) = lists.split_first() else {
        return false;
    };
    'starts: for &start in first {
        let mut previous = start;
        for list in rest {
            // The earliest usable position keeps the span smallest.
            let i = list.partition_point(|&p| p <= previous);
            match list.get(i) {
                Some(&p) if p - start < window => previous = p,
                _ => continue 'starts,
            }
        }
        return true;
    }
    false
}

/// Whether one distinct position from each list can be picked, in any
/// order, spanning fewer than `window` positions.
pub(crate) fn near_within(lists: &[Vec<TermPos>], window: u32) -> bool {
    if lists.is_empty() || lists.iter().any(Vec::is_empty) {
        return false;
    }
    let mut starts: Vec<TermPos> = lists.iter().flatten().copied().collect();
    starts.sort_unstable();
    starts.dedup();
    starts.into_iter().any(|start| {
        let end = start.saturating_add(window);
        let candidates: Vec<&[TermPos]> = lists
            .iter()
            .map(|list| {
                let lo = list.partition_point(|&p| p < start);
                let hi = list.partition_point(|&p| p < end);
                &list[lo..hi]
            })
            .collect();
        let mut used = Vec::with_capacity(lists.len());
        assign_distinct(&candidates, &mut used)
    })
}

/// Pick a distinct position from each candidate slice, backtracking.
fn assign_distinct(candidates: &[&[TermPos]], used: &mut Vec<TermPos>) -> bool {
    let Some((first, rest)) = candidates.split_first() else {
        return true;
    };
    for &p in *first {
        if used.contains(&p) {
            continue;
        }
        used.push(p);
        if assign_distinct(rest, used) {
            return true;
        }
        used.pop();
    }
    false
}
