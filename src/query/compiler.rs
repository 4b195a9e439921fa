//! Turns a [`Query`] into a tree of [`Matcher`]s over one reader.

use ahash::AHashMap;

use crate::database::IndexReader;
use crate::document::DocId;
use crate::enquire::RSet;
use crate::error::{Result, TesseraError};
use crate::query::matcher::boolean::{
    AndMatcher, AndMaybeMatcher, AndNotMatcher, OrMatcher, SynonymMatcher, XorMatcher,
};
use crate::query::matcher::positional::{PositionalMatcher, PositionalOp};
use crate::query::matcher::{EmptyMatcher, ListMatcher, Matcher, TermMatcher};
use crate::query::{Op, Query, QueryNode};
use crate::weight::{TermStats, WeightingScheme};

/// Check the restrictions that can only be enforced on a complete tree.
///
/// Children of `NEAR` and `PHRASE` must be terms, or `OR`s of terms.
pub(crate) fn validate(query: &Query) -> Result<()> {
    let Some(QueryNode::Branch { op, subqueries, .. }) = query.node() else {
        if let Some(QueryNode::ScaleWeight { subquery, .. }) = query.node() {
            return validate(subquery);
        }
        return Ok(());
    };
    if op.is_positional() {
        for sub in subqueries {
            if !is_positional_operand(sub) {
                return Err(TesseraError::invalid_argument(format!(
                    "{op} only supports terms and OR of terms as subqueries, got {sub}"
                )));
            }
        }
    }
    subqueries.iter().try_for_each(validate)
}

fn is_positional_operand(query: &Query) -> bool {
    match query.node() {
        None => true,
        Some(QueryNode::Term { term, .. }) => !term.is_empty(),
        Some(QueryNode::Branch {
            op: Op::Or,
            subqueries,
            ..
        }) => subqueries.iter().all(is_positional_operand),
        _ => false,
    }
}

/// A compiled query, ready to run.
#[derive(Debug)]
pub(crate) struct Plan {
    pub(crate) matcher: Box<dyn Matcher>,
    /// Leaves that contribute weight, used for percentage scaling.
    pub(crate) weighted_leaves: usize,
    /// Upper bound on each weighted term's contribution.
    pub(crate) term_weights: AHashMap<String, f64>,
}

pub(crate) struct Compiler<'a> {
    reader: &'a dyn IndexReader,
    scheme: &'a dyn WeightingScheme,
    rset: &'a RSet,
    collection_size: u64,
    average_length: f64,
    positional: bool,
    weighted_leaves: usize,
    term_weights: AHashMap<String, f64>,
}

impl<'a> Compiler<'a> {
    pub(crate) fn new(
        reader: &'a dyn IndexReader,
        scheme: &'a dyn WeightingScheme,
        rset: &'a RSet,
    ) -> Self {
        Compiler {
            reader,
            scheme,
            rset,
            collection_size: reader.doc_count(),
            average_length: reader.avg_length(),
            positional: reader.has_positions(),
            weighted_leaves: 0,
            term_weights: AHashMap::new(),
        }
    }

    pub(crate) fn compile(mut self, query: &Query) -> Result<Plan> {
        let matcher = self.build(query, 1.0)?;
        log::debug!(
            "compiled {query} into a plan with {} weighted leaves",
            self.weighted_leaves
        );
        Ok(Plan {
            matcher,
            weighted_leaves: self.weighted_leaves,
            term_weights: self.term_weights,
        })
    }

    fn build(&mut self, query: &Query, factor: f64) -> Result<Box<dyn Matcher>> {
        let Some(node) = query.node() else {
            return Ok(Box::new(EmptyMatcher));
        };
        match node {
            QueryNode::Term { term, .. } if term.is_empty() => {
                Ok(Box::new(ListMatcher::new(self.reader.doc_ids().collect())))
            }
            QueryNode::Term { term, wqf, .. } => self.build_term(term, *wqf, factor),
            QueryNode::Branch {
                op,
                subqueries,
                parameter,
            } => self.build_branch(query, *op, subqueries, *parameter, factor),
            QueryNode::ScaleWeight {
                factor: scale,
                subquery,
            } => self.build(subquery, factor * scale),
            QueryNode::ValueRange { slot, begin, end } => Ok(self.value_filter(*slot, |v| {
                v >= begin.as_slice() && v <= end.as_slice()
            })),
            QueryNode::ValueGe { slot, limit } => {
                Ok(self.value_filter(*slot, |v| v >= limit.as_slice()))
            }
            QueryNode::ValueLe { slot, limit } => {
                Ok(self.value_filter(*slot, |v| v <= limit.as_slice()))
            }
        }
    }

    fn build_term(&mut self, term: &str, wqf: u32, factor: f64) -> Result<Box<dyn Matcher>> {
        let postings = self.reader.postings(term)?;
        if factor == 0.0 {
            return Ok(Box::new(TermMatcher::new(postings, None)));
        }
        let stats = TermStats {
            rset_size: self.rset.len() as u64,
            rel_term_freq: self.rel_term_freq(term)?,
            wqf,
            wdf_upper_bound: postings.max_wdf(),
            factor,
            ..TermStats::new(self.collection_size, self.average_length, postings.term_freq())
        };
        let weight = self.scheme.term_weight(&stats);
        self.note_weighted(term, weight.max_part());
        Ok(Box::new(TermMatcher::new(postings, Some(weight))))
    }

    fn note_weighted(&mut self, term: &str, max_part: f64) {
        self.weighted_leaves += 1;
        let entry = self.term_weights.entry(term.to_string()).or_insert(0.0);
        *entry = entry.max(max_part);
    }

    fn rel_term_freq(&self, term: &str) -> Result<u64> {
        if self.rset.is_empty() {
            return Ok(0);
        }
        let mut postings = self.reader.postings(term)?;
        let mut count = 0;
        for doc_id in self.rset.iter() {
            if postings.skip_to(doc_id)
                && postings.current().is_some_and(|p| p.doc_id == doc_id)
            {
                count += 1;
            }
        }
        Ok(count)
    }

    fn build_all(&mut self, subqueries: &[Query], factor: f64) -> Result<Vec<Box<dyn Matcher>>> {
        subqueries.iter().map(|q| self.build(q, factor)).collect()
    }

    /// `OR` of `subqueries`, or the single child itself.
    fn build_union(&mut self, subqueries: &[Query], factor: f64) -> Result<Box<dyn Matcher>> {
        let mut children = self.build_all(subqueries, factor)?;
        if children.len() == 1 {
            return Ok(children.remove(0));
        }
        Ok(Box::new(OrMatcher::new(children)))
    }

    fn build_branch(
        &mut self,
        query: &Query,
        op: Op,
        subqueries: &[Query],
        parameter: u32,
        factor: f64,
    ) -> Result<Box<dyn Matcher>> {
        let matcher: Box<dyn Matcher> = match op {
            Op::And => Box::new(AndMatcher::new(self.build_all(subqueries, factor)?)),
            Op::Or => Box::new(OrMatcher::new(self.build_all(subqueries, factor)?)),
            Op::EliteSet => Box::new(OrMatcher::elite_set(
                self.build_all(subqueries, factor)?,
                parameter as usize,
            )),
            Op::Xor => Box::new(XorMatcher::new(self.build_all(subqueries, factor)?)),
            Op::Filter => {
                let mut children = vec![self.build(&subqueries[0], factor)?];
                children.extend(self.build_all(&subqueries[1..], 0.0)?);
                Box::new(AndMatcher::filter(children))
            }
            Op::AndNot => {
                let left = self.build(&subqueries[0], factor)?;
                let right = self.build_union(&subqueries[1..], 0.0)?;
                Box::new(AndNotMatcher::new(left, right))
            }
            Op::AndMaybe => {
                let left = self.build(&subqueries[0], factor)?;
                let right = self.build_union(&subqueries[1..], factor)?;
                Box::new(AndMaybeMatcher::new(left, right))
            }
            Op::Phrase | Op::Near => {
                let inner = AndMatcher::new(self.build_all(subqueries, factor)?);
                if !self.positional {
                    // Nothing has positions, so only the conjunction can be checked.
                    Box::new(inner)
                } else {
                    let op = if op == Op::Phrase {
                        PositionalOp::Phrase
                    } else {
                        PositionalOp::Near
                    };
                    Box::new(PositionalMatcher::new(inner, op, parameter))
                }
            }
            Op::Synonym => self.build_synonym(query, subqueries, factor)?,
        };
        Ok(matcher)
    }

    /// All children are treated as one term whose wdf is the sum of theirs.
    fn build_synonym(
        &mut self,
        query: &Query,
        subqueries: &[Query],
        factor: f64,
    ) -> Result<Box<dyn Matcher>> {
        let inner = OrMatcher::new(self.build_all(subqueries, 0.0)?);
        if factor == 0.0 {
            return Ok(Box::new(SynonymMatcher::new(inner, None)));
        }
        let estimate = inner.estimate(self.collection_size);
        let stats = TermStats {
            wqf: query.length().max(1),
            wdf_upper_bound: inner.wdf_upper_bound(),
            factor,
            ..TermStats::new(self.collection_size, self.average_length, estimate.est)
        };
        let weight = self.scheme.term_weight(&stats);
        self.note_weighted(&query.description(), weight.max_part());
        Ok(Box::new(SynonymMatcher::new(inner, Some(weight))))
    }

    fn value_filter(&self, slot: u32, accept: impl Fn(&[u8]) -> bool) -> Box<dyn Matcher> {
        let mut ids: Vec<DocId> = self
            .reader
            .value_entries(slot)
            .filter(|(_, value)| accept(value))
            .map(|(doc_id, _)| doc_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Box::new(ListMatcher::new(ids))
    }
}
