//! The match engine.
//!
//! An [`Enquire`] binds a [`Query`] to a [`Database`] and runs it. Each run
//! compiles the query into a matcher tree, walks every matching document,
//! and passes the candidates through the optional stages of an
//! [`MSetRequest`] in this order:
//!
//! 1. the [`MatchDecider`]
//! 2. the [`MatchSpy`]s
//! 3. collapsing on a value slot
//! 4. the minimum weight
//! 5. the percentage cutoff
//!
//! The survivors are sorted and the requested window is returned as an
//! [`MSet`].

pub mod decider;
pub mod mset;
pub mod rset;
pub mod spy;

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::{AHashMap, AHashSet};

use crate::database::{Database, IndexReader};
use crate::document::{DocId, ValueSlot};
use crate::error::{Result, TesseraError};
use crate::expand::{self, ESet, ESetRequest};
use crate::query::Query;
use crate::query::compiler::{self, Compiler};
use crate::query::matcher::Estimate;
use crate::weight::{BM25Weight, WeightingScheme};

use self::mset::{TermInfo, percent};

pub use self::decider::{
    AndExpandDecider, ExpandDecider, MatchDecider, PrefixExpandDecider, ValueSetMatchDecider,
};
pub use self::mset::{MSet, MSetItem};
pub use self::rset::RSet;
pub use self::spy::{MatchSpy, ValueCountMatchSpy};

/// Lifecycle of an [`Enquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnquireState {
    /// No query set.
    Idle,
    /// A query is set and has not run yet.
    QueryBound,
    /// A match is in progress.
    Executing,
    /// The last match ran to completion or to its deadline.
    Exhausted,
}

/// How matches are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Highest weight first.
    #[default]
    Relevance,
    /// By the bytes in `slot`; documents without a value sort as empty.
    Value { slot: ValueSlot, descending: bool },
    /// By value, then by weight.
    ValueThenRelevance { slot: ValueSlot, descending: bool },
    /// By weight, then by value.
    RelevanceThenValue { slot: ValueSlot, descending: bool },
}

impl SortOrder {
    fn slot(self) -> Option<ValueSlot> {
        match self {
            SortOrder::Relevance => None,
            SortOrder::Value { slot, .. }
            | SortOrder::ValueThenRelevance { slot, .. }
            | SortOrder::RelevanceThenValue { slot, .. } => Some(slot),
        }
    }
}

/// Tie-break between matches that sort equally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocIdOrder {
    #[default]
    Ascending,
    Descending,
    /// Whatever is cheapest, which is currently ascending.
    DontCare,
}

/// Parameters of one match.
pub struct MSetRequest<'a> {
    first: usize,
    max_items: usize,
    collapse: Option<(ValueSlot, usize)>,
    rset: Option<&'a RSet>,
    decider: Option<&'a dyn MatchDecider>,
    min_weight: f64,
    percent_cutoff: u32,
    spies: Vec<&'a mut dyn MatchSpy>,
    time_limit: Option<Duration>,
}

impl<'a> MSetRequest<'a> {
    /// Request up to `max_items` matches starting at rank `first`.
    pub fn new(first: usize, max_items: usize) -> Self {
        MSetRequest {
            first,
            max_items,
            collapse: None,
            rset: None,
            decider: None,
            min_weight: 0.0,
            percent_cutoff: 0,
            spies: Vec::new(),
            time_limit: None,
        }
    }

    /// Keep at most `max` documents for each value in `slot`. Documents
    /// without a value are never collapsed.
    pub fn collapse(mut self, slot: ValueSlot, max: usize) -> Self {
        self.collapse = Some((slot, max.max(1)));
        self
    }

    /// Use `rset` as relevance feedback when weighting.
    pub fn rset(mut self, rset: &'a RSet) -> Self {
        self.rset = Some(rset);
        self
    }

    pub fn decider(mut self, decider: &'a dyn MatchDecider) -> Self {
        self.decider = Some(decider);
        self
    }

    /// Drop matches weighing less than `min_weight`.
    pub fn min_weight(mut self, min_weight: f64) -> Self {
        self.min_weight = min_weight;
        self
    }

    /// Drop matches scoring less than `percent`.
    pub fn percent_cutoff(mut self, percent: u32) -> Self {
        self.percent_cutoff = percent.min(100);
        self
    }

    pub fn spy(mut self, spy: &'a mut dyn MatchSpy) -> Self {
        self.spies.push(spy);
        self
    }

    /// Stop walking candidates once `limit` has passed. Bounds on the match
    /// count widen to cover the unvisited candidates.
    pub fn time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }
}

#[derive(Debug)]
struct Candidate {
    doc_id: DocId,
    weight: f64,
    sort_key: Vec<u8>,
    collapse_key: Vec<u8>,
}

/// Runs queries against a database.
#[derive(Debug)]
pub struct Enquire {
    database: Database,
    query: Option<Query>,
    query_length: u32,
    state: EnquireState,
    scheme: Arc<dyn WeightingScheme>,
    sort: SortOrder,
    docid_order: DocIdOrder,
}

impl Enquire {
    pub fn new(database: &Database) -> Self {
        Enquire {
            database: database.clone(),
            query: None,
            query_length: 0,
            state: EnquireState::Idle,
            scheme: Arc::new(BM25Weight::default()),
            sort: SortOrder::default(),
            docid_order: DocIdOrder::default(),
        }
    }

    pub fn state(&self) -> EnquireState {
        self.state
    }

    pub fn query(&self) -> Option<&Query> {
        self.query.as_ref()
    }

    /// Set the query to run.
    ///
    /// Fails with `InvalidArgument` if `NEAR` or `PHRASE` has a subquery
    /// other than a term or an `OR` of terms; the previous query is kept.
    pub fn set_query(&mut self, query: Query) -> Result<()> {
        compiler::validate(&query)?;
        self.query_length = query.length();
        self.query = Some(query);
        self.state = EnquireState::QueryBound;
        Ok(())
    }

    pub fn set_weighting_scheme<W: WeightingScheme + 'static>(&mut self, scheme: W) {
        self.scheme = Arc::new(scheme);
    }

    pub fn set_sort_by_relevance(&mut self) {
        self.sort = SortOrder::Relevance;
    }

    pub fn set_sort_by_value(&mut self, slot: ValueSlot, descending: bool) {
        self.sort = SortOrder::Value { slot, descending };
    }

    pub fn set_sort_by_value_then_relevance(&mut self, slot: ValueSlot, descending: bool) {
        self.sort = SortOrder::ValueThenRelevance { slot, descending };
    }

    pub fn set_sort_by_relevance_then_value(&mut self, slot: ValueSlot, descending: bool) {
        self.sort = SortOrder::RelevanceThenValue { slot, descending };
    }

    pub fn set_docid_order(&mut self, order: DocIdOrder) {
        self.docid_order = order;
    }

    /// Run the query and return the `[first, first + max_items)` window of
    /// the results.
    pub fn get_mset(&mut self, request: MSetRequest<'_>) -> Result<MSet> {
        let Some(query) = self.query.clone() else {
            return Err(TesseraError::invalid_operation(
                "get_mset called before set_query",
            ));
        };
        self.state = EnquireState::Executing;
        match self.run(&query, request) {
            Ok(mset) => {
                self.state = EnquireState::Exhausted;
                Ok(mset)
            }
            Err(e) => {
                self.state = EnquireState::QueryBound;
                Err(e)
            }
        }
    }

    /// Shorthand for a plain [`get_mset`](Self::get_mset).
    pub fn mset(&mut self, first: usize, max_items: usize) -> Result<MSet> {
        self.get_mset(MSetRequest::new(first, max_items))
    }

    /// Query terms indexing `doc_id`, sorted and without repeats.
    pub fn matching_terms(&self, doc_id: DocId) -> Result<Vec<String>> {
        let Some(query) = &self.query else {
            return Err(TesseraError::invalid_operation(
                "matching_terms called before set_query",
            ));
        };
        matching_terms(self.database.reader(), query, doc_id)
    }

    /// Suggest terms to add to the query, from the documents in the
    /// request's relevance set.
    pub fn get_eset(&self, request: ESetRequest<'_>) -> Result<ESet> {
        let query_terms = self
            .query
            .as_ref()
            .map(Query::unique_terms)
            .unwrap_or_default();
        expand::expand(self.database.reader(), &request, &query_terms)
    }

    fn run(&self, query: &Query, mut request: MSetRequest<'_>) -> Result<MSet> {
        let reader = self.database.reader();
        let no_rset = RSet::new();
        let rset = request.rset.unwrap_or(&no_rset);
        if let Some(missing) = rset.iter().find(|&doc_id| !reader.contains(doc_id)) {
            return Err(TesseraError::doc_not_found(missing));
        }
        let plan = Compiler::new(reader, self.scheme.as_ref(), rset).compile(query)?;
        let mut matcher = plan.matcher;

        let collection_size = reader.doc_count();
        let average_length = reader.avg_length();
        let initial = matcher.estimate(collection_size);
        let max_possible =
            matcher.max_weight() + self.scheme.max_extra(self.query_length, average_length);
        let deadline = request.time_limit.map(|limit| Instant::now() + limit);
        let needs_document = request.decider.is_some() || !request.spies.is_empty();
        let sort_slot = self.sort.slot();
        let collapse_slot = request.collapse.map(|(slot, _)| slot);

        let mut candidates = Vec::new();
        let mut seen = 0u64;
        let mut timed_out = false;
        while matcher.next()? {
            let Some(doc_id) = matcher.doc_id() else {
                break;
            };
            seen += 1;
            let doc_len = reader.doc_length(doc_id)?;
            let weight = matcher.weight(doc_len)
                + self.scheme.extra(self.query_length, doc_len, average_length);
            let mut accepted = true;
            if needs_document {
                let doc = reader.document(doc_id)?;
                if let Some(decider) = request.decider {
                    accepted = decider.accept(&doc);
                }
                if accepted {
                    for spy in request.spies.iter_mut() {
                        spy.observe(&doc, weight);
                    }
                }
            }
            if accepted {
                candidates.push(Candidate {
                    doc_id,
                    weight,
                    sort_key: sort_slot.map_or_else(Vec::new, |s| value(reader, doc_id, s)),
                    collapse_key: collapse_slot.map_or_else(Vec::new, |s| value(reader, doc_id, s)),
                });
            }
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                timed_out = true;
                break;
            }
        }

        candidates.sort_by(|a, b| self.compare(a, b));

        let mut collapse_counts: AHashMap<Vec<u8>, u64> = AHashMap::new();
        if let Some((_, collapse_max)) = request.collapse {
            let mut kept: AHashMap<Vec<u8>, usize> = AHashMap::new();
            candidates.retain(|c| {
                if c.collapse_key.is_empty() {
                    return true;
                }
                let count = kept.entry(c.collapse_key.clone()).or_insert(0);
                if *count < collapse_max {
                    *count += 1;
                    true
                } else {
                    *collapse_counts.entry(c.collapse_key.clone()).or_insert(0) += 1;
                    false
                }
            });
        }

        candidates.retain(|c| c.weight >= request.min_weight);

        let max_attained = candidates.iter().map(|c| c.weight).fold(0.0, f64::max);
        let percent_factor = self.percent_factor(reader, query, &candidates)?;
        if request.percent_cutoff > 0 {
            candidates.retain(|c| percent(c.weight, percent_factor) >= request.percent_cutoff);
        }

        let survivors = candidates.len() as u64;
        let bounds = if timed_out {
            let ratio = survivors as f64 / seen as f64;
            let remaining_max = initial.max.saturating_sub(seen);
            let remaining_est = initial.est.saturating_sub(seen);
            Estimate::clamped(
                survivors,
                survivors as f64 + remaining_est as f64 * ratio,
                survivors + remaining_max,
            )
        } else {
            Estimate::exact(survivors)
        };
        log::debug!(
            "{query} matched {survivors} of {seen} candidates over {} weighted terms{}",
            plan.weighted_leaves,
            if timed_out { " before the deadline" } else { "" }
        );

        let items = candidates
            .into_iter()
            .enumerate()
            .skip(request.first)
            .take(request.max_items)
            .map(|(rank, c)| MSetItem {
                doc_id: c.doc_id,
                rank,
                weight: c.weight,
                percent: percent(c.weight, percent_factor),
                collapse_count: collapse_counts.get(&c.collapse_key).copied().unwrap_or(0),
                collapse_key: c.collapse_key,
            })
            .collect();

        let term_stats = query
            .unique_terms()
            .into_iter()
            .map(|term| {
                let info = TermInfo {
                    term_freq: reader.term_freq(&term),
                    weight: plan.term_weights.get(&term).copied().unwrap_or(0.0),
                };
                (term, info)
            })
            .collect();

        Ok(MSet {
            items,
            first: request.first,
            matches_lower_bound: bounds.min,
            matches_estimated: bounds.est,
            matches_upper_bound: bounds.max,
            max_possible,
            max_attained,
            percent_factor,
            term_stats,
            database: Some(self.database.clone()),
        })
    }

    fn compare(&self, a: &Candidate, b: &Candidate) -> Ordering {
        let by_weight = || b.weight.total_cmp(&a.weight);
        let by_value = |descending: bool| {
            let order = a.sort_key.cmp(&b.sort_key);
            if descending { order.reverse() } else { order }
        };
        let order = match self.sort {
            SortOrder::Relevance => by_weight(),
            SortOrder::Value { descending, .. } => by_value(descending),
            SortOrder::ValueThenRelevance { descending, .. } => {
                by_value(descending).then_with(by_weight)
            }
            SortOrder::RelevanceThenValue { descending, .. } => {
                by_weight().then_with(|| by_value(descending))
            }
        };
        order.then_with(|| match self.docid_order {
            DocIdOrder::Descending => b.doc_id.cmp(&a.doc_id),
            DocIdOrder::Ascending | DocIdOrder::DontCare => a.doc_id.cmp(&b.doc_id),
        })
    }

    /// The factor turning weights into percentages: the best match scores
    /// the fraction of query terms it contains.
    fn percent_factor(
        &self,
        reader: &dyn IndexReader,
        query: &Query,
        candidates: &[Candidate],
    ) -> Result<f64> {
        let best = candidates
            .iter()
            .max_by(|a, b| a.weight.total_cmp(&b.weight));
        let Some(best) = best.filter(|c| c.weight > 0.0) else {
            return Ok(0.0);
        };
        let total = query.unique_terms().len();
        let fraction = if total == 0 {
            1.0
        } else {
            matching_terms(reader, query, best.doc_id)?.len() as f64 / total as f64
        };
        Ok(fraction / best.weight * 100.0)
    }
}

fn value(reader: &dyn IndexReader, doc_id: DocId, slot: ValueSlot) -> Vec<u8> {
    reader
        .value(doc_id, slot)
        .map(<[u8]>::to_vec)
        .unwrap_or_default()
}

fn matching_terms(reader: &dyn IndexReader, query: &Query, doc_id: DocId) -> Result<Vec<String>> {
    let indexed: AHashSet<String> = reader
        .termlist(doc_id)?
        .into_iter()
        .map(|(term, _)| term)
        .collect();
    Ok(query
        .unique_terms()
        .into_iter()
        .filter(|term| indexed.contains(term))
        .collect())
}
