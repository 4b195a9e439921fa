//! Query expansion from relevance feedback.
//!
//! Terms occurring in the documents of an [`RSet`] are ranked by how
//! concentrated they are in those documents compared with the whole
//! collection. The best of them make good additions to the query.

use std::cmp::Ordering;

use ahash::AHashMap;

use crate::database::IndexReader;
use crate::enquire::{ExpandDecider, RSet};
use crate::error::Result;

/// Saturation constant for the within-RSet frequency.
const EXPAND_K: f64 = 1.0;

/// A candidate expansion term.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandTerm {
    pub term: String,
    pub weight: f64,
}

/// Ranked expansion terms.
#[derive(Debug, Clone, Default)]
pub struct ESet {
    items: Vec<ExpandTerm>,
    ebound: u64,
}

impl ESet {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[ExpandTerm] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&ExpandTerm> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExpandTerm> {
        self.items.iter()
    }

    /// The terms, best first.
    pub fn terms(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.term.as_str()).collect()
    }

    /// Candidate terms that were weighed before truncation.
    pub fn ebound(&self) -> u64 {
        self.ebound
    }
}

impl<'a> IntoIterator for &'a ESet {
    type Item = &'a ExpandTerm;
    type IntoIter = std::slice::Iter<'a, ExpandTerm>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Parameters of an expansion.
pub struct ESetRequest<'a> {
    max_terms: usize,
    rset: &'a RSet,
    decider: Option<&'a dyn ExpandDecider>,
    min_weight: f64,
    include_query_terms: bool,
}

impl<'a> ESetRequest<'a> {
    pub fn new(max_terms: usize, rset: &'a RSet) -> Self {
        ESetRequest {
            max_terms,
            rset,
            decider: None,
            min_weight: 0.0,
            include_query_terms: false,
        }
    }

    /// Only consider terms `decider` accepts.
    pub fn decider(mut self, decider: &'a dyn ExpandDecider) -> Self {
        self.decider = Some(decider);
        self
    }

    /// Drop terms weighing less than `min_weight`.
    pub fn min_weight(mut self, min_weight: f64) -> Self {
        self.min_weight = min_weight;
        self
    }

    /// Allow terms already in the query to be suggested.
    pub fn include_query_terms(mut self, include: bool) -> Self {
        self.include_query_terms = include;
        self
    }
}

#[derive(Debug, Default)]
struct RelevantStats {
    /// Relevant documents containing the term.
    rel_term_freq: u64,
    /// Occurrences of the term in relevant documents.
    rel_collection_freq: u64,
}

/// Rank the terms of `request.rset`, leaving out `query_terms` unless the
/// request includes them.
pub(crate) fn expand(
    reader: &dyn IndexReader,
    request: &ESetRequest<'_>,
    query_terms: &[String],
) -> Result<ESet> {
    let rset = request.rset;
    if rset.is_empty() || request.max_terms == 0 {
        return Ok(ESet::default());
    }

    let mut stats: AHashMap<String, RelevantStats> = AHashMap::new();
    let mut rel_total_length = 0u64;
    for doc_id in rset.iter() {
        rel_total_length += reader.doc_length(doc_id)?;
        for (term, wdf) in reader.termlist(doc_id)? {
            let entry = stats.entry(term).or_default();
            entry.rel_term_freq += 1;
            entry.rel_collection_freq += wdf as u64;
        }
    }

    let collection_size = reader.doc_count() as f64;
    let average_length = reader.avg_length();
    let rset_size = rset.len() as f64;
    let rel_docs_scaled = if average_length > 0.0 {
        rel_total_length as f64 / average_length
    } else {
        0.0
    };

    let mut items = Vec::new();
    let mut ebound = 0u64;
    for (term, rel) in stats {
        if !request.include_query_terms && query_terms.iter().any(|q| *q == term) {
            continue;
        }
        if let Some(decider) = request.decider
            && !decider.accept(&term)
        {
            continue;
        }
        ebound += 1;

        let n = reader.term_freq(&term) as f64;
        let r = rel.rel_term_freq as f64;
        let mut tw = ((r + 0.5) * (collection_size - n - rset_size + r + 0.5))
            / ((rset_size - r + 0.5) * (n - r + 0.5));
        if tw < 2.0 {
            tw = tw * 0.5 + 1.0;
        }
        let f = if rel_docs_scaled > 0.0 {
            rel.rel_collection_freq as f64 / rel_docs_scaled
        } else {
            0.0
        };
        let multiplier = (EXPAND_K + 1.0) * f / (EXPAND_K + f);
        let weight = tw.ln() * multiplier;
        if weight < request.min_weight {
            continue;
        }
        items.push(ExpandTerm { term, weight });
    }

    items.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.term.cmp(&b.term))
    });
    items.truncate(request.max_terms);
    log::debug!(
        "expanded {} relevant documents into {} of {} candidate terms",
        rset.len(),
        items.len(),
        ebound
    );
    Ok(ESet { items, ebound })
}
