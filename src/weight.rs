//! Weighting schemes.
//!
//! A [`WeightingScheme`] turns the statistics of one query term into a
//! [`TermWeight`], which then scores every document the term matches. The
//! match engine sums the per-term parts and adds the scheme's per-document
//! [`extra`](WeightingScheme::extra) to get a document's weight.

pub mod bm25;
pub mod tfidf;

use std::fmt::Debug;

pub use self::bm25::BM25Weight;
pub use self::tfidf::TfIdfWeight;

/// Statistics about one weighted query term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermStats {
    /// Documents in the collection.
    pub collection_size: u64,
    /// Average document length.
    pub average_length: f64,
    /// Documents indexed by the term.
    pub term_freq: u64,
    /// Documents in the relevance set.
    pub rset_size: u64,
    /// Relevant documents indexed by the term.
    pub rel_term_freq: u64,
    /// Within-query frequency.
    pub wqf: u32,
    /// Highest wdf the term has in any document.
    pub wdf_upper_bound: u32,
    /// Multiplier from enclosing `SCALE_WEIGHT` operators.
    pub factor: f64,
}

impl TermStats {
    pub fn new(collection_size: u64, average_length: f64, term_freq: u64) -> Self {
        TermStats {
            collection_size,
            average_length,
            term_freq,
            rset_size: 0,
            rel_term_freq: 0,
            wqf: 1,
            wdf_upper_bound: 0,
            factor: 1.0,
        }
    }
}

/// Scores documents for one query term.
pub trait TermWeight: Send + Sync + Debug {
    /// Contribution of a document with `wdf` occurrences and length `doc_len`.
    fn sum_part(&self, wdf: u32, doc_len: u64) -> f64;

    /// Upper bound on [`sum_part`](Self::sum_part).
    fn max_part(&self) -> f64;
}

/// A pluggable ranking function.
pub trait WeightingScheme: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Prepare scoring for one term.
    fn term_weight(&self, stats: &TermStats) -> Box<dyn TermWeight>;

    /// Per-document addition independent of the terms.
    fn extra(&self, _query_length: u32, _doc_len: u64, _average_length: f64) -> f64 {
        0.0
    }

    /// Upper bound on [`extra`](Self::extra).
    fn max_extra(&self, _query_length: u32, _average_length: f64) -> f64 {
        0.0
    }
}

/// Gives every document weight 0, for purely boolean retrieval.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolWeight;

#[derive(Debug)]
struct ZeroWeight;

impl TermWeight for ZeroWeight {
    fn sum_part(&self, _wdf: u32, _doc_len: u64) -> f64 {
        0.0
    }

    fn max_part(&self) -> f64 {
        0.0
    }
}

impl WeightingScheme for BoolWeight {
    fn name(&self) -> &'static str {
        "bool"
    }

    fn term_weight(&self, _stats: &TermStats) -> Box<dyn TermWeight> {
        Box::new(ZeroWeight)
    }
}
