use serde::{Deserialize, Serialize};

use crate::weight::{TermStats, TermWeight, WeightingScheme};

/// Okapi BM25.
///
/// Parameters follow the usual naming: `k1` saturates wdf, `k2` adds a
/// per-document length correction, `k3` saturates wqf and `b` controls
/// length normalisation. Normalised lengths are clamped from below at
/// `min_normlen`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BM25Weight {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub b: f64,
    pub min_normlen: f64,
}

impl Default for BM25Weight {
    fn default() -> Self {
        BM25Weight {
            k1: 1.0,
            k2: 0.0,
            k3: 1.0,
            b: 0.5,
            min_normlen: 0.5,
        }
    }
}

impl BM25Weight {
    pub fn new(k1: f64, k2: f64, k3: f64, b: f64, min_normlen: f64) -> Self {
        BM25Weight {
            k1: k1.max(0.0),
            k2: k2.max(0.0),
            k3: k3.max(0.0),
            b: b.clamp(0.0, 1.0),
            min_normlen: min_normlen.max(0.0),
        }
    }

    fn len_factor(&self, average_length: f64) -> f64 {
        if self.k2 == 0.0 && (self.b == 0.0 || self.k1 == 0.0) || average_length == 0.0 {
            0.0
        } else {
            1.0 / average_length
        }
    }
}

#[derive(Debug)]
struct BM25TermWeight {
    params: BM25Weight,
    term_weight: f64,
    len_factor: f64,
    wdf_upper_bound: u32,
}

impl BM25TermWeight {
    fn normlen(&self, doc_len: u64) -> f64 {
        (doc_len as f64 * self.len_factor).max(self.params.min_normlen)
    }
}

impl TermWeight for BM25TermWeight {
    fn sum_part(&self, wdf: u32, doc_len: u64) -> f64 {
        let p = &self.params;
        let wdf = wdf as f64;
        let denom = p.k1 * (self.normlen(doc_len) * p.b + (1.0 - p.b)) + wdf;
        if denom == 0.0 {
            return 0.0;
        }
        self.term_weight * wdf / denom
    }

    fn max_part(&self) -> f64 {
        let p = &self.params;
        let wdf_max = self.wdf_upper_bound as f64;
        let mut denom = p.k1;
        if p.k1 != 0.0 && p.b != 0.0 {
            denom *= self.normlen(self.wdf_upper_bound as u64) * p.b + (1.0 - p.b);
        }
        denom += wdf_max;
        if denom == 0.0 {
            return 0.0;
        }
        self.term_weight * wdf_max / denom
    }
}

impl WeightingScheme for BM25Weight {
    fn name(&self) -> &'static str {
        "bm25"
    }

    fn term_weight(&self, stats: &TermStats) -> Box<dyn TermWeight> {
        let n = stats.collection_size as f64;
        let tf = stats.term_freq as f64;
        let mut tw = if stats.rset_size > 0 {
            let r = stats.rel_term_freq as f64;
            let reldocs_not_indexed = stats.rset_size as f64 - r;
            let q = n - reldocs_not_indexed;
            let nonreldocs_indexed = tf - r;
            ((r + 0.5) * (q - tf + 0.5)) / ((reldocs_not_indexed + 0.5) * (nonreldocs_indexed + 0.5))
        } else {
            (n - tf + 0.5) / (tf + 0.5)
        };
        // Terms indexing most of the collection would otherwise get a
        // negative weight.
        if tw < 2.0 {
            tw = tw * 0.5 + 1.0;
        }
        let mut term_weight = tw.ln() * stats.factor;
        if self.k3 != 0.0 {
            let wqf = stats.wqf as f64;
            term_weight *= (self.k3 + 1.0) * wqf / (self.k3 + wqf);
        }
        term_weight *= self.k1 + 1.0;

        Box::new(BM25TermWeight {
            params: *self,
            term_weight,
            len_factor: self.len_factor(stats.average_length),
            wdf_upper_bound: stats.wdf_upper_bound,
        })
    }

    fn extra(&self, query_length: u32, doc_len: u64, average_length: f64) -> f64 {
        if self.k2 == 0.0 {
            return 0.0;
        }
        let normlen = (doc_len as f64 * self.len_factor(average_length)).max(self.min_normlen);
        2.0 * self.k2 * query_length as f64 / (1.0 + normlen)
    }

    fn max_extra(&self, query_length: u32, _average_length: f64) -> f64 {
        if self.k2 == 0.0 {
            return 0.0;
        }
        2.0 * self.k2 * query_length as f64 / (1.0 + self.min_normlen)
    }
}
