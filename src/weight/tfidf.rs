use crate::weight::{TermStats, TermWeight, WeightingScheme};

/// Plain TF-IDF: `wdf * ln(N / term_freq)`, scaled by wqf.
#[derive(Debug, Clone, Copy, Default)]
pub struct TfIdfWeight;

#[derive(Debug)]
struct TfIdfTermWeight {
    idf: f64,
    wdf_upper_bound: u32,
}

impl TermWeight for TfIdfTermWeight {
    fn sum_part(&self, wdf: u32, _doc_len: u64) -> f64 {
        wdf as f64 * self.idf
    }

    fn max_part(&self) -> f64 {
        self.wdf_upper_bound as f64 * self.idf
    }
}

impl WeightingScheme for TfIdfWeight {
    fn name(&self) -> &'static str {
        "tfidf"
    }

    fn term_weight(&self, stats: &TermStats) -> Box<dyn TermWeight> {
        let idf = if stats.term_freq == 0 {
            0.0
        } else {
            (stats.collection_size as f64 / stats.term_freq as f64).ln()
        };
        Box::new(TfIdfTermWeight {
            idf: idf * stats.wqf as f64 * stats.factor,
            wdf_upper_bound: stats.wdf_upper_bound,
        })
    }
}
