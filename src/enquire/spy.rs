//! Observers of match candidates.

use ahash::AHashMap;

use crate::document::{Document, ValueSlot};

/// Sees every candidate that passes the match decider, whether or not it
/// ends up in the MSet.
pub trait MatchSpy {
    fn observe(&mut self, doc: &Document, weight: f64);
}

impl<F> MatchSpy for F
where
    F: FnMut(&Document, f64),
{
    fn observe(&mut self, doc: &Document, weight: f64) {
        self(doc, weight)
    }
}

/// Counts how often each value occurs in a slot.
#[derive(Debug, Clone, Default)]
pub struct ValueCountMatchSpy {
    slot: ValueSlot,
    total: u64,
    counts: AHashMap<Vec<u8>, u64>,
}

impl ValueCountMatchSpy {
    pub fn new(slot: ValueSlot) -> Self {
        ValueCountMatchSpy {
            slot,
            ..Default::default()
        }
    }

    pub fn slot(&self) -> ValueSlot {
        self.slot
    }

    /// Documents observed.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Frequency of `value`.
    pub fn count(&self, value: &[u8]) -> u64 {
        self.counts.get(value).copied().unwrap_or(0)
    }

    /// All observed values with their frequencies, ordered by value.
    pub fn values(&self) -> Vec<(Vec<u8>, u64)> {
        let mut values: Vec<(Vec<u8>, u64)> =
            self.counts.iter().map(|(v, &n)| (v.clone(), n)).collect();
        values.sort_unstable();
        values
    }

    /// The `max` most frequent values; equal frequencies are ordered by value.
    pub fn top_values(&self, max: usize) -> Vec<(Vec<u8>, u64)> {
        let mut values = self.values();
        values.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        values.truncate(max);
        values
    }
}

impl MatchSpy for ValueCountMatchSpy {
    fn observe(&mut self, doc: &Document, _weight: f64) {
        self.total += 1;
        let value = doc.value(self.slot);
        // Documents without a value are counted in the total only.
        if !value.is_empty() {
            *self.counts.entry(value.to_vec()).or_insert(0) += 1;
        }
    }
}
