//! Match results.

use ahash::AHashMap;

use crate::database::Database;
use crate::document::{DocId, Document};
use crate::error::{Result, TesseraError};

/// One entry of an [`MSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct MSetItem {
    pub doc_id: DocId,
    /// Position in the full ranking, counting from 0.
    pub rank: usize,
    pub weight: f64,
    pub percent: u32,
    /// Documents with the same collapse key that were removed in favour of
    /// this one.
    pub collapse_count: u64,
    /// Empty unless collapsing was requested.
    pub collapse_key: Vec<u8>,
}

/// A window onto the ranked matches of a query.
#[derive(Debug, Clone, Default)]
pub struct MSet {
    pub(crate) items: Vec<MSetItem>,
    pub(crate) first: usize,
    pub(crate) matches_lower_bound: u64,
    pub(crate) matches_estimated: u64,
    pub(crate) matches_upper_bound: u64,
    pub(crate) max_possible: f64,
    pub(crate) max_attained: f64,
    pub(crate) percent_factor: f64,
    pub(crate) term_stats: AHashMap<String, TermInfo>,
    pub(crate) database: Option<Database>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct TermInfo {
    pub(crate) term_freq: u64,
    pub(crate) weight: f64,
}

impl MSet {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[MSetItem] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&MSetItem> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MSetItem> {
        self.items.iter()
    }

    /// Rank of the first item.
    pub fn first(&self) -> usize {
        self.first
    }

    pub fn matches_lower_bound(&self) -> u64 {
        self.matches_lower_bound
    }

    pub fn matches_estimated(&self) -> u64 {
        self.matches_estimated
    }

    pub fn matches_upper_bound(&self) -> u64 {
        self.matches_upper_bound
    }

    /// Upper bound on the weight any document could have had.
    pub fn max_possible(&self) -> f64 {
        self.max_possible
    }

    /// Highest weight of any match, inside the window or not.
    pub fn max_attained(&self) -> f64 {
        self.max_attained
    }

    /// Documents indexed by a query term.
    pub fn term_freq(&self, term: &str) -> u64 {
        self.term_stats.get(term).map_or(0, |info| info.term_freq)
    }

    /// Most a query term could contribute to a document's weight.
    pub fn term_weight(&self, term: &str) -> f64 {
        self.term_stats.get(term).map_or(0.0, |info| info.weight)
    }

    /// Scale a weight to a percentage the way the items were scaled.
    pub fn convert_to_percent(&self, weight: f64) -> u32 {
        percent(weight, self.percent_factor)
    }

    /// Fetch the document of `item` from the database searched.
    pub fn document(&self, item: &MSetItem) -> Result<Document> {
        match &self.database {
            Some(db) => db.document(item.doc_id),
            None => Err(TesseraError::doc_not_found(item.doc_id)),
        }
    }
}

impl<'a> IntoIterator for &'a MSet {
    type Item = &'a MSetItem;
    type IntoIter = std::slice::Iter<'a, MSetItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Scale `weight` by `factor` into `0..=100`.
///
/// A factor of 0 means every match is as good as possible. Positive weights
/// never round down to 0.
pub(crate) fn percent(weight: f64, factor: f64) -> u32 {
    if factor == 0.0 {
        return 100;
    }
    let scaled = (weight * factor + 100.0 * f64::EPSILON) as i64;
    match scaled {
        ..=0 if weight > 0.0 => 1,
        ..=0 => 0,
        101.. => 100,
        p => p as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(percent(3.0, 0.0), 100);
        assert_eq!(percent(2.0, 50.0), 100);
        assert_eq!(percent(1.0, 50.0), 50);
        assert_eq!(percent(0.001, 50.0), 1);
        assert_eq!(percent(0.0, 50.0), 0);
        assert_eq!(percent(3.0, 50.0), 100);
    }

    #[test]
    fn test_empty_mset() {
        let mset = MSet::default();
        assert!(mset.is_empty());
        assert_eq!(mset.matches_estimated(), 0);
        assert_eq!(mset.term_freq("x"), 0);
        let item = MSetItem {
            doc_id: 1,
            rank: 0,
            weight: 0.0,
            percent: 100,
            collapse_count: 0,
            collapse_key: Vec::new(),
        };
        assert!(mset.document(&item).is_err());
    }
}
