//! The indexed document.
//!
//! A [`Document`] bundles an opaque data payload, a sparse set of value slots
//! and the terms that index it. Documents are plain values: building one does
//! no I/O, and handing it to a
//! [`WritableDatabase`](crate::database::WritableDatabase) copies it into the
//! pending state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};

/// Document identifier. Ids start at 1; 0 is never a valid id.
pub type DocId = u64;

/// Value slot number.
pub type ValueSlot = u32;

/// Term position within a document.
pub type TermPos = u32;

/// A term's occurrence data within one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTerm {
    /// Within-document frequency.
    pub wdf: u32,
    /// Ascending, duplicate-free positions.
    pub positions: Vec<TermPos>,
}

/// A document: payload bytes, value slots and terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    data: Vec<u8>,
    values: BTreeMap<ValueSlot, Vec<u8>>,
    terms: BTreeMap<String, DocumentTerm>,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a document carrying `data`.
    pub fn with_data<D: Into<Vec<u8>>>(data: D) -> Self {
        Document {
            data: data.into(),
            ..Self::default()
        }
    }

    /// The opaque payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Replace the payload. Zero bytes are preserved.
    pub fn set_data<D: Into<Vec<u8>>>(&mut self, data: D) {
        self.data = data.into();
    }

    /// Set the value in `slot`. An empty value clears the slot.
    pub fn add_value<V: Into<Vec<u8>>>(&mut self, slot: ValueSlot, value: V) {
        let value = value.into();
        if value.is_empty() {
            self.values.remove(&slot);
        } else {
            self.values.insert(slot, value);
        }
    }

    /// The value in `slot`, or an empty slice if unset.
    pub fn value(&self, slot: ValueSlot) -> &[u8] {
        self.values.get(&slot).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Clear one slot.
    pub fn remove_value(&mut self, slot: ValueSlot) {
        self.values.remove(&slot);
    }

    /// Clear every slot.
    pub fn clear_values(&mut self) {
        self.values.clear();
    }

    /// Set slots in ascending slot order.
    pub fn values(&self) -> impl Iterator<Item = (ValueSlot, &[u8])> {
        self.values.iter().map(|(slot, v)| (*slot, v.as_slice()))
    }

    pub fn values_count(&self) -> usize {
        self.values.len()
    }

    /// Index `term` at `position`, incrementing its wdf by one.
    pub fn add_posting(&mut self, term: &str, position: TermPos) -> Result<()> {
        self.add_posting_with_wdf(term, position, 1)
    }

    /// Index `term` at `position`, incrementing its wdf by `wdf_inc`.
    ///
    /// Adding a position that is already present only bumps the wdf.
    pub fn add_posting_with_wdf(
        &mut self,
        term: &str,
        position: TermPos,
        wdf_inc: u32,
    ) -> Result<()> {
        let entry = self.entry(term)?;
        entry.wdf = entry.wdf.saturating_add(wdf_inc);
        if let Err(idx) = entry.positions.binary_search(&position) {
            entry.positions.insert(idx, position);
        }
        Ok(())
    }

    /// Index `term` without positional information.
    pub fn add_term(&mut self, term: &str, wdf_inc: u32) -> Result<()> {
        let entry = self.entry(term)?;
        entry.wdf = entry.wdf.saturating_add(wdf_inc);
        Ok(())
    }

    /// Index `term` with wdf 0, so it filters without affecting weights.
    pub fn add_boolean_term(&mut self, term: &str) -> Result<()> {
        self.add_term(term, 0)
    }

    fn entry(&mut self, term: &str) -> Result<&mut DocumentTerm> {
        if term.is_empty() {
            return Err(TesseraError::invalid_argument("empty termnames aren't allowed"));
        }
        Ok(self.terms.entry(term.to_string()).or_default())
    }

    /// Remove one position of `term`, decreasing its wdf by `wdf_dec`.
    pub fn remove_posting(&mut self, term: &str, position: TermPos, wdf_dec: u32) -> Result<()> {
        let entry = self.terms.get_mut(term).ok_or_else(|| {
            TesseraError::not_found(format!("term '{term}' is not in the document"))
        })?;
        let idx = entry.positions.binary_search(&position).map_err(|_| {
            TesseraError::not_found(format!("term '{term}' has no position {position}"))
        })?;
        entry.positions.remove(idx);
        entry.wdf = entry.wdf.saturating_sub(wdf_dec);
        Ok(())
    }

    /// Remove `term` entirely.
    pub fn remove_term(&mut self, term: &str) -> Result<()> {
        self.terms
            .remove(term)
            .map(|_| ())
            .ok_or_else(|| TesseraError::not_found(format!("term '{term}' is not in the document")))
    }

    pub(crate) fn insert_term(&mut self, term: &str, entry: DocumentTerm) {
        self.terms.insert(term.to_string(), entry);
    }

    pub fn clear_terms(&mut self) {
        self.terms.clear();
    }

    /// Number of distinct terms.
    pub fn termlist_count(&self) -> usize {
        self.terms.len()
    }

    /// Terms in lexicographic order.
    pub fn terms(&self) -> impl Iterator<Item = (&str, &DocumentTerm)> {
        self.terms.iter().map(|(t, d)| (t.as_str(), d))
    }

    pub fn term(&self, term: &str) -> Option<&DocumentTerm> {
        self.terms.get(term)
    }

    /// Positions of `term`; `NotFound` if the term is absent.
    pub fn positions(&self, term: &str) -> Result<&[TermPos]> {
        self.terms
            .get(term)
            .map(|t| t.positions.as_slice())
            .ok_or_else(|| TesseraError::not_found(format!("term '{term}' is not in the document")))
    }

    /// Document length: the sum of all wdfs.
    pub fn length(&self) -> u64 {
        self.terms.values().map(|t| u64::from(t.wdf)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_term_increments_wdf() {
        let mut doc = Document::new();
        for (pos, word) in ["is", "there", "anybody", "out", "there"].iter().enumerate() {
            doc.add_posting(word, pos as TermPos + 1).unwrap();
        }
        assert_eq!(doc.termlist_count(), 4);
        let there = doc.term("there").unwrap();
        assert_eq!(there.wdf, 2);
        assert_eq!(there.positions, vec![2, 5]);
        assert_eq!(doc.length(), 5);
    }

    #[test]
    fn test_duplicate_position_only_bumps_wdf() {
        let mut doc = Document::new();
        doc.add_posting("a", 3).unwrap();
        doc.add_posting("a", 3).unwrap();
        let a = doc.term("a").unwrap();
        assert_eq!(a.wdf, 2);
        assert_eq!(a.positions, vec![3]);
    }

    #[test]
    fn test_empty_term_rejected() {
        let mut doc = Document::new();
        assert!(matches!(
            doc.add_term("", 1),
            Err(TesseraError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_values_and_missing_positions() {
        let mut doc = Document::with_data(b"a\0b".to_vec());
        doc.add_value(3, "x");
        doc.add_value(1, "y");
        doc.add_value(2, "");
        assert_eq!(doc.values_count(), 2);
        assert_eq!(doc.value(3), b"x");
        assert_eq!(doc.value(2), b"");
        assert_eq!(doc.values().map(|(s, _)| s).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(doc.data(), b"a\0b");
        assert!(matches!(doc.positions("nope"), Err(TesseraError::NotFound(_))));
    }

    #[test]
    fn test_remove_posting_and_term() {
        let mut doc = Document::new();
        doc.add_posting("a", 1).unwrap();
        doc.add_posting("a", 4).unwrap();
        doc.remove_posting("a", 1, 1).unwrap();
        assert_eq!(doc.term("a").unwrap().positions, vec![4]);
        assert!(doc.remove_posting("a", 9, 1).is_err());
        doc.remove_term("a").unwrap();
        assert!(doc.remove_term("a").is_err());
    }
}
