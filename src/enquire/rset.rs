use std::collections::BTreeSet;

use crate::document::DocId;

/// A set of documents judged relevant, used for relevance feedback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RSet {
    docs: BTreeSet<DocId>,
}

impl RSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_document(&mut self, doc_id: DocId) {
        self.docs.insert(doc_id);
    }

    pub fn remove_document(&mut self, doc_id: DocId) {
        self.docs.remove(&doc_id);
    }

    pub fn contains(&self, doc_id: DocId) -> bool {
        self.docs.contains(&doc_id)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Documents in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = DocId> + '_ {
        self.docs.iter().copied()
    }
}

impl FromIterator<DocId> for RSet {
    fn from_iter<I: IntoIterator<Item = DocId>>(iter: I) -> Self {
        RSet {
            docs: iter.into_iter().collect(),
        }
    }
}

impl Extend<DocId> for RSet {
    fn extend<I: IntoIterator<Item = DocId>>(&mut self, iter: I) {
        self.docs.extend(iter);
    }
}
