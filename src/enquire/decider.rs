//! Caller-supplied accept/reject predicates.

use ahash::AHashSet;

use crate::document::{Document, ValueSlot};

/// Decides whether a candidate document may appear in an MSet.
pub trait MatchDecider {
    fn accept(&self, doc: &Document) -> bool;
}

impl<F> MatchDecider for F
where
    F: Fn(&Document) -> bool,
{
    fn accept(&self, doc: &Document) -> bool {
        self(doc)
    }
}

/// Accepts documents by the value stored in one slot.
#[derive(Debug, Clone)]
pub struct ValueSetMatchDecider {
    slot: ValueSlot,
    values: AHashSet<Vec<u8>>,
    inclusive: bool,
}

impl ValueSetMatchDecider {
    /// With `inclusive`, accept documents whose value is in the set;
    /// otherwise accept those whose value is not.
    pub fn new(slot: ValueSlot, inclusive: bool) -> Self {
        ValueSetMatchDecider {
            slot,
            values: AHashSet::new(),
            inclusive,
        }
    }

    pub fn add_value(&mut self, value: impl Into<Vec<u8>>) {
        self.values.insert(value.into());
    }

    pub fn remove_value(&mut self, value: &[u8]) {
        self.values.remove(value);
    }
}

impl MatchDecider for ValueSetMatchDecider {
    fn accept(&self, doc: &Document) -> bool {
        self.values.contains(doc.value(self.slot)) == self.inclusive
    }
}

/// Decides whether a term may appear in an ESet.
pub trait ExpandDecider {
    fn accept(&self, term: &str) -> bool;
}

impl<F> ExpandDecider for F
where
    F: Fn(&str) -> bool,
{
    fn accept(&self, term: &str) -> bool {
        self(term)
    }
}

/// Accepts only terms starting with a prefix.
#[derive(Debug, Clone)]
pub struct PrefixExpandDecider {
    prefix: String,
}

impl PrefixExpandDecider {
    pub fn new(prefix: impl Into<String>) -> Self {
        PrefixExpandDecider {
            prefix: prefix.into(),
        }
    }
}

impl ExpandDecider for PrefixExpandDecider {
    fn accept(&self, term: &str) -> bool {
        term.starts_with(&self.prefix)
    }
}

/// Accepts terms that every wrapped decider accepts.
#[derive(Default)]
pub struct AndExpandDecider<'a> {
    deciders: Vec<&'a dyn ExpandDecider>,
}

impl<'a> AndExpandDecider<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, decider: &'a dyn ExpandDecider) -> Self {
        self.deciders.push(decider);
        self
    }
}

impl ExpandDecider for AndExpandDecider<'_> {
    fn accept(&self, term: &str) -> bool {
        self.deciders.iter().all(|d| d.accept(term))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_set_decider() {
        let mut doc = Document::new();
        doc.add_value(1, "red");
        let mut decider = ValueSetMatchDecider::new(1, true);
        decider.add_value("red");
        assert!(decider.accept(&doc));
        decider.remove_value(b"red");
        assert!(!decider.accept(&doc));

        let mut exclude = ValueSetMatchDecider::new(1, false);
        exclude.add_value("red");
        assert!(!exclude.accept(&doc));
        assert!(exclude.accept(&Document::new()));
    }

    #[test]
    fn test_closure_deciders() {
        let short = |term: &str| term.len() < 4;
        let prefixed = PrefixExpandDecider::new("X");
        let both = AndExpandDecider::new().with(&short).with(&prefixed);
        assert!(both.accept("Xab"));
        assert!(!both.accept("Xabc"));
        assert!(!both.accept("ab"));

        let has_data = |doc: &Document| !doc.data().is_empty();
        assert!(MatchDecider::accept(&has_data, &Document::with_data("x")));
    }
}
