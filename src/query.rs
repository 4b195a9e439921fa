//! Query trees.
//!
//! A [`Query`] is an immutable tree built from terms, operators and value
//! restrictions. Building it never touches a database: constructors only
//! simplify the tree (dropping or propagating `MatchNothing`, collapsing
//! single-subquery operators and so on), so equal trees always render the same
//! [`description`](Query::description). The tree is turned into an evaluation
//! plan by [`compiler`] when an [`Enquire`](crate::enquire::Enquire) runs it.

pub mod compiler;
pub mod matcher;

use std::fmt;
use std::sync::Arc;

use crate::document::{TermPos, ValueSlot};
use crate::error::{Result, TesseraError};

/// Default size of an elite set when none is given.
const DEFAULT_ELITE_SET_SIZE: u32 = 10;

/// Operators combining a list of subqueries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Documents matching every subquery.
    And,
    /// Documents matching any subquery.
    Or,
    /// Documents matching the first subquery but none of the others.
    AndNot,
    /// Documents matching an odd number of subqueries.
    Xor,
    /// Documents matching the first subquery; the others only add weight.
    AndMaybe,
    /// Like `And`, but only the first subquery contributes weight.
    Filter,
    /// All subqueries within a window of positions, in any order.
    Near,
    /// All subqueries within a window of positions, in order.
    Phrase,
    /// `Or`, weighting each document by its best few matching subqueries.
    EliteSet,
    /// `Or`, weighted as if all subqueries were one term.
    Synonym,
}

impl Op {
    /// Name used in descriptions.
    pub fn name(self) -> &'static str {
        match self {
            Op::And => "AND",
            Op::Or => "OR",
            Op::AndNot => "AND_NOT",
            Op::Xor => "XOR",
            Op::AndMaybe => "AND_MAYBE",
            Op::Filter => "FILTER",
            Op::Near => "NEAR",
            Op::Phrase => "PHRASE",
            Op::EliteSet => "ELITE_SET",
            Op::Synonym => "SYNONYM",
        }
    }

    /// Whether the operator takes a window or set size parameter.
    pub fn takes_parameter(self) -> bool {
        matches!(self, Op::Near | Op::Phrase | Op::EliteSet)
    }

    /// Whether the operator checks term positions.
    pub fn is_positional(self) -> bool {
        matches!(self, Op::Near | Op::Phrase)
    }

    fn is_and_like(self) -> bool {
        matches!(self, Op::And | Op::Filter | Op::Near | Op::Phrase)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What kind of node is at the root of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    MatchNothing,
    MatchAll,
    Term,
    Op(Op),
    ScaleWeight,
    ValueRange,
    ValueGe,
    ValueLe,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum QueryNode {
    /// A term; the empty term matches all documents.
    Term {
        term: String,
        wqf: u32,
        pos: TermPos,
    },
    Branch {
        op: Op,
        subqueries: Vec<Query>,
        parameter: u32,
    },
    ScaleWeight {
        factor: f64,
        subquery: Query,
    },
    ValueRange {
        slot: ValueSlot,
        begin: Vec<u8>,
        end: Vec<u8>,
    },
    ValueGe {
        slot: ValueSlot,
        limit: Vec<u8>,
    },
    ValueLe {
        slot: ValueSlot,
        limit: Vec<u8>,
    },
}

/// An immutable query tree. The default value is `MatchNothing`.
///
/// Cloning is cheap: subtrees are shared.
#[derive(Clone, Default, PartialEq)]
pub struct Query {
    node: Option<Arc<QueryNode>>,
}

impl Query {
    fn from_node(node: QueryNode) -> Self {
        Query {
            node: Some(Arc::new(node)),
        }
    }

    /// A query matching documents indexed by `term`.
    pub fn term(term: impl Into<String>) -> Self {
        Self::term_with(term, 1, 0)
    }

    /// A term with a within-query frequency and a query position.
    pub fn term_with(term: impl Into<String>, wqf: u32, pos: TermPos) -> Self {
        Self::from_node(QueryNode::Term {
            term: term.into(),
            wqf,
            pos,
        })
    }

    /// A query matching every document, with no weight.
    pub fn match_all() -> Self {
        Self::term("")
    }

    /// A query matching nothing.
    pub fn match_nothing() -> Self {
        Query::default()
    }

    /// Combine `subqueries` with `op`.
    ///
    /// Windowed operators get a window equal to the number of subqueries and
    /// `EliteSet` a set size of 10; use [`with_parameter`](Self::with_parameter)
    /// to choose.
    pub fn new<I>(op: Op, subqueries: I) -> Self
    where
        I: IntoIterator<Item = Query>,
    {
        Self::combine(op, subqueries, 0)
    }

    /// Combine `subqueries` with `op` using a window or set size.
    ///
    /// A parameter of 0 picks the default. Any other parameter is only valid
    /// for `Near`, `Phrase` and `EliteSet`.
    pub fn with_parameter<I>(op: Op, subqueries: I, parameter: u32) -> Result<Self>
    where
        I: IntoIterator<Item = Query>,
    {
        if parameter > 0 && !op.takes_parameter() {
            return Err(TesseraError::invalid_argument(
                "parameter only valid with NEAR, PHRASE or ELITE_SET",
            ));
        }
        Ok(Self::combine(op, subqueries, parameter))
    }

    fn combine<I>(op: Op, subqueries: I, parameter: u32) -> Self
    where
        I: IntoIterator<Item = Query>,
    {
        let mut kept: Vec<Query> = Vec::new();
        let mut nothing = false;
        for (i, sub) in subqueries.into_iter().enumerate() {
            // Positional operators can't match anything without positions.
            let sub = if op.is_positional()
                && matches!(sub.kind(), QueryKind::MatchAll | QueryKind::MatchNothing)
            {
                Query::match_nothing()
            } else {
                sub
            };
            match op {
                _ if op.is_and_like() => {
                    if nothing {
                        continue;
                    }
                    if sub.is_empty() {
                        nothing = true;
                        kept.clear();
                        continue;
                    }
                    kept.push(sub);
                }
                Op::AndNot | Op::AndMaybe => {
                    if i == 0 {
                        nothing = sub.is_empty();
                        kept.push(sub);
                        continue;
                    }
                    if nothing || sub.is_empty() {
                        continue;
                    }
                    // Right-hand sides of AND_NOT carry no weight.
                    if op == Op::AndNot
                        && let Some(QueryNode::ScaleWeight { subquery, .. }) = sub.node()
                    {
                        kept.push(subquery.clone());
                    } else {
                        kept.push(sub);
                    }
                }
                _ => {
                    if !sub.is_empty() {
                        kept.push(sub);
                    }
                }
            }
        }

        if nothing || kept.is_empty() {
            return Query::match_nothing();
        }
        if kept.len() == 1 {
            let single = &kept[0];
            let collapses = op != Op::Synonym
                || matches!(
                    single.kind(),
                    QueryKind::Term | QueryKind::MatchAll | QueryKind::Op(Op::Synonym)
                );
            if collapses {
                return kept.swap_remove(0);
            }
        }

        let parameter = match op {
            Op::Near | Op::Phrase if parameter == 0 => kept.len() as u32,
            Op::EliteSet if parameter == 0 => DEFAULT_ELITE_SET_SIZE,
            Op::Near | Op::Phrase | Op::EliteSet => parameter,
            _ => 0,
        };
        Self::from_node(QueryNode::Branch {
            op,
            subqueries: kept,
            parameter,
        })
    }

    /// Multiply the weight `subquery` contributes by `factor`.
    ///
    /// The factor must not be negative. Value restrictions carry no weight,
    /// so scaling one returns it unchanged.
    pub fn scale_weight(factor: f64, subquery: Query) -> Result<Self> {
        if factor < 0.0 || factor.is_nan() {
            return Err(TesseraError::invalid_argument(
                "SCALE_WEIGHT requires factor >= 0",
            ));
        }
        match subquery.kind() {
            QueryKind::MatchNothing
            | QueryKind::ValueRange
            | QueryKind::ValueGe
            | QueryKind::ValueLe => Ok(subquery),
            _ => Ok(Self::from_node(QueryNode::ScaleWeight { factor, subquery })),
        }
    }

    /// Documents whose value in `slot` lies within `begin..=end`, compared
    /// bytewise.
    pub fn value_range(slot: ValueSlot, begin: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        let (begin, end) = (begin.into(), end.into());
        if begin.is_empty() {
            return Self::value_le(slot, end);
        }
        if begin > end {
            return Query::match_nothing();
        }
        Self::from_node(QueryNode::ValueRange { slot, begin, end })
    }

    /// Documents whose value in `slot` is at least `limit`.
    pub fn value_ge(slot: ValueSlot, limit: impl Into<Vec<u8>>) -> Self {
        let limit = limit.into();
        if limit.is_empty() {
            return Query::match_all();
        }
        Self::from_node(QueryNode::ValueGe { slot, limit })
    }

    /// Documents whose value in `slot` is at most `limit`.
    pub fn value_le(slot: ValueSlot, limit: impl Into<Vec<u8>>) -> Self {
        Self::from_node(QueryNode::ValueLe {
            slot,
            limit: limit.into(),
        })
    }

    /// Whether this is `MatchNothing`.
    pub fn is_empty(&self) -> bool {
        self.node.is_none()
    }

    pub(crate) fn node(&self) -> Option<&QueryNode> {
        self.node.as_deref()
    }

    pub fn kind(&self) -> QueryKind {
        match self.node.as_deref() {
            None => QueryKind::MatchNothing,
            Some(QueryNode::Term { term, .. }) if term.is_empty() => QueryKind::MatchAll,
            Some(QueryNode::Term { .. }) => QueryKind::Term,
            Some(QueryNode::Branch { op, .. }) => QueryKind::Op(*op),
            Some(QueryNode::ScaleWeight { .. }) => QueryKind::ScaleWeight,
            Some(QueryNode::ValueRange { .. }) => QueryKind::ValueRange,
            Some(QueryNode::ValueGe { .. }) => QueryKind::ValueGe,
            Some(QueryNode::ValueLe { .. }) => QueryKind::ValueLe,
        }
    }

    pub fn num_subqueries(&self) -> usize {
        match self.node.as_deref() {
            Some(QueryNode::Branch { subqueries, .. }) => subqueries.len(),
            Some(QueryNode::ScaleWeight { .. }) => 1,
            _ => 0,
        }
    }

    pub fn subquery(&self, index: usize) -> Option<&Query> {
        match self.node.as_deref() {
            Some(QueryNode::Branch { subqueries, .. }) => subqueries.get(index),
            Some(QueryNode::ScaleWeight { subquery, .. }) if index == 0 => Some(subquery),
            _ => None,
        }
    }

    /// Window or elite set size of a branch, 0 otherwise.
    pub fn parameter(&self) -> u32 {
        match self.node.as_deref() {
            Some(QueryNode::Branch { parameter, .. }) => *parameter,
            _ => 0,
        }
    }

    /// Sum of the within-query frequencies of the terms.
    pub fn length(&self) -> u32 {
        match self.node.as_deref() {
            None => 0,
            Some(QueryNode::Term { wqf, .. }) => *wqf,
            Some(QueryNode::Branch { subqueries, .. }) => subqueries.iter().map(Query::length).sum(),
            Some(QueryNode::ScaleWeight { subquery, .. }) => subquery.length(),
            Some(_) => 0,
        }
    }

    fn gather_terms<'a>(&'a self, out: &mut Vec<(TermPos, &'a str)>) {
        match self.node.as_deref() {
            Some(QueryNode::Term { term, pos, .. }) if !term.is_empty() => out.push((*pos, term)),
            Some(QueryNode::Branch { subqueries, .. }) => {
                for sub in subqueries {
                    sub.gather_terms(out);
                }
            }
            Some(QueryNode::ScaleWeight { subquery, .. }) => subquery.gather_terms(out),
            _ => {}
        }
    }

    /// Terms in query position order, without repeats of a term at the same
    /// position.
    pub fn terms(&self) -> Vec<String> {
        let mut gathered = Vec::new();
        self.gather_terms(&mut gathered);
        gathered.sort_unstable();
        gathered.dedup();
        gathered.into_iter().map(|(_, term)| term.to_string()).collect()
    }

    /// Distinct terms in lexicographic order.
    pub fn unique_terms(&self) -> Vec<String> {
        let mut gathered = Vec::new();
        self.gather_terms(&mut gathered);
        let mut terms: Vec<&str> = gathered.into_iter().map(|(_, term)| term).collect();
        terms.sort_unstable();
        terms.dedup();
        terms.into_iter().map(str::to_string).collect()
    }

    /// Canonical rendering, e.g. `Query((foo OR bar))`.
    pub fn description(&self) -> String {
        let mut desc = String::from("Query(");
        if let Some(node) = self.node.as_deref() {
            node.describe(&mut desc);
        }
        desc.push(')');
        desc
    }
}

impl QueryNode {
    fn describe(&self, out: &mut String) {
        match self {
            QueryNode::Term { term, wqf, pos } => {
                if term.is_empty() {
                    out.push_str("<alldocuments>");
                } else {
                    escape_into(out, term.as_bytes());
                }
                if *wqf != 1 {
                    out.push_str(&format!("#{wqf}"));
                }
                if *pos != 0 {
                    out.push_str(&format!("@{pos}"));
                }
            }
            QueryNode::Branch {
                op,
                subqueries,
                parameter,
            } => {
                out.push('(');
                for (i, sub) in subqueries.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                        out.push_str(op.name());
                        out.push(' ');
                        if *parameter > 0 {
                            out.push_str(&format!("{parameter} "));
                        }
                    }
                    if let Some(node) = sub.node() {
                        node.describe(out);
                    }
                }
                out.push(')');
            }
            QueryNode::ScaleWeight { factor, subquery } => {
                out.push_str(&format!("{factor} * "));
                if let Some(node) = subquery.node() {
                    node.describe(out);
                }
            }
            QueryNode::ValueRange { slot, begin, end } => {
                out.push_str(&format!("VALUE_RANGE {slot} "));
                escape_into(out, begin);
                out.push(' ');
                escape_into(out, end);
            }
            QueryNode::ValueGe { slot, limit } => {
                out.push_str(&format!("VALUE_GE {slot} "));
                escape_into(out, limit);
            }
            QueryNode::ValueLe { slot, limit } => {
                out.push_str(&format!("VALUE_LE {slot} "));
                escape_into(out, limit);
            }
        }
    }
}

/// Append `bytes`, escaping control bytes, backslash and non-ASCII as `\xHH`.
fn escape_into(out: &mut String, bytes: &[u8]) {
    for &b in bytes {
        if b < 32 || b >= 127 || b == b'\\' {
            out.push_str(&format!("\\x{b:02x}"));
        } else {
            out.push(b as char);
        }
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

impl From<&str> for Query {
    fn from(term: &str) -> Self {
        Query::term(term)
    }
}

impl From<String> for Query {
    fn from(term: String) -> Self {
        Query::term(term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(words: &[&str]) -> Vec<Query> {
        words.iter().map(|w| Query::term(*w)).collect()
    }

    #[test]
    fn test_term_description() {
        assert_eq!(Query::term("foo").description(), "Query(foo)");
        assert_eq!(Query::term_with("foo", 2, 3).description(), "Query(foo#2@3)");
        assert_eq!(Query::match_all().description(), "Query(<alldocuments>)");
        assert_eq!(Query::match_nothing().description(), "Query()");
        assert_eq!(Query::term("a\\b\x01").description(), "Query(a\\x5cb\\x01)");
        assert_eq!(Query::term("caf\u{e9}").description(), "Query(caf\\xc3\\xa9)");
    }

    #[test]
    fn test_branch_description() -> Result<()> {
        let q = Query::new(Op::Or, terms(&["there", "is"]));
        assert_eq!(q.description(), "Query((there OR is))");

        let q = Query::new(Op::Phrase, terms(&["a", "b", "c"]));
        assert_eq!(q.description(), "Query((a PHRASE 3 b PHRASE 3 c))");

        let q = Query::with_parameter(Op::Near, terms(&["a", "b"]), 5)?;
        assert_eq!(q.description(), "Query((a NEAR 5 b))");

        let q = Query::new(Op::EliteSet, terms(&["a", "b"]));
        assert_eq!(q.description(), "Query((a ELITE_SET 10 b))");
        Ok(())
    }

    #[test]
    fn test_scale_weight() -> Result<()> {
        let q = Query::scale_weight(5.0, Query::term("foo"))?;
        assert_eq!(q.description(), "Query(5 * foo)");
        let q = Query::scale_weight(0.5, Query::term("foo"))?;
        assert_eq!(q.description(), "Query(0.5 * foo)");

        assert!(Query::scale_weight(-1.0, Query::term("foo")).is_err());
        assert!(Query::scale_weight(2.0, Query::match_nothing())?.is_empty());

        let range = Query::value_range(1, "a", "b");
        assert_eq!(Query::scale_weight(2.0, range.clone())?, range);
        Ok(())
    }

    #[test]
    fn test_value_queries() {
        assert_eq!(
            Query::value_range(0, "1", "4").description(),
            "Query(VALUE_RANGE 0 1 4)"
        );
        assert_eq!(Query::value_ge(2, "x").description(), "Query(VALUE_GE 2 x)");
        assert_eq!(Query::value_le(2, "x").description(), "Query(VALUE_LE 2 x)");
        assert_eq!(Query::value_ge(2, ""), Query::match_all());
        assert_eq!(Query::value_range(3, "", "z"), Query::value_le(3, "z"));
        assert!(Query::value_range(3, "z", "a").is_empty());
    }

    #[test]
    fn test_and_like_simplification() {
        let q = Query::new(Op::And, vec![Query::term("a"), Query::match_nothing()]);
        assert!(q.is_empty());
        assert!(Query::new(Op::And, Vec::new()).is_empty());
        assert_eq!(Query::new(Op::And, terms(&["a"])), Query::term("a"));

        let q = Query::new(Op::Phrase, vec![Query::term("a"), Query::match_all()]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_or_like_simplification() {
        let q = Query::new(Op::Or, vec![Query::match_nothing(), Query::term("a")]);
        assert_eq!(q, Query::term("a"));
        assert!(Query::new(Op::Xor, vec![Query::match_nothing()]).is_empty());

        let inner = Query::new(Op::And, terms(&["a", "b"]));
        let q = Query::new(Op::Synonym, vec![inner]);
        assert_eq!(q.description(), "Query((SYNONYM (a AND b)))");
        assert_eq!(Query::new(Op::Synonym, terms(&["a"])), Query::term("a"));
    }

    #[test]
    fn test_and_not_simplification() -> Result<()> {
        let q = Query::new(Op::AndNot, vec![Query::match_nothing(), Query::term("b")]);
        assert!(q.is_empty());
        let q = Query::new(Op::AndNot, vec![Query::term("a"), Query::match_nothing()]);
        assert_eq!(q, Query::term("a"));
        let scaled = Query::scale_weight(3.0, Query::term("b"))?;
        let q = Query::new(Op::AndNot, vec![Query::term("a"), scaled.clone()]);
        assert_eq!(q.description(), "Query((a AND_NOT b))");
        let q = Query::new(Op::AndMaybe, vec![Query::term("a"), scaled]);
        assert_eq!(q.description(), "Query((a AND_MAYBE 3 * b))");
        Ok(())
    }

    #[test]
    fn test_parameter_validation() {
        assert!(Query::with_parameter(Op::And, terms(&["a", "b"]), 2).is_err());
        assert!(Query::with_parameter(Op::And, terms(&["a", "b"]), 0).is_ok());
        assert!(Query::with_parameter(Op::EliteSet, terms(&["a", "b"]), 1).is_ok());
    }

    #[test]
    fn test_terms_and_length() {
        let q = Query::new(
            Op::Or,
            vec![
                Query::term_with("b", 1, 2),
                Query::term_with("a", 2, 1),
                Query::term_with("b", 1, 2),
                Query::term_with("a", 1, 3),
                Query::match_all(),
            ],
        );
        assert_eq!(q.terms(), vec!["a", "b", "a"]);
        assert_eq!(q.unique_terms(), vec!["a", "b"]);
        assert_eq!(q.length(), 6);
        assert_eq!(Query::match_nothing().length(), 0);
    }
}
