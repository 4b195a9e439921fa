//! Turning text into terms.
//!
//! A [`TermGenerator`] splits text into words on Unicode word boundaries,
//! normalises them (NFKC, lowercase) and posts them to a
//! [`Document`](crate::document::Document) with their positions. Stemming
//! and stop words are capabilities supplied by the caller through
//! [`Stemmer`] and [`Stopper`].

pub mod stem;
pub mod term_generator;

use ahash::AHashSet;

pub use self::stem::{NoopStemmer, Stemmer};
pub use self::term_generator::{StemStrategy, StopStrategy, TermGenerator};

/// Decides whether a word is a stop word.
pub trait Stopper: Send + Sync {
    fn is_stop_word(&self, word: &str) -> bool;
}

impl<F> Stopper for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_stop_word(&self, word: &str) -> bool {
        self(word)
    }
}

/// A stopper backed by a fixed list of words.
#[derive(Debug, Clone, Default)]
pub struct SimpleStopper {
    words: AHashSet<String>,
}

impl SimpleStopper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, word: impl Into<String>) {
        self.words.insert(word.into());
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Stopper for SimpleStopper {
    fn is_stop_word(&self, word: &str) -> bool {
        self.words.contains(word)
    }
}

impl<S: Into<String>> FromIterator<S> for SimpleStopper {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        SimpleStopper {
            words: iter.into_iter().map(Into::into).collect(),
        }
    }
}
