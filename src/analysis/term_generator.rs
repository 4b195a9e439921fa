use std::fmt;

use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

use crate::analysis::{Stemmer, Stopper};
use crate::document::{Document, TermPos};
use crate::error::Result;

/// Prefix marking stemmed terms that sit alongside their unstemmed form.
pub const STEM_PREFIX: char = 'Z';

/// Longer words are skipped; they are almost never useful search terms.
pub const DEFAULT_MAX_WORD_LENGTH: usize = 64;

/// Which forms of each word get indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StemStrategy {
    /// Only the word itself.
    None,
    /// The word with positions, plus its `Z`-prefixed stem without
    /// positions. Capitalised words are not stemmed.
    #[default]
    Some,
    /// Only the stem, with positions.
    All,
    /// Only the `Z`-prefixed stem, with positions.
    AllZ,
}

/// What happens to stop words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopStrategy {
    /// Index them like any other word.
    None,
    /// Skip them entirely. They still take up a position.
    All,
    /// Index them, but not their stems.
    #[default]
    Stemmed,
}

/// Indexes free text into documents.
///
/// Positions continue across calls, so several fields of one document can be
/// indexed in turn; [`increase_termpos`](Self::increase_termpos) leaves a gap
/// so phrases do not match across them. Call
/// [`set_termpos`](Self::set_termpos) with 0 before moving to a new
/// document.
pub struct TermGenerator {
    stemmer: Option<Box<dyn Stemmer>>,
    stopper: Option<Box<dyn Stopper>>,
    stem_strategy: StemStrategy,
    stop_strategy: StopStrategy,
    max_word_length: usize,
    termpos: TermPos,
}

impl Default for TermGenerator {
    fn default() -> Self {
        TermGenerator {
            stemmer: None,
            stopper: None,
            stem_strategy: StemStrategy::default(),
            stop_strategy: StopStrategy::default(),
            max_word_length: DEFAULT_MAX_WORD_LENGTH,
            termpos: 0,
        }
    }
}

impl fmt::Debug for TermGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TermGenerator")
            .field("stemmer", &self.stemmer.is_some())
            .field("stopper", &self.stopper.is_some())
            .field("stem_strategy", &self.stem_strategy)
            .field("stop_strategy", &self.stop_strategy)
            .field("max_word_length", &self.max_word_length)
            .field("termpos", &self.termpos)
            .finish()
    }
}

impl TermGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stem with `stemmer`. Without one, no stems are indexed whatever the
    /// strategy.
    pub fn with_stemmer<S: Stemmer + 'static>(mut self, stemmer: S) -> Self {
        self.stemmer = Some(Box::new(stemmer));
        self
    }

    pub fn with_stopper<S: Stopper + 'static>(mut self, stopper: S) -> Self {
        self.stopper = Some(Box::new(stopper));
        self
    }

    pub fn with_stem_strategy(mut self, strategy: StemStrategy) -> Self {
        self.stem_strategy = strategy;
        self
    }

    pub fn with_stop_strategy(mut self, strategy: StopStrategy) -> Self {
        self.stop_strategy = strategy;
        self
    }

    pub fn with_max_word_length(mut self, max_word_length: usize) -> Self {
        self.max_word_length = max_word_length;
        self
    }

    /// Position of the last word indexed.
    pub fn termpos(&self) -> TermPos {
        self.termpos
    }

    pub fn set_termpos(&mut self, termpos: TermPos) {
        self.termpos = termpos;
    }

    pub fn increase_termpos(&mut self, delta: TermPos) {
        self.termpos = self.termpos.saturating_add(delta);
    }

    /// Index `text` into `doc` with positions. Every term is prefixed with
    /// `prefix` and its wdf raised by `wdf_inc` per occurrence.
    pub fn index_text(
        &mut self,
        doc: &mut Document,
        text: &str,
        wdf_inc: u32,
        prefix: &str,
    ) -> Result<()> {
        self.index(doc, text, wdf_inc, prefix, true)
    }

    /// Like [`index_text`](Self::index_text), without recording positions.
    pub fn index_text_without_positions(
        &mut self,
        doc: &mut Document,
        text: &str,
        wdf_inc: u32,
        prefix: &str,
    ) -> Result<()> {
        self.index(doc, text, wdf_inc, prefix, false)
    }

    fn index(
        &mut self,
        doc: &mut Document,
        text: &str,
        wdf_inc: u32,
        prefix: &str,
        positional: bool,
    ) -> Result<()> {
        let strategy = match self.stemmer {
            Some(_) => self.stem_strategy,
            None => StemStrategy::None,
        };
        let normalised: String = text.nfkc().collect();
        for raw in normalised.unicode_words() {
            let capitalised = raw.chars().next().is_some_and(char::is_uppercase);
            let word = raw.to_lowercase();
            if word.len() > self.max_word_length {
                continue;
            }
            self.termpos = self.termpos.saturating_add(1);
            let pos = self.termpos;

            let stopped = self.stop_strategy != StopStrategy::None
                && self
                    .stopper
                    .as_ref()
                    .is_some_and(|stopper| stopper.is_stop_word(&word));
            if stopped && self.stop_strategy == StopStrategy::All {
                continue;
            }

            let post = |doc: &mut Document, term: &str, with_position: bool| {
                if with_position {
                    doc.add_posting_with_wdf(term, pos, wdf_inc)
                } else {
                    doc.add_term(term, wdf_inc)
                }
            };

            if matches!(strategy, StemStrategy::None | StemStrategy::Some) {
                post(doc, &format!("{prefix}{word}"), positional)?;
            }
            if strategy == StemStrategy::None || stopped {
                continue;
            }
            let Some(stemmer) = &self.stemmer else {
                continue;
            };
            match strategy {
                StemStrategy::Some if !capitalised => {
                    let stem = stemmer.stem(&word);
                    post(doc, &format!("{STEM_PREFIX}{prefix}{stem}"), false)?;
                }
                StemStrategy::All => {
                    let stem = stemmer.stem(&word);
                    post(doc, &format!("{prefix}{stem}"), positional)?;
                }
                StemStrategy::AllZ => {
                    let stem = stemmer.stem(&word);
                    post(doc, &format!("{STEM_PREFIX}{prefix}{stem}"), positional)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}
