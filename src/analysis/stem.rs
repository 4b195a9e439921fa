/// Reduces a word to its stem.
///
/// No stemming algorithms ship with the crate; wrap one in a closure or
/// implement this trait for it.
pub trait Stemmer: Send + Sync {
    fn stem(&self, word: &str) -> String;
}

impl<F> Stemmer for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn stem(&self, word: &str) -> String {
        self(word)
    }
}

/// Returns every word unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStemmer;

impl Stemmer for NoopStemmer {
    fn stem(&self, word: &str) -> String {
        word.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stemmers() {
        assert_eq!(NoopStemmer.stem("running"), "running");
        let plural = |word: &str| word.strip_suffix('s').unwrap_or(word).to_string();
        assert_eq!(Stemmer::stem(&plural, "cats"), "cat");
    }
}
