use serde::{Deserialize, Serialize};

/// How [`WritableDatabase::open`](super::WritableDatabase::open) treats the
/// location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OpenMode {
    /// Open an existing database, creating an empty one if there is none.
    #[default]
    CreateOrOpen,
    /// Create a new database; fail if one already exists.
    Create,
    /// Create a new database, discarding any existing one.
    CreateOrOverwrite,
    /// Open an existing database; fail if there is none.
    Open,
}

/// Configuration for writable databases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// How to treat an existing (or missing) database.
    #[serde(default)]
    pub open_mode: OpenMode,

    /// Commit automatically after this many document changes. 0 disables it.
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    /// Older generations kept on disk after a commit, so that readers opening
    /// concurrently still find their files.
    #[serde(default = "default_retained_generations")]
    pub retained_generations: usize,
}

fn default_flush_threshold() -> usize {
    10_000
}

fn default_retained_generations() -> usize {
    1
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            open_mode: OpenMode::default(),
            flush_threshold: default_flush_threshold(),
            retained_generations: default_retained_generations(),
        }
    }
}

impl DatabaseConfig {
    pub fn new(open_mode: OpenMode) -> Self {
        DatabaseConfig {
            open_mode,
            ..Self::default()
        }
    }

    pub fn with_flush_threshold(mut self, flush_threshold: usize) -> Self {
        self.flush_threshold = flush_threshold;
        self
    }

    pub fn with_retained_generations(mut self, retained_generations: usize) -> Self {
        self.retained_generations = retained_generations;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_defaults() {
        let config: DatabaseConfig = serde_json::from_str(r#"{"open_mode": "Create"}"#).unwrap();
        assert_eq!(config.open_mode, OpenMode::Create);
        assert_eq!(config.flush_threshold, 10_000);
        assert_eq!(config.retained_generations, 1);
    }
}
