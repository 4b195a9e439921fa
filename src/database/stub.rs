//! Stub databases.
//!
//! A stub is a small text file listing the databases to search together.
//! Resolution is a capability: [`Database::open_with_resolver`] accepts any
//! [`StubResolver`], and [`DescriptorFileResolver`] reads the usual format:
//!
//! ```text
//! # comment
//! auto ../shard1
//! /abs/path/shard2
//! ```
//!
//! Relative paths are resolved against the directory holding the stub.
//!
//! [`Database::open_with_resolver`]: crate::database::Database::open_with_resolver

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, TesseraError};

/// Maps a stub file to the database locations it stands for.
pub trait StubResolver {
    fn resolve(&self, stub: &Path) -> Result<Vec<PathBuf>>;
}

impl<F> StubResolver for F
where
    F: Fn(&Path) -> Result<Vec<PathBuf>>,
{
    fn resolve(&self, stub: &Path) -> Result<Vec<PathBuf>> {
        self(stub)
    }
}

/// Resolver reading one database location per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorFileResolver;

const UNSUPPORTED_BACKENDS: &[&str] = &["remote", "inmemory", "chert", "glass", "honey", "brass"];

impl DescriptorFileResolver {
    /// Parse descriptor `contents`, resolving relative paths against `base`.
    pub fn parse(contents: &str, base: &Path) -> Result<Vec<PathBuf>> {
        let mut locations = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let path = match line.split_once(char::is_whitespace) {
                Some(("auto", rest)) => rest.trim(),
                Some((kind, _)) if UNSUPPORTED_BACKENDS.contains(&kind) => {
                    return Err(TesseraError::database_opening(format!(
                        "stub line {}: backend '{kind}' is not supported",
                        line_no + 1
                    )));
                }
                _ => line,
            };
            locations.push(base.join(path));
        }
        if locations.is_empty() {
            return Err(TesseraError::database_opening(
                "stub file lists no databases",
            ));
        }
        Ok(locations)
    }
}

impl StubResolver for DescriptorFileResolver {
    fn resolve(&self, stub: &Path) -> Result<Vec<PathBuf>> {
        let contents = fs::read_to_string(stub).map_err(|e| {
            TesseraError::database_opening(format!(
                "failed to read stub '{}': {e}",
                stub.display()
            ))
        })?;
        let base = stub.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&contents, base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_descriptor() {
        let contents = "# shards\n\nauto one\n/abs/two\n  auto   three  \n";
        let locations = DescriptorFileResolver::parse(contents, Path::new("/db")).unwrap();
        assert_eq!(
            locations,
            vec![
                PathBuf::from("/db/one"),
                PathBuf::from("/abs/two"),
                PathBuf::from("/db/three"),
            ]
        );
    }

    #[test]
    fn test_unsupported_backend() {
        let err = DescriptorFileResolver::parse("remote :8000", Path::new("/")).unwrap_err();
        assert!(matches!(err, TesseraError::DatabaseOpening(_)));
    }

    #[test]
    fn test_empty_stub() {
        assert!(DescriptorFileResolver::parse("# nothing\n", Path::new("/")).is_err());
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |_: &Path| -> Result<Vec<PathBuf>> { Ok(vec![PathBuf::from("x")]) };
        assert_eq!(resolver.resolve(Path::new("stub")).unwrap().len(), 1);
    }
}
