//! Error types for Tessera.
//!
//! Every fallible operation in the crate returns [`Result`], whose error type
//! [`TesseraError`] distinguishes the failure classes callers are expected to
//! react to (missing documents, locked databases, corrupt storage, ...).

use thiserror::Error;

/// The main error type for Tessera operations.
#[derive(Error, Debug)]
pub enum TesseraError {
    /// I/O errors from the storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors, e.g. for the manifest.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors building or reading the term dictionary.
    #[error("Term dictionary error: {0}")]
    Fst(#[from] fst::Error),

    /// A term, position list or file lookup missed.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A document id is absent or was deleted.
    #[error("{0}")]
    DocNotFound(String),

    /// A query string could not be parsed by an external parser.
    #[error("Query parser error: {0}")]
    QueryParser(String),

    /// The database location is missing or could not be opened.
    #[error("Database opening error: {0}")]
    DatabaseOpening(String),

    /// Another writer holds the database lock.
    #[error("Database lock error: {0}")]
    DatabaseLock(String),

    /// Stored data failed validation.
    #[error("Database corrupt: {0}")]
    DatabaseCorrupt(String),

    /// Compaction could not be performed.
    #[error("Compaction error: {0}")]
    Compaction(String),

    /// An argument was outside its accepted domain.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not valid in the current state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Anything else.
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for Tessera operations.
pub type Result<T> = std::result::Result<T, TesseraError>;

impl TesseraError {
    /// Create a not-found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        TesseraError::NotFound(msg.into())
    }

    /// Create a document-not-found error for the given id.
    pub fn doc_not_found(doc_id: u64) -> Self {
        TesseraError::DocNotFound(format!("Docid {doc_id} not found"))
    }

    /// Create a query parser error.
    pub fn query_parser<S: Into<String>>(msg: S) -> Self {
        TesseraError::QueryParser(msg.into())
    }

    /// Create a database opening error.
    pub fn database_opening<S: Into<String>>(msg: S) -> Self {
        TesseraError::DatabaseOpening(msg.into())
    }

    /// Create a database lock error.
    pub fn database_lock<S: Into<String>>(msg: S) -> Self {
        TesseraError::DatabaseLock(msg.into())
    }

    /// Create a corruption error.
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        TesseraError::DatabaseCorrupt(msg.into())
    }

    /// Create a compaction error.
    pub fn compaction<S: Into<String>>(msg: S) -> Self {
        TesseraError::Compaction(msg.into())
    }

    /// Create an invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        TesseraError::InvalidArgument(msg.into())
    }

    /// Create an invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        TesseraError::InvalidOperation(msg.into())
    }

    /// Create a generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        TesseraError::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_not_found_message() {
        let err = TesseraError::doc_not_found(3);
        assert_eq!(err.to_string(), "Docid 3 not found");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TesseraError = io.into();
        assert!(matches!(err, TesseraError::Io(_)));
    }
}
