//! # Tessera
//!
//! An embeddable, on-disk search engine library.
//!
//! ## Features
//!
//! - Term indexing with positions, value slots and metadata
//! - Commits as atomic generations, with transactions
//! - Boolean, proximity and weighted queries
//! - BM25 ranking with pluggable weighting schemes
//! - Sorting, collapsing, match deciders and match spies
//! - Relevance feedback and query expansion
//! - Compaction of several databases into one
//!
//! ## Example
//!
//! ```
//! use tessera::{Document, Enquire, Op, Query, TermGenerator, WritableDatabase};
//!
//! # fn main() -> tessera::Result<()> {
//! let mut db = WritableDatabase::inmemory()?;
//! let mut generator = TermGenerator::new();
//! for text in ["the quick brown fox", "the lazy dog"] {
//!     let mut doc = Document::with_data(text);
//!     generator.set_termpos(0);
//!     generator.index_text(&mut doc, text, 1, "")?;
//!     db.add_document(&doc)?;
//! }
//! db.commit()?;
//!
//! let mut enquire = Enquire::new(&db.reader());
//! enquire.set_query(Query::new(Op::Or, [Query::term("fox"), Query::term("dog")]))?;
//! let mset = enquire.mset(0, 10)?;
//! assert_eq!(mset.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod compactor;
pub mod database;
pub mod doc_store;
pub mod document;
pub mod enquire;
mod error;
pub mod expand;
pub mod query;
pub mod storage;
pub mod term_store;
mod util;
mod version;
pub mod weight;

// Re-exports for the public API
pub use analysis::{NoopStemmer, SimpleStopper, Stemmer, Stopper, TermGenerator};
pub use compactor::{CompactionStats, Compactor};
pub use database::{Database, DatabaseConfig, IndexReader, OpenMode, WritableDatabase};
pub use document::{DocId, Document, TermPos, ValueSlot};
pub use enquire::{
    DocIdOrder, Enquire, ExpandDecider, MSet, MSetItem, MSetRequest, MatchDecider, MatchSpy,
    RSet, SortOrder, ValueCountMatchSpy,
};
pub use error::{Result, TesseraError};
pub use expand::{ESet, ESetRequest, ExpandTerm};
pub use query::{Op, Query, QueryKind};
pub use storage::{Storage, StorageConfig, StorageFactory};
pub use util::sortable::{sortable_serialise, sortable_unserialise};
pub use version::{major_version, minor_version, revision, version_string};
pub use weight::{BM25Weight, BoolWeight, TfIdfWeight, WeightingScheme};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
