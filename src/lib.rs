//! # Tessera
//!
//! A segment-based document store and full-text retrieval engine.
//!
//! ## Features
//!
//! - Typed schemas with keyword, tokenized text, number, float and date fields
//! - Inverted index with FST or B+Tree term dictionaries
//! - Range filters over numeric and date fields
//! - Soft deletes via a tombstone bitmap, physical removal on merge
//! - TF-IDF vector-space ranking with a coordination factor
//! - Memory-mapped immutable segments shared lock-free between readers
//!
//! ```no_run
//! use tessera::{Document, Engine, FieldType, IndexConfig};
//!
//! # fn main() -> tessera::Result<()> {
//! let engine = Engine::open("/tmp/tessera", IndexConfig::default())?;
//! engine.create_index(
//!     "books",
//!     &[("id", FieldType::PrimaryKey), ("title", FieldType::Text), ("year", FieldType::Number)],
//! )?;
//! engine.add_document(
//!     "books",
//!     &Document::new().add_field("id", "1").add_field("title", "Dune").add_field("year", "1965"),
//! )?;
//! let params = vec![("title".to_string(), "dune".to_string())];
//! let result = engine.search("books", &params)?;
//! assert_eq!(result.total, 1);
//! # Ok(())
//! # }
//! ```
pub mod analysis;
pub mod data;
pub mod engine;
pub mod error;
pub mod index;
pub mod search;
pub mod segment;
pub mod storage;

// Re-exports for the public API
pub use data::{Document, FieldType, FieldValue, Posting, Schema};
pub use engine::Engine;
pub use engine::config::IndexConfig;
pub use error::{Result, TesseraError};
pub use index::Index;
pub use search::{FilterKind, Hit, SearchFilter, SearchRequest, SearchResult, TermQuery};
pub use segment::term_index::TermIndexKind;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
