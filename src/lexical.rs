//! Inverted-index engine backing each index partition.
//!
//! # Module Structure
//!
//! - `document`: documents, field values and terms
//! - `segment`: in-memory segment with term dictionaries and live-docs bitmap
//! - `query`: term, range, prefix and boolean queries
//! - `collector`: match collectors
//! - `directory`: on-disk commit files
//! - `writer`: buffered partition writer with commits
//! - `searcher`: near-real-time searcher manager
//! - `snapshot`: commit pinning for backups

pub mod collector;
pub mod directory;
pub mod document;
pub mod query;
pub mod searcher;
pub mod segment;
pub mod snapshot;
pub mod writer;

// Re-exports
pub use collector::{Collector, TotalHitCountCollector};
pub use directory::{CommitPoint, IndexDirectory};
pub use document::{FieldValue, IndexDocument, Term};
pub use query::Query;
pub use searcher::{LiveDocuments, PartitionSearcher, SearcherManager};
pub use segment::IndexSegment;
pub use snapshot::{PartitionSnapshot, SnapshotDeletionPolicy};
pub use writer::PartitionWriter;
