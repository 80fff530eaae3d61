//! # Partitioned Index
//!
//! The partitioned schema index of an embedded graph database: one logical
//! secondary index stored as a set of independently searchable partitions.
//!
//! ## Features
//!
//! - Partition lifecycle: prepare, open, grow, close and drop
//! - Single-partition and merged multi-partition readers
//! - Cardinality sampling for unique and non-unique indexes
//! - Deferred verification of uniqueness constraints
//! - Online-backup snapshots pinning the last commit of every partition
//! - Cooperative cancellation of long-running tasks on drop
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use partitioned_index::{
//!     DocumentStructure, IndexConfig, IndexReader, IndexSamplingConfig, PartitionedIndex,
//!     PartitionedIndexStorage, PropertyValue,
//! };
//!
//! # fn main() -> partitioned_index::Result<()> {
//! let storage = Arc::new(PartitionedIndexStorage::new("/tmp/schema-index"));
//! let index = PartitionedIndex::new(storage, IndexConfig::default(), IndexSamplingConfig::default());
//! index.prepare()?;
//! index.open()?;
//!
//! let structure = DocumentStructure::new();
//! index
//!     .writer()?
//!     .add_document(structure.document_representing_property(1, &PropertyValue::from("x")))?;
//! index.maybe_refresh_blocking()?;
//!
//! let reader = index.reader()?;
//! let ids: Vec<u64> = reader.seek(&PropertyValue::from("x"))?.collect();
//! assert_eq!(ids, vec![1]);
//! reader.close();
//! index.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod lexical;
pub mod partition;
pub mod reader;
pub mod sampler;
pub mod snapshot;
pub mod storage;
pub mod structure;
pub mod task;
pub mod value;
pub mod verifier;
pub mod writer;

// Re-exports for the public API
pub use config::{IndexConfig, IndexSamplingConfig};
pub use error::{IndexEntryConflict, IndexError, Result};
pub use index::PartitionedIndex;
pub use partition::IndexPartition;
pub use reader::{IndexReader, PartitionedIndexReader, SchemaIndexReader, SimpleIndexReader};
pub use sampler::IndexSample;
pub use snapshot::SnapshotIterator;
pub use storage::{IndexStorage, PartitionedIndexStorage};
pub use structure::DocumentStructure;
pub use task::{TaskControl, TaskCoordinator};
pub use value::PropertyValue;
pub use verifier::PropertyAccessor;
pub use writer::PartitionedIndexWriter;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
