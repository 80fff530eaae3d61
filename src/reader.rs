//! Schema index readers.
//!
//! A reader is bound to searchers acquired at one point in time. Index
//! readers come in two variants, chosen by partition count when the reader
//! is acquired:
//!
//! - [`SimpleIndexReader`] for an index with a single partition
//! - [`PartitionedIndexReader`] merging the results of several partitions
//!
//! Both expose the [`IndexReader`] capabilities; [`SchemaIndexReader`] is
//! the tagged variant handed out by the index.

mod partitioned;
mod simple;

use std::collections::VecDeque;
use std::sync::Arc;
use std::vec;

use ahash::AHashSet;

use crate::config::{IndexConfig, IndexSamplingConfig};
use crate::error::Result;
use crate::lexical::document::{FieldValue, IndexDocument};
use crate::lexical::query::Query;
use crate::lexical::searcher::PartitionSearcher;
use crate::lexical::segment::IndexSegment;
use crate::sampler::{IndexSample, IndexSampler, NonUniqueIndexSampler, UniqueIndexSampler};
use crate::structure::{DocumentStructure, ENTITY_ID_KEY};
use crate::task::TaskCoordinator;
use crate::value::PropertyValue;
use crate::verifier::{self, PropertyAccessor};

pub use partitioned::PartitionedIndexReader;
pub use simple::SimpleIndexReader;

/// Forward-only sequence of entity ids, each entity at most once.
pub type EntityIds = Box<dyn Iterator<Item = u64> + Send>;

/// Forward-only sequence of live documents.
pub type Documents = Box<dyn Iterator<Item = Result<IndexDocument>> + Send>;

/// Read operations of a schema index.
pub trait IndexReader {
    /// Entities whose value equals `value`.
    fn seek(&self, value: &PropertyValue) -> Result<EntityIds>;

    /// Entities with a numeric value in `[lower, upper]`; `None` is unbounded.
    fn range_seek_by_number_inclusive(
        &self,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> Result<EntityIds>;

    fn range_seek_by_string(
        &self,
        lower: Option<&str>,
        include_lower: bool,
        upper: Option<&str>,
        include_upper: bool,
    ) -> Result<EntityIds>;

    fn range_seek_by_prefix(&self, prefix: &str) -> Result<EntityIds>;

    /// Every indexed entity.
    fn scan(&self) -> Result<EntityIds>;

    /// Number of entries indexing `value` for `entity_id`.
    ///
    /// At most one is expected, but the raw count is reported.
    fn count_indexed_nodes(&self, entity_id: u64, value: &PropertyValue) -> Result<usize>;

    /// All live documents. Fails per item if a document cannot be read.
    fn all_docs(&self) -> Documents;

    /// Document slots, deleted documents included.
    fn max_doc(&self) -> usize;

    fn sample_index(&self) -> Result<IndexSample>;

    /// Verify uniqueness over the whole index.
    fn verify_deferred_constraints(
        &self,
        accessor: &dyn PropertyAccessor,
        property_key_id: u32,
    ) -> Result<()>;

    /// Verify uniqueness of the entries carrying `values`.
    fn verify_deferred_constraints_for(
        &self,
        accessor: &dyn PropertyAccessor,
        property_key_id: u32,
        values: &[PropertyValue],
    ) -> Result<()>;

    /// Release the bound searchers.
    fn close(self)
    where
        Self: Sized;
}

/// Settings and collaborators shared by the readers of one index.
#[derive(Debug, Clone)]
pub(crate) struct ReaderContext {
    pub config: Arc<IndexConfig>,
    pub sampling_config: Arc<IndexSamplingConfig>,
    pub task_coordinator: TaskCoordinator,
    pub structure: DocumentStructure,
}

impl ReaderContext {
    pub fn new(
        config: Arc<IndexConfig>,
        sampling_config: Arc<IndexSamplingConfig>,
        task_coordinator: TaskCoordinator,
    ) -> Self {
        ReaderContext {
            config,
            sampling_config,
            task_coordinator,
            structure: DocumentStructure::new(),
        }
    }

    /// Sample `searchers` as one logical index.
    pub fn sample(&self, searchers: &[PartitionSearcher]) -> Result<IndexSample> {
        let control = self.task_coordinator.new_instance();
        let sampler: Box<dyn IndexSampler + '_> = if self.config.unique {
            Box::new(UniqueIndexSampler::new(searchers, control))
        } else {
            Box::new(NonUniqueIndexSampler::new(
                searchers,
                control,
                &self.sampling_config,
            ))
        };
        sampler.sample_index()
    }

    pub fn verify(
        &self,
        searchers: &[PartitionSearcher],
        accessor: &dyn PropertyAccessor,
        property_key_id: u32,
    ) -> Result<()> {
        let control = self.task_coordinator.new_instance();
        verifier::verify_deferred_constraints(searchers, accessor, property_key_id, &control)
    }

    pub fn verify_values(
        &self,
        searchers: &[PartitionSearcher],
        accessor: &dyn PropertyAccessor,
        property_key_id: u32,
        values: &[PropertyValue],
    ) -> Result<()> {
        let control = self.task_coordinator.new_instance();
        verifier::verify_deferred_constraints_for(
            searchers,
            accessor,
            property_key_id,
            values,
            &control,
        )
    }
}

/// Live documents of `searcher` matching `query`, with the view they belong to.
pub(crate) fn matching_docs(searcher: &PartitionSearcher, query: &Query) -> (Arc<IndexSegment>, Vec<u32>) {
    let segment = searcher.shared_segment();
    let docs = query.matching_docs(&segment);
    (segment, docs)
}

/// Entity ids of matched documents, resolved while iterating.
///
/// Yields in partition order, then document order. An entity with several
/// matching entries is yielded once.
pub(crate) struct MatchingEntityIds {
    matches: VecDeque<(Arc<IndexSegment>, vec::IntoIter<u32>)>,
    seen: AHashSet<u64>,
}

impl MatchingEntityIds {
    pub(crate) fn new(matches: Vec<(Arc<IndexSegment>, Vec<u32>)>) -> Self {
        MatchingEntityIds {
            matches: matches
                .into_iter()
                .map(|(segment, docs)| (segment, docs.into_iter()))
                .collect(),
            seen: AHashSet::new(),
        }
    }
}

impl Iterator for MatchingEntityIds {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        while let Some((segment, docs)) = self.matches.front_mut() {
            let Some(doc_id) = docs.next() else {
                self.matches.pop_front();
                continue;
            };
            let entity_id = segment
                .document(doc_id)
                .and_then(|doc| doc.get(ENTITY_ID_KEY))
                .and_then(FieldValue::as_long);
            match entity_id {
                Some(entity_id) if self.seen.insert(entity_id) => return Some(entity_id),
                Some(_) => {}
                None => log::warn!("skipping document {doc_id} without an entity id"),
            }
        }
        None
    }
}

/// A reader over the partition set captured at acquisition time.
#[derive(Debug)]
pub enum SchemaIndexReader {
    /// Bound to the only partition of the index.
    Simple(SimpleIndexReader),
    /// Bound to every partition, merging their results.
    Partitioned(PartitionedIndexReader),
}

impl SchemaIndexReader {
    /// Whether this reader merges several partitions.
    pub fn is_partitioned(&self) -> bool {
        matches!(self, SchemaIndexReader::Partitioned(_))
    }

    /// Number of partitions the reader is bound to.
    pub fn partition_count(&self) -> usize {
        match self {
            SchemaIndexReader::Simple(_) => 1,
            SchemaIndexReader::Partitioned(reader) => reader.partition_count(),
        }
    }
}

macro_rules! delegate {
    ($self:ident, $reader:ident => $call:expr) => {
        match $self {
            SchemaIndexReader::Simple($reader) => $call,
            SchemaIndexReader::Partitioned($reader) => $call,
        }
    };
}

impl IndexReader for SchemaIndexReader {
    fn seek(&self, value: &PropertyValue) -> Result<EntityIds> {
        delegate!(self, reader => reader.seek(value))
    }

    fn range_seek_by_number_inclusive(
        &self,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> Result<EntityIds> {
        delegate!(self, reader => reader.range_seek_by_number_inclusive(lower, upper))
    }

    fn range_seek_by_string(
        &self,
        lower: Option<&str>,
        include_lower: bool,
        upper: Option<&str>,
        include_upper: bool,
    ) -> Result<EntityIds> {
        delegate!(self, reader => reader.range_seek_by_string(lower, include_lower, upper, include_upper))
    }

    fn range_seek_by_prefix(&self, prefix: &str) -> Result<EntityIds> {
        delegate!(self, reader => reader.range_seek_by_prefix(prefix))
    }

    fn scan(&self) -> Result<EntityIds> {
        delegate!(self, reader => reader.scan())
    }

    fn count_indexed_nodes(&self, entity_id: u64, value: &PropertyValue) -> Result<usize> {
        delegate!(self, reader => reader.count_indexed_nodes(entity_id, value))
    }

    fn all_docs(&self) -> Documents {
        delegate!(self, reader => reader.all_docs())
    }

    fn max_doc(&self) -> usize {
        delegate!(self, reader => reader.max_doc())
    }

    fn sample_index(&self) -> Result<IndexSample> {
        delegate!(self, reader => reader.sample_index())
    }

    fn verify_deferred_constraints(
        &self,
        accessor: &dyn PropertyAccessor,
        property_key_id: u32,
    ) -> Result<()> {
        delegate!(self, reader => reader.verify_deferred_constraints(accessor, property_key_id))
    }

    fn verify_deferred_constraints_for(
        &self,
        accessor: &dyn PropertyAccessor,
        property_key_id: u32,
        values: &[PropertyValue],
    ) -> Result<()> {
        delegate!(self, reader => reader.verify_deferred_constraints_for(accessor, property_key_id, values))
    }

    fn close(self) {
        delegate!(self, reader => reader.close())
    }
}
