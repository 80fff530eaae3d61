//! Reader merging several partitions.

use rayon::prelude::*;

use crate::error::Result;
use crate::lexical::collector::TotalHitCountCollector;
use crate::lexical::query::Query;
use crate::lexical::searcher::PartitionSearcher;
use crate::reader::{
    Documents, EntityIds, IndexReader, MatchingEntityIds, ReaderContext, matching_docs,
};
use crate::sampler::IndexSample;
use crate::value::PropertyValue;
use crate::verifier::PropertyAccessor;

/// Runs every operation against each bound searcher and combines the
/// results: unions for seeks and scans, sums for counts.
///
/// Results come in partition order, then in document order per partition.
#[derive(Debug)]
pub struct PartitionedIndexReader {
    searchers: Vec<PartitionSearcher>,
    context: ReaderContext,
}

impl PartitionedIndexReader {
    pub(crate) fn new(searchers: Vec<PartitionSearcher>, context: ReaderContext) -> Self {
        PartitionedIndexReader { searchers, context }
    }

    /// Number of partitions the reader is bound to.
    pub fn partition_count(&self) -> usize {
        self.searchers.len()
    }

    fn query(&self, query: &Query) -> Result<EntityIds> {
        let matches: Vec<_> = self
            .searchers
            .par_iter()
            .map(|searcher| matching_docs(searcher, query))
            .collect();
        Ok(Box::new(MatchingEntityIds::new(matches)))
    }
}

impl IndexReader for PartitionedIndexReader {
    fn seek(&self, value: &PropertyValue) -> Result<EntityIds> {
        self.query(&self.context.structure.new_seek_query(value))
    }

    fn range_seek_by_number_inclusive(
        &self,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> Result<EntityIds> {
        self.query(
            &self
                .context
                .structure
                .new_inclusive_numeric_range_seek_query(lower, upper),
        )
    }

    fn range_seek_by_string(
        &self,
        lower: Option<&str>,
        include_lower: bool,
        upper: Option<&str>,
        include_upper: bool,
    ) -> Result<EntityIds> {
        self.query(&self.context.structure.new_range_seek_by_string_query(
            lower,
            include_lower,
            upper,
            include_upper,
        ))
    }

    fn range_seek_by_prefix(&self, prefix: &str) -> Result<EntityIds> {
        self.query(&self.context.structure.new_range_seek_by_prefix_query(prefix))
    }

    fn scan(&self) -> Result<EntityIds> {
        self.query(&self.context.structure.new_scan_query())
    }

    fn count_indexed_nodes(&self, entity_id: u64, value: &PropertyValue) -> Result<usize> {
        let query = self
            .context
            .structure
            .new_entity_and_value_query(entity_id, value);
        let counts: Vec<usize> = self
            .searchers
            .par_iter()
            .map(|searcher| -> Result<usize> {
                let mut collector = TotalHitCountCollector::new();
                searcher.search(&query, &mut collector)?;
                Ok(collector.total_hits())
            })
            .collect::<Result<_>>()?;
        Ok(counts.into_iter().sum())
    }

    fn all_docs(&self) -> Documents {
        let partitions: Vec<_> = self.searchers.iter().map(PartitionSearcher::all_docs).collect();
        Box::new(partitions.into_iter().flatten())
    }

    fn max_doc(&self) -> usize {
        self.searchers
            .iter()
            .map(|searcher| searcher.max_doc() as usize)
            .sum()
    }

    fn sample_index(&self) -> Result<IndexSample> {
        self.context.sample(&self.searchers)
    }

    fn verify_deferred_constraints(
        &self,
        accessor: &dyn PropertyAccessor,
        property_key_id: u32,
    ) -> Result<()> {
        self.context
            .verify(&self.searchers, accessor, property_key_id)
    }

    fn verify_deferred_constraints_for(
        &self,
        accessor: &dyn PropertyAccessor,
        property_key_id: u32,
        values: &[PropertyValue],
    ) -> Result<()> {
        self.context
            .verify_values(&self.searchers, accessor, property_key_id, values)
    }

    fn close(self) {
        for searcher in self.searchers {
            searcher.close();
        }
    }
}
