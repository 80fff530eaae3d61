//! Reader over a single partition.

use std::slice;

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

#[derive(Debug)]
pub struct SimpleIndexReader {
    searcher: PartitionSearcher,
    context: ReaderContext,
}

impl SimpleIndexReader {
    pub(crate) fn new(searcher: PartitionSearcher, context: ReaderContext) -> Self {
        SimpleIndexReader { searcher, context }
    }

    fn query(&self, query: &Query) -> Result<EntityIds> {
        let matches = matching_docs(&self.searcher, query);
        Ok(Box::new(MatchingEntityIds::new(vec![matches])))
    }
}

impl IndexReader for SimpleIndexReader {
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
        let mut collector = TotalHitCountCollector::new();
        self.searcher.search(&query, &mut collector)?;
        Ok(collector.total_hits())
    }

    fn all_docs(&self) -> Documents {
        Box::new(self.searcher.all_docs())
    }

    fn max_doc(&self) -> usize {
        self.searcher.max_doc() as usize
    }

    fn sample_index(&self) -> Result<IndexSample> {
        self.context.sample(slice::from_ref(&self.searcher))
    }

    fn verify_deferred_constraints(
        &self,
        accessor: &dyn PropertyAccessor,
        property_key_id: u32,
    ) -> Result<()> {
        self.context
            .verify(slice::from_ref(&self.searcher), accessor, property_key_id)
    }

    fn verify_deferred_constraints_for(
        &self,
        accessor: &dyn PropertyAccessor,
        property_key_id: u32,
        values: &[PropertyValue],
    ) -> Result<()> {
        self.context.verify_values(
            slice::from_ref(&self.searcher),
            accessor,
            property_key_id,
            values,
        )
    }

    fn close(self) {
        self.searcher.close();
    }
}
