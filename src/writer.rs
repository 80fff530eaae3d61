//! Write handle fanning changes across the partitions of an index.

use crate::error::{IndexError, Result};
use crate::index::PartitionedIndex;
use crate::lexical::document::IndexDocument;
use crate::lexical::query::Query;
use crate::structure::DocumentStructure;

/// Writer obtained from [`PartitionedIndex::writer`].
///
/// New documents go to a partition with room for them; a new partition is
/// added when none has. Deletes apply to every partition.
#[derive(Debug)]
pub struct PartitionedIndexWriter<'a> {
    index: &'a PartitionedIndex,
    structure: DocumentStructure,
}

impl<'a> PartitionedIndexWriter<'a> {
    pub(crate) fn new(index: &'a PartitionedIndex) -> Self {
        PartitionedIndexWriter {
            index,
            structure: DocumentStructure::new(),
        }
    }

    /// Add one document to a partition with room for it.
    pub fn add_document(&self, doc: IndexDocument) -> Result<()> {
        self.index.add_to_partition_with_space(vec![doc])?;
        Ok(())
    }

    /// Add a batch of documents to a single partition.
    pub fn add_documents(&self, docs: Vec<IndexDocument>) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        self.index.add_to_partition_with_space(docs)?;
        Ok(())
    }

    /// Replace the documents of `entity_id` with `doc`.
    pub fn update_document(&self, entity_id: u64, doc: IndexDocument) -> Result<()> {
        let term = self.structure.new_term_for_change_or_remove(entity_id);
        let Some(doc) = self.index.update_in_single_partition(&term, doc)? else {
            return Ok(());
        };
        self.delete_documents(entity_id)?;
        self.add_document(doc)
    }

    /// Delete the documents of `entity_id` from every partition.
    pub fn delete_documents(&self, entity_id: u64) -> Result<()> {
        let term = self.structure.new_term_for_change_or_remove(entity_id);
        for partition in self.index.partitions()?.iter() {
            partition.writer().delete_documents(&term)?;
        }
        Ok(())
    }

    /// Delete documents matching `query` from every partition.
    pub fn delete_documents_by_query(&self, query: &Query) -> Result<()> {
        if matches!(query, Query::Boolean(clauses) if clauses.is_empty()) {
            return Err(IndexError::invalid_argument(
                "an empty boolean query matches no documents",
            ));
        }
        for partition in self.index.partitions()?.iter() {
            partition.writer().delete_documents_by_query(query)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IndexConfig, IndexSamplingConfig};
    use crate::reader::IndexReader;
    use crate::storage::PartitionedIndexStorage;
    use crate::value::PropertyValue;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn open_index(temp_dir: &TempDir, max_partition_size: usize) -> PartitionedIndex {
        let storage = Arc::new(PartitionedIndexStorage::new(temp_dir.path()));
        let config = IndexConfig::new().with_max_partition_size(max_partition_size);
        let index = PartitionedIndex::new(storage, config, IndexSamplingConfig::default());
        index.prepare().unwrap();
        index.open().unwrap();
        index
    }

    fn entry(id: u64, value: &str) -> IndexDocument {
        DocumentStructure::new().document_representing_property(id, &PropertyValue::from(value))
    }

    #[test]
    fn test_full_partitions_trigger_new_partition() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_index(&temp_dir, 2);
        let writer = index.writer().unwrap();
        for id in 1..=5 {
            writer.add_document(entry(id, "v")).unwrap();
        }
        assert_eq!(index.partitions().unwrap().len(), 3);

        writer
            .add_documents(vec![entry(6, "w"), entry(7, "w")])
            .unwrap();
        assert_eq!(index.partitions().unwrap().len(), 4);
        assert!(writer.add_documents(vec![entry(8, "x"); 3]).is_err());
        index.close().unwrap();
    }

    #[test]
    fn test_update_and_delete_across_partitions() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_index(&temp_dir, 1);
        let writer = index.writer().unwrap();
        writer.add_document(entry(1, "a")).unwrap();
        writer.add_document(entry(2, "b")).unwrap();
        writer.update_document(1, entry(1, "c")).unwrap();
        writer.delete_documents(2).unwrap();
        index.maybe_refresh_blocking().unwrap();

        let reader = index.reader().unwrap();
        assert!(reader.seek(&PropertyValue::from("a")).unwrap().next().is_none());
        assert_eq!(reader.seek(&PropertyValue::from("c")).unwrap().collect::<Vec<_>>(), vec![1]);
        assert_eq!(reader.scan().unwrap().collect::<Vec<_>>(), vec![1]);
        reader.close();
        index.close().unwrap();
    }

    #[test]
    fn test_delete_by_query() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_index(&temp_dir, 100);
        let writer = index.writer().unwrap();
        for (id, value) in [(1, "apple"), (2, "apricot"), (3, "banana")] {
            writer.add_document(entry(id, value)).unwrap();
        }
        let structure = DocumentStructure::new();
        writer
            .delete_documents_by_query(&structure.new_range_seek_by_prefix_query("ap"))
            .unwrap();
        assert!(writer.delete_documents_by_query(&Query::must(vec![])).is_err());
        index.maybe_refresh_blocking().unwrap();

        let reader = index.reader().unwrap();
        assert_eq!(reader.scan().unwrap().collect::<Vec<_>>(), vec![3]);
        reader.close();
        index.close().unwrap();
    }
}
