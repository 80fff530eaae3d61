#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use ahash::AHashMap;

use partitioned_index::lexical::IndexDocument;
use partitioned_index::{
    DocumentStructure, IndexConfig, IndexError, IndexSamplingConfig, PartitionedIndex,
    PartitionedIndexStorage, PropertyAccessor, PropertyValue, Result,
};

/// Prepare and open an index in `folder`.
pub fn open_index(folder: &Path, config: IndexConfig) -> Result<PartitionedIndex> {
    let storage = Arc::new(PartitionedIndexStorage::new(folder));
    let index = PartitionedIndex::new(storage, config, IndexSamplingConfig::default());
    index.prepare()?;
    index.open()?;
    Ok(index)
}

pub fn entry(entity_id: u64, value: impl Into<PropertyValue>) -> IndexDocument {
    DocumentStructure::new().document_representing_property(entity_id, &value.into())
}

/// Property values held in memory, keyed by entity id.
#[derive(Debug, Default)]
pub struct MapAccessor {
    values: AHashMap<u64, PropertyValue>,
}

impl MapAccessor {
    pub fn new(entries: &[(u64, PropertyValue)]) -> Self {
        MapAccessor {
            values: entries.iter().cloned().collect(),
        }
    }
}

impl PropertyAccessor for MapAccessor {
    fn property_value(&self, entity_id: u64, _property_key_id: u32) -> Result<PropertyValue> {
        self.values
            .get(&entity_id)
            .cloned()
            .ok_or_else(|| IndexError::not_found(format!("entity {entity_id}")))
    }
}
