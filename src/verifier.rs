//! Deferred verification of uniqueness constraints.
//!
//! The index alone cannot tell whether two entries sharing a term really
//! share a value: integers and floats are widened into one numeric field,
//! so distinct large integers may produce the same term. Candidates found
//! in the index are therefore checked against the true property values
//! served by a [`PropertyAccessor`].

use std::collections::BTreeMap;

use crate::error::{IndexEntryConflict, IndexError, Result};
use crate::lexical::collector::Collector;
use crate::lexical::document::Term;
use crate::lexical::query::Query;
use crate::lexical::searcher::PartitionSearcher;
use crate::lexical::segment::IndexSegment;
use crate::structure::{DocumentStructure, ENTITY_ID_KEY};
use crate::task::TaskControl;
use crate::value::PropertyValue;

/// Source of the current property values of entities.
pub trait PropertyAccessor: Send + Sync {
    fn property_value(&self, entity_id: u64, property_key_id: u32) -> Result<PropertyValue>;
}

/// Collector failing with [`IndexError::EntryConflict`] as soon as two
/// distinct entities with equal property values are collected.
pub struct DuplicateCheckingCollector<'a> {
    accessor: &'a dyn PropertyAccessor,
    structure: DocumentStructure,
    property_key_id: u32,
    seen: Vec<(u64, PropertyValue)>,
}

impl<'a> DuplicateCheckingCollector<'a> {
    pub fn new(accessor: &'a dyn PropertyAccessor, property_key_id: u32) -> Self {
        DuplicateCheckingCollector {
            accessor,
            structure: DocumentStructure::new(),
            property_key_id,
            seen: Vec::new(),
        }
    }

    /// Forget collected entities before checking the next candidate group.
    pub fn reset(&mut self) {
        self.seen.clear();
    }
}

impl Collector for DuplicateCheckingCollector<'_> {
    fn collect(&mut self, doc_id: u32, segment: &IndexSegment) -> Result<()> {
        let entity_id = segment
            .document(doc_id)
            .and_then(|doc| self.structure.entity_id(doc))
            .ok_or_else(|| IndexError::retrieval(doc_id, "document carries no entity id"))?;
        let value = self
            .accessor
            .property_value(entity_id, self.property_key_id)?;

        if let Some((existing, _)) = self
            .seen
            .iter()
            .find(|(id, seen)| *id != entity_id && seen.value_equals(&value))
        {
            return Err(IndexError::conflict(IndexEntryConflict {
                existing_entity_id: *existing,
                added_entity_id: entity_id,
                property_key_id: self.property_key_id,
                value,
            }));
        }
        self.seen.push((entity_id, value));
        Ok(())
    }
}

fn check_cancelled(control: &TaskControl) -> Result<()> {
    if control.is_cancelled() {
        return Err(IndexError::cancelled("index dropped while verifying constraints"));
    }
    Ok(())
}

/// Check every term shared by more than one live entry across `searchers`.
pub fn verify_deferred_constraints(
    searchers: &[PartitionSearcher],
    accessor: &dyn PropertyAccessor,
    property_key_id: u32,
    control: &TaskControl,
) -> Result<()> {
    let mut doc_freqs: BTreeMap<(&str, &[u8]), usize> = BTreeMap::new();
    for searcher in searchers {
        let segment = searcher.segment();
        for field in segment.field_names() {
            if field == ENTITY_ID_KEY {
                continue;
            }
            for entry in segment.terms(field) {
                let live = segment.live_count(entry.postings);
                if live > 0 {
                    *doc_freqs.entry((field, entry.term)).or_insert(0) += live;
                }
            }
        }
        check_cancelled(control)?;
    }

    let mut collector = DuplicateCheckingCollector::new(accessor, property_key_id);
    for ((field, term), _) in doc_freqs.into_iter().filter(|(_, freq)| *freq > 1) {
        check_cancelled(control)?;
        collector.reset();
        let query = Query::Term(Term::from_bytes(field, term.to_vec()));
        for searcher in searchers {
            searcher.search(&query, &mut collector)?;
        }
    }
    Ok(())
}

/// Check only the entries carrying one of `values`.
pub fn verify_deferred_constraints_for(
    searchers: &[PartitionSearcher],
    accessor: &dyn PropertyAccessor,
    property_key_id: u32,
    values: &[PropertyValue],
    control: &TaskControl,
) -> Result<()> {
    let structure = DocumentStructure::new();
    let mut collector = DuplicateCheckingCollector::new(accessor, property_key_id);
    for value in values {
        check_cancelled(control)?;
        collector.reset();
        let query = structure.new_seek_query(value);
        for searcher in searchers {
            searcher.search(&query, &mut collector)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexical::directory::IndexDirectory;
    use crate::lexical::searcher::SearcherManager;
    use crate::lexical::snapshot::SnapshotDeletionPolicy;
    use crate::lexical::writer::PartitionWriter;
    use crate::task::TaskCoordinator;
    use ahash::AHashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    struct MapAccessor(AHashMap<u64, PropertyValue>);

    impl PropertyAccessor for MapAccessor {
        fn property_value(&self, entity_id: u64, _property_key_id: u32) -> Result<PropertyValue> {
            self.0
                .get(&entity_id)
                .cloned()
                .ok_or_else(|| IndexError::not_found(format!("entity {entity_id}")))
        }
    }

    fn setup(temp_dir: &TempDir, entries: &[(u64, PropertyValue)]) -> (PartitionSearcher, MapAccessor) {
        let directory = IndexDirectory::open(temp_dir.path()).unwrap();
        let policy = Arc::new(SnapshotDeletionPolicy::new(directory.clone()));
        let writer = Arc::new(PartitionWriter::open(directory, policy).unwrap());
        let structure = DocumentStructure::new();
        for (id, value) in entries {
            writer
                .add_document(structure.document_representing_property(*id, value))
                .unwrap();
        }
        let searcher = SearcherManager::new(writer).acquire().unwrap();
        (searcher, MapAccessor(entries.iter().cloned().collect()))
    }

    #[test]
    fn test_duplicate_values_conflict() {
        let temp_dir = TempDir::new().unwrap();
        let (searcher, accessor) = setup(
            &temp_dir,
            &[(1, PropertyValue::from("x")), (2, PropertyValue::from("x"))],
        );
        let coordinator = TaskCoordinator::new(Duration::from_millis(1));
        let control = coordinator.new_instance();

        let err = verify_deferred_constraints(&[searcher], &accessor, 7, &control).unwrap_err();
        let conflict = err.as_conflict().unwrap();
        assert_eq!(conflict.existing_entity_id, 1);
        assert_eq!(conflict.added_entity_id, 2);
        assert_eq!(conflict.property_key_id, 7);
        assert_eq!(conflict.value, PropertyValue::from("x"));
    }

    #[test]
    fn test_numeric_collisions_are_not_conflicts() {
        let temp_dir = TempDir::new().unwrap();
        let big = 1i64 << 53;
        let (searcher, accessor) = setup(
            &temp_dir,
            &[(1, PropertyValue::Int(big)), (2, PropertyValue::Int(big + 1))],
        );
        let coordinator = TaskCoordinator::new(Duration::from_millis(1));
        let control = coordinator.new_instance();
        let searchers = [searcher];

        verify_deferred_constraints(&searchers, &accessor, 1, &control).unwrap();
        verify_deferred_constraints_for(
            &searchers,
            &accessor,
            1,
            &[PropertyValue::Int(big)],
            &control,
        )
        .unwrap();
    }

    #[test]
    fn test_accessor_failure_is_propagated_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let (searcher, _) = setup(
            &temp_dir,
            &[(1, PropertyValue::from("x")), (2, PropertyValue::from("x"))],
        );
        let empty = MapAccessor(AHashMap::new());
        let coordinator = TaskCoordinator::new(Duration::from_millis(1));
        let control = coordinator.new_instance();

        let err = verify_deferred_constraints_for(
            &[searcher],
            &empty,
            1,
            &[PropertyValue::from("x")],
            &control,
        )
        .unwrap_err();
        assert!(matches!(err, IndexError::NotFound(_)));
    }
}
