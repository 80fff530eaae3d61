//! Mapping between property values and index documents.
//!
//! Each indexed entity is one document with two fields: the entity id under
//! [`ENTITY_ID_KEY`] and the property value under a field chosen by the
//! value's kind. Integers and floats share the numeric field.

use std::ops::Bound;

use serde_json::Value as JsonValue;

use crate::lexical::document::{FieldValue, IndexDocument, Term, encode_numeric};
use crate::lexical::query::Query;
use crate::value::PropertyValue;

/// Field holding the entity id.
pub const ENTITY_ID_KEY: &str = "id";
/// Field indexing string values.
pub const STRING_FIELD: &str = "string";
/// Field indexing numeric values widened to `f64`.
pub const NUMBER_FIELD: &str = "number";
/// Field indexing boolean values.
pub const BOOL_FIELD: &str = "bool";
/// Field indexing array values as one JSON term.
pub const ARRAY_FIELD: &str = "array";

/// Builds documents and queries for schema index entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentStructure;

impl DocumentStructure {
    pub fn new() -> Self {
        DocumentStructure
    }

    /// Document representing `value` as a property of `entity_id`.
    pub fn document_representing_property(
        &self,
        entity_id: u64,
        value: &PropertyValue,
    ) -> IndexDocument {
        let (field, field_value) = value_field(value);
        IndexDocument::new()
            .with_field(ENTITY_ID_KEY, FieldValue::Long(entity_id))
            .with_field(field, field_value)
    }

    /// Entity id stored in `doc`.
    pub fn entity_id(&self, doc: &IndexDocument) -> Option<u64> {
        doc.get(ENTITY_ID_KEY).and_then(FieldValue::as_long)
    }

    /// Exact match on a property value.
    pub fn new_seek_query(&self, value: &PropertyValue) -> Query {
        let (field, field_value) = value_field(value);
        Query::Term(Term::new(field, &field_value))
    }

    /// Numeric values within `[lower, upper]`; a missing bound is open.
    pub fn new_inclusive_numeric_range_seek_query(
        &self,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> Query {
        let bound = |value: Option<f64>| match value {
            Some(v) => Bound::Included(encode_numeric(v).to_vec()),
            None => Bound::Unbounded,
        };
        Query::range(NUMBER_FIELD, bound(lower), bound(upper))
    }

    /// String values between `lower` and `upper`; a missing bound is open.
    pub fn new_range_seek_by_string_query(
        &self,
        lower: Option<&str>,
        include_lower: bool,
        upper: Option<&str>,
        include_upper: bool,
    ) -> Query {
        let bound = |value: Option<&str>, inclusive: bool| match value {
            Some(v) if inclusive => Bound::Included(v.as_bytes().to_vec()),
            Some(v) => Bound::Excluded(v.as_bytes().to_vec()),
            None => Bound::Unbounded,
        };
        Query::range(
            STRING_FIELD,
            bound(lower, include_lower),
            bound(upper, include_upper),
        )
    }

    /// String values starting with `prefix`.
    pub fn new_range_seek_by_prefix_query(&self, prefix: &str) -> Query {
        Query::prefix(STRING_FIELD, prefix.as_bytes().to_vec())
    }

    /// Every indexed entry.
    pub fn new_scan_query(&self) -> Query {
        Query::All
    }

    /// Term identifying the documents of `entity_id`.
    pub fn new_term_for_change_or_remove(&self, entity_id: u64) -> Term {
        Term::new(ENTITY_ID_KEY, &FieldValue::Long(entity_id))
    }

    /// Entries of `entity_id` carrying `value`.
    pub fn new_entity_and_value_query(&self, entity_id: u64, value: &PropertyValue) -> Query {
        Query::must(vec![
            Query::Term(self.new_term_for_change_or_remove(entity_id)),
            self.new_seek_query(value),
        ])
    }
}

fn value_field(value: &PropertyValue) -> (&'static str, FieldValue) {
    match value {
        PropertyValue::Bool(b) => (BOOL_FIELD, FieldValue::Keyword(b.to_string())),
        PropertyValue::String(s) => (STRING_FIELD, FieldValue::Keyword(s.clone())),
        PropertyValue::Array(_) => (ARRAY_FIELD, FieldValue::Keyword(array_term(value).to_string())),
        numeric => (
            NUMBER_FIELD,
            FieldValue::Numeric(numeric.as_number().unwrap_or(f64::NAN)),
        ),
    }
}

// Numbers inside arrays are widened the same way scalar numbers are.
fn array_term(value: &PropertyValue) -> JsonValue {
    match value {
        PropertyValue::Bool(b) => JsonValue::Bool(*b),
        PropertyValue::Int(i) => JsonValue::from(*i as f64),
        PropertyValue::Float(f) => JsonValue::from(*f),
        PropertyValue::String(s) => JsonValue::String(s.clone()),
        PropertyValue::Array(values) => JsonValue::Array(values.iter().map(array_term).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexical::segment::IndexSegment;

    fn segment(entries: &[(u64, PropertyValue)]) -> IndexSegment {
        let structure = DocumentStructure::new();
        IndexSegment::from_documents(
            entries
                .iter()
                .map(|(id, value)| structure.document_representing_property(*id, value)),
        )
    }

    #[test]
    fn test_ints_and_floats_share_the_numeric_field() {
        let structure = DocumentStructure::new();
        let segment = segment(&[(1, PropertyValue::Int(3)), (2, PropertyValue::Float(3.0))]);

        let query = structure.new_seek_query(&PropertyValue::Int(3));
        assert_eq!(query.matching_docs(&segment), vec![0, 1]);

        let doc = segment.document(1).unwrap();
        assert_eq!(structure.entity_id(doc), Some(2));
    }

    #[test]
    fn test_range_queries() {
        let structure = DocumentStructure::new();
        let segment = segment(&[
            (1, PropertyValue::from("apple")),
            (2, PropertyValue::from("banana")),
            (3, PropertyValue::from("cherry")),
            (4, PropertyValue::Int(-1)),
            (5, PropertyValue::Float(7.5)),
        ]);

        let exclusive = structure.new_range_seek_by_string_query(
            Some("apple"),
            false,
            Some("cherry"),
            true,
        );
        assert_eq!(exclusive.matching_docs(&segment), vec![1, 2]);

        let open = structure.new_range_seek_by_string_query(None, true, None, true);
        assert_eq!(open.matching_docs(&segment), vec![0, 1, 2]);

        let numbers = structure.new_inclusive_numeric_range_seek_query(Some(-1.0), None);
        assert_eq!(numbers.matching_docs(&segment), vec![3, 4]);

        let prefix = structure.new_range_seek_by_prefix_query("ba");
        assert_eq!(prefix.matching_docs(&segment), vec![1]);
    }

    #[test]
    fn test_arrays_widen_numbers() {
        let structure = DocumentStructure::new();
        let segment = segment(&[(
            1,
            PropertyValue::Array(vec![PropertyValue::Int(1), PropertyValue::from("a")]),
        )]);
        let query = structure.new_seek_query(&PropertyValue::Array(vec![
            PropertyValue::Float(1.0),
            PropertyValue::from("a"),
        ]));
        assert_eq!(query.matching_docs(&segment), vec![0]);
    }

    #[test]
    fn test_entity_and_value_query() {
        let structure = DocumentStructure::new();
        let segment = segment(&[(1, PropertyValue::from("x")), (2, PropertyValue::from("x"))]);
        let query = structure.new_entity_and_value_query(2, &PropertyValue::from("x"));
        assert_eq!(query.matching_docs(&segment), vec![1]);
    }
}
