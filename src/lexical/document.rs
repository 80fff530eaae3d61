//! Documents and terms of the inverted index.

use std::collections::BTreeMap;

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

/// A single indexed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Untokenized string, indexed as one term.
    Keyword(String),
    /// Floating point value, indexed with an order-preserving encoding.
    Numeric(f64),
    /// Unsigned integer value, indexed with an order-preserving encoding.
    Long(u64),
}

impl FieldValue {
    /// Encode the value as the byte term stored in the term dictionary.
    ///
    /// Terms of the same kind sort in value order.
    pub fn to_term_bytes(&self) -> Vec<u8> {
        match self {
            FieldValue::Keyword(s) => s.as_bytes().to_vec(),
            FieldValue::Numeric(f) => encode_numeric(*f).to_vec(),
            FieldValue::Long(l) => encode_long(*l).to_vec(),
        }
    }

    pub fn as_long(&self) -> Option<u64> {
        match self {
            FieldValue::Long(l) => Some(*l),
            _ => None,
        }
    }
}

/// Sortable encoding of an `f64`: flips the sign bit of positives and all
/// bits of negatives so byte order equals numeric order.
pub fn encode_numeric(value: f64) -> [u8; 8] {
    // -0.0 and 0.0 must map to the same term
    let value = if value == 0.0 { 0.0 } else { value };
    let bits = value.to_bits();
    let sortable = if bits >> 63 == 1 { !bits } else { bits ^ (1 << 63) };
    let mut buf = [0u8; 8];
    BigEndian::write_u64(&mut buf, sortable);
    buf
}

pub fn encode_long(value: u64) -> [u8; 8] {
    let mut buf = [0u8; 8];
    BigEndian::write_u64(&mut buf, value);
    buf
}

/// A field name together with an encoded term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Term {
    pub field: String,
    pub bytes: Vec<u8>,
}

impl Term {
    pub fn new<S: Into<String>>(field: S, value: &FieldValue) -> Self {
        Term {
            field: field.into(),
            bytes: value.to_term_bytes(),
        }
    }

    pub fn from_bytes<S: Into<String>>(field: S, bytes: Vec<u8>) -> Self {
        Term {
            field: field.into(),
            bytes,
        }
    }
}

/// A document of the inverted index: a set of named, single-valued fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    fields: BTreeMap<String, FieldValue>,
}

impl IndexDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field addition.
    pub fn with_field<S: Into<String>>(mut self, name: S, value: FieldValue) -> Self {
        self.add_field(name, value);
        self
    }

    pub fn add_field<S: Into<String>>(&mut self, name: S, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_encoding_preserves_order() {
        let values = [-1.0e10, -3.5, -0.0, 0.0, 1.0e-9, 2.0, 7.25, 1.0e300];
        let encoded: Vec<[u8; 8]> = values.iter().map(|v| encode_numeric(*v)).collect();
        for pair in encoded.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert_eq!(encode_numeric(-0.0), encode_numeric(0.0));
    }

    #[test]
    fn test_document_terms() {
        let doc = IndexDocument::new()
            .with_field("id", FieldValue::Long(7))
            .with_field("string", FieldValue::Keyword("x".into()));

        let term = Term::new("string", &FieldValue::Keyword("x".into()));
        assert_eq!(term.bytes, b"x".to_vec());
        assert_eq!(Term::new("id", &FieldValue::Long(7)).bytes, encode_long(7).to_vec());
        assert_eq!(doc.get("id").and_then(FieldValue::as_long), Some(7));
        assert_eq!(doc.len(), 2);
    }
}
