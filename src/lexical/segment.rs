//! In-memory segment: stored documents, live-docs bitmap and term dictionary.

use std::collections::BTreeMap;
use std::ops::Bound;

use ahash::AHashMap;
use bit_vec::BitVec;

use crate::lexical::document::{IndexDocument, Term};

/// Postings of one field, keyed by encoded term.
pub type TermDictionary = BTreeMap<Vec<u8>, Vec<u32>>;

/// One term of a field's dictionary.
#[derive(Debug, Clone, Copy)]
pub struct TermEntry<'a> {
    pub term: &'a [u8],
    pub postings: &'a [u32],
}

/// A point-in-time index segment.
///
/// Document ids are slot positions and are never reused within a segment.
/// Deleting a document only clears its live bit; postings keep referencing
/// it until the segment is rebuilt from a commit.
#[derive(Debug, Clone, Default)]
pub struct IndexSegment {
    documents: Vec<IndexDocument>,
    live_docs: BitVec,
    fields: AHashMap<String, TermDictionary>,
    deleted: usize,
}

impl IndexSegment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a segment holding the given documents, all live.
    pub fn from_documents(documents: impl IntoIterator<Item = IndexDocument>) -> Self {
        let mut segment = Self::new();
        for doc in documents {
            segment.add_document(doc);
        }
        segment
    }

    /// Append a document and return its id.
    pub fn add_document(&mut self, doc: IndexDocument) -> u32 {
        let doc_id = self.documents.len() as u32;
        for (name, value) in doc.fields() {
            self.fields
                .entry(name.to_string())
                .or_default()
                .entry(value.to_term_bytes())
                .or_default()
                .push(doc_id);
        }
        self.documents.push(doc);
        self.live_docs.push(true);
        doc_id
    }

    /// Mark a document deleted. Returns `false` if it was not live.
    pub fn delete(&mut self, doc_id: u32) -> bool {
        if !self.is_live(doc_id) {
            return false;
        }
        self.live_docs.set(doc_id as usize, false);
        self.deleted += 1;
        true
    }

    /// Delete every live document carrying `term`, returning how many were deleted.
    pub fn delete_term(&mut self, term: &Term) -> usize {
        let postings = match self.postings(&term.field, &term.bytes) {
            Some(postings) => postings.to_vec(),
            None => return 0,
        };
        postings.into_iter().filter(|doc| self.delete(*doc)).count()
    }

    /// Number of document slots, deleted ones included.
    pub fn max_doc(&self) -> u32 {
        self.documents.len() as u32
    }

    /// Number of live documents.
    pub fn num_docs(&self) -> usize {
        self.documents.len() - self.deleted
    }

    /// Whether `doc_id` names a document that is not deleted.
    pub fn is_live(&self, doc_id: u32) -> bool {
        self.live_docs.get(doc_id as usize).unwrap_or(false)
    }

    /// Stored document for a slot, live or not.
    pub fn document(&self, doc_id: u32) -> Option<&IndexDocument> {
        self.documents.get(doc_id as usize)
    }

    /// Live documents in id order.
    pub fn live_documents(&self) -> impl Iterator<Item = (u32, &IndexDocument)> {
        self.documents
            .iter()
            .enumerate()
            .filter(|(i, _)| self.live_docs.get(*i).unwrap_or(false))
            .map(|(i, doc)| (i as u32, doc))
    }

    /// Names of all indexed fields, sorted.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Enumerate the term dictionary of a field in term order.
    pub fn terms<'a>(&'a self, field: &str) -> impl Iterator<Item = TermEntry<'a>> + use<'a> {
        self.fields
            .get(field)
            .into_iter()
            .flat_map(|dict| dict.iter())
            .map(|(term, postings)| TermEntry {
                term: term.as_slice(),
                postings: postings.as_slice(),
            })
    }

    /// Sorted ids of every document carrying a term, deleted ones included.
    pub fn postings(&self, field: &str, term: &[u8]) -> Option<&[u32]> {
        self.fields
            .get(field)
            .and_then(|dict| dict.get(term))
            .map(Vec::as_slice)
    }

    /// Number of live documents among `postings`.
    pub fn live_count(&self, postings: &[u32]) -> usize {
        postings.iter().filter(|doc| self.is_live(**doc)).count()
    }

    /// Terms of a field within the given bounds, in term order.
    pub fn term_range<'a>(
        &'a self,
        field: &str,
        lower: Bound<&'a [u8]>,
        upper: Bound<&'a [u8]>,
    ) -> Vec<TermEntry<'a>> {
        if !valid_range(lower, upper) {
            return Vec::new();
        }
        match self.fields.get(field) {
            Some(dict) => dict
                .range::<[u8], _>((lower, upper))
                .map(|(term, postings)| TermEntry {
                    term: term.as_slice(),
                    postings: postings.as_slice(),
                })
                .collect(),
            None => Vec::new(),
        }
    }
}

// BTreeMap::range panics on inverted or empty-exclusive ranges.
fn valid_range(lower: Bound<&[u8]>, upper: Bound<&[u8]>) -> bool {
    match (lower, upper) {
        (Bound::Included(l), Bound::Included(u)) => l <= u,
        (Bound::Included(l), Bound::Excluded(u)) | (Bound::Excluded(l), Bound::Included(u)) => {
            l < u
        }
        (Bound::Excluded(l), Bound::Excluded(u)) => l < u,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexical::document::FieldValue;

    fn keyword_doc(id: u64, value: &str) -> IndexDocument {
        IndexDocument::new()
            .with_field("id", FieldValue::Long(id))
            .with_field("string", FieldValue::Keyword(value.to_string()))
    }

    #[test]
    fn test_deletion_keeps_postings_but_clears_live_bit() {
        let mut segment = IndexSegment::from_documents(vec![
            keyword_doc(1, "a"),
            keyword_doc(2, "a"),
            keyword_doc(3, "b"),
        ]);
        assert_eq!(segment.num_docs(), 3);

        assert!(segment.delete(1));
        assert!(!segment.delete(1));
        assert!(!segment.delete(42));

        assert_eq!(segment.num_docs(), 2);
        assert_eq!(segment.max_doc(), 3);
        assert_eq!(segment.postings("string", b"a"), Some(&[0, 1][..]));
        assert_eq!(segment.live_count(&[0, 1]), 1);
        assert_eq!(
            segment.live_documents().map(|(id, _)| id).collect::<Vec<_>>(),
            vec![0, 2]
        );
    }

    #[test]
    fn test_delete_term() {
        let mut segment =
            IndexSegment::from_documents(vec![keyword_doc(1, "a"), keyword_doc(1, "b")]);
        let term = Term::new("id", &FieldValue::Long(1));
        assert_eq!(segment.delete_term(&term), 2);
        assert_eq!(segment.delete_term(&term), 0);
        assert_eq!(segment.num_docs(), 0);
    }

    #[test]
    fn test_term_range_tolerates_inverted_bounds() {
        let segment = IndexSegment::from_documents(vec![
            keyword_doc(1, "apple"),
            keyword_doc(2, "banana"),
            keyword_doc(3, "cherry"),
        ]);
        let terms = segment.term_range(
            "string",
            Bound::Included(b"b".as_slice()),
            Bound::Excluded(b"c".as_slice()),
        );
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].term, b"banana");

        let empty = segment.term_range(
            "string",
            Bound::Excluded(b"x".as_slice()),
            Bound::Excluded(b"x".as_slice()),
        );
        assert!(empty.is_empty());
        assert_eq!(segment.field_names(), vec!["id", "string"]);
    }
}
