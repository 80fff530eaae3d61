//! Queries executed against an [`IndexSegment`].

use std::ops::Bound;

use crate::lexical::document::Term;
use crate::lexical::segment::IndexSegment;

/// A query over the inverted index.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Documents carrying an exact term.
    Term(Term),
    /// Documents with a term of `field` inside the bounds.
    Range {
        field: String,
        lower: Bound<Vec<u8>>,
        upper: Bound<Vec<u8>>,
    },
    /// Documents with a term of `field` starting with `prefix`.
    Prefix { field: String, prefix: Vec<u8> },
    /// Every live document.
    All,
    /// Documents matching all clauses. No clauses match nothing.
    Boolean(Vec<Query>),
}

impl Query {
    pub fn range<S: Into<String>>(field: S, lower: Bound<Vec<u8>>, upper: Bound<Vec<u8>>) -> Self {
        Query::Range {
            field: field.into(),
            lower,
            upper,
        }
    }

    pub fn prefix<S: Into<String>>(field: S, prefix: Vec<u8>) -> Self {
        Query::Prefix {
            field: field.into(),
            prefix,
        }
    }

    pub fn must(clauses: Vec<Query>) -> Self {
        Query::Boolean(clauses)
    }

    /// Ids of live documents matching the query, ascending and unique.
    pub fn matching_docs(&self, segment: &IndexSegment) -> Vec<u32> {
        let mut docs = match self {
            Query::Term(term) => segment
                .postings(&term.field, &term.bytes)
                .map(<[u32]>::to_vec)
                .unwrap_or_default(),
            Query::Range {
                field,
                lower,
                upper,
            } => segment
                .term_range(field, as_ref_bound(lower), as_ref_bound(upper))
                .into_iter()
                .flat_map(|entry| entry.postings.iter().copied())
                .collect(),
            Query::Prefix { field, prefix } => segment
                .term_range(field, Bound::Included(prefix.as_slice()), Bound::Unbounded)
                .into_iter()
                .take_while(|entry| entry.term.starts_with(prefix))
                .flat_map(|entry| entry.postings.iter().copied())
                .collect(),
            Query::All => (0..segment.max_doc()).collect(),
            Query::Boolean(clauses) => return intersect_all(clauses, segment),
        };
        docs.retain(|doc| segment.is_live(*doc));
        docs.sort_unstable();
        docs.dedup();
        docs
    }
}

fn as_ref_bound(bound: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(v) => Bound::Included(v.as_slice()),
        Bound::Excluded(v) => Bound::Excluded(v.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

fn intersect_all(clauses: &[Query], segment: &IndexSegment) -> Vec<u32> {
    let mut iter = clauses.iter();
    let mut result = match iter.next() {
        Some(first) => first.matching_docs(segment),
        None => return Vec::new(),
    };
    for clause in iter {
        if result.is_empty() {
            break;
        }
        let other = clause.matching_docs(segment);
        result = intersect_sorted(&result, &other);
    }
    result
}

fn intersect_sorted(a: &[u32], b: &[u32]) -> Vec<u32> {
    let (mut i, mut j) = (0, 0);
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexical::document::{FieldValue, IndexDocument, encode_numeric};

    fn segment() -> IndexSegment {
        let docs = [
            (1u64, FieldValue::Keyword("apple".into())),
            (2, FieldValue::Keyword("apricot".into())),
            (3, FieldValue::Keyword("banana".into())),
            (4, FieldValue::Numeric(10.0)),
            (5, FieldValue::Numeric(-2.5)),
        ];
        IndexSegment::from_documents(docs.into_iter().map(|(id, value)| {
            let field = match value {
                FieldValue::Keyword(_) => "string",
                _ => "number",
            };
            IndexDocument::new()
                .with_field("id", FieldValue::Long(id))
                .with_field(field, value)
        }))
    }

    #[test]
    fn test_prefix_and_range_queries() {
        let segment = segment();

        let prefix = Query::prefix("string", b"ap".to_vec());
        assert_eq!(prefix.matching_docs(&segment), vec![0, 1]);

        let range = Query::range(
            "number",
            Bound::Included(encode_numeric(-5.0).to_vec()),
            Bound::Included(encode_numeric(10.0).to_vec()),
        );
        assert_eq!(range.matching_docs(&segment), vec![3, 4]);

        let inverted = Query::range(
            "number",
            Bound::Included(encode_numeric(10.0).to_vec()),
            Bound::Included(encode_numeric(-5.0).to_vec()),
        );
        assert!(inverted.matching_docs(&segment).is_empty());
    }

    #[test]
    fn test_boolean_and_deleted_documents() {
        let mut segment = segment();
        let apple = Query::Term(Term::new("string", &FieldValue::Keyword("apple".into())));
        let id_one = Query::Term(Term::new("id", &FieldValue::Long(1)));
        let id_two = Query::Term(Term::new("id", &FieldValue::Long(2)));

        assert_eq!(
            Query::must(vec![apple.clone(), id_one]).matching_docs(&segment),
            vec![0]
        );
        assert!(
            Query::must(vec![apple, id_two])
                .matching_docs(&segment)
                .is_empty()
        );
        assert!(Query::must(vec![]).matching_docs(&segment).is_empty());

        segment.delete(0);
        assert_eq!(Query::All.matching_docs(&segment), vec![1, 2, 3, 4]);
    }
}
