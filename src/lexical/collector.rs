//! Collectors receive the matches of a query one document at a time.

use crate::error::Result;
use crate::lexical::segment::IndexSegment;

/// Receives matching documents from a search.
///
/// Returning an error from [`Collector::collect`] aborts the search and is
/// propagated unchanged to the caller of the search.
pub trait Collector {
    /// Collect a matching document.
    fn collect(&mut self, doc_id: u32, segment: &IndexSegment) -> Result<()>;

    /// Whether the collector wants further documents.
    fn needs_more(&self) -> bool {
        true
    }
}

/// Counts matches.
#[derive(Debug, Default)]
pub struct TotalHitCountCollector {
    total_hits: usize,
}

impl TotalHitCountCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_hits(&self) -> usize {
        self.total_hits
    }
}

impl Collector for TotalHitCountCollector {
    fn collect(&mut self, _doc_id: u32, _segment: &IndexSegment) -> Result<()> {
        self.total_hits += 1;
        Ok(())
    }
}

/// Run `query` over `segment`, feeding matches to `collector`.
pub fn search<C: Collector + ?Sized>(
    segment: &IndexSegment,
    query: &crate::lexical::query::Query,
    collector: &mut C,
) -> Result<()> {
    for doc_id in query.matching_docs(segment) {
        collector.collect(doc_id, segment)?;
        if !collector.needs_more() {
            break;
        }
    }
    Ok(())
}
