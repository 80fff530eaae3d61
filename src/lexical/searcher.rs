//! Near-real-time searchers over a partition writer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::error::{IndexError, Result};
use crate::lexical::collector::{self, Collector};
use crate::lexical::document::IndexDocument;
use crate::lexical::query::Query;
use crate::lexical::segment::IndexSegment;
use crate::lexical::writer::PartitionWriter;

/// Hands out point-in-time searchers and refreshes them from the writer.
#[derive(Debug)]
pub struct SearcherManager {
    writer: Arc<PartitionWriter>,
    /// Writer version the current view was taken at, and the view itself.
    current: RwLock<(u64, Arc<IndexSegment>)>,
    refresh_lock: Mutex<()>,
    acquired: Arc<AtomicUsize>,
    closed: AtomicBool,
}

impl SearcherManager {
    pub fn new(writer: Arc<PartitionWriter>) -> Self {
        let (version, segment) = writer.current();
        Self {
            writer,
            current: RwLock::new((version, segment)),
            refresh_lock: Mutex::new(()),
            acquired: Arc::new(AtomicUsize::new(0)),
            closed: AtomicBool::new(false),
        }
    }

    /// Acquire a searcher over the current view. It must be closed or dropped.
    pub fn acquire(&self) -> Result<PartitionSearcher> {
        if self.closed.load(Ordering::Acquire) {
            return Err(IndexError::illegal_state("searcher manager is closed"));
        }
        let segment = self.current.read().1.clone();
        self.acquired.fetch_add(1, Ordering::AcqRel);
        Ok(PartitionSearcher {
            segment,
            acquired: self.acquired.clone(),
        })
    }

    /// Refresh unless another thread is already refreshing.
    ///
    /// Returns `false` when the refresh was skipped for that reason.
    pub fn maybe_refresh(&self) -> Result<bool> {
        match self.refresh_lock.try_lock() {
            Some(_guard) => {
                self.refresh()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Refresh, waiting for a concurrent refresh to finish first.
    pub fn maybe_refresh_blocking(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock();
        self.refresh()
    }

    fn refresh(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(IndexError::illegal_state("searcher manager is closed"));
        }
        let version = self.current.read().0;
        if let Some((version, segment)) = self.writer.changes_since(version)? {
            *self.current.write() = (version, segment);
        }
        Ok(())
    }

    /// Searchers acquired and not yet released.
    pub fn acquired_count(&self) -> usize {
        self.acquired.load(Ordering::Acquire)
    }

    /// Stop handing out searchers. Already acquired searchers stay usable.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// A point-in-time view over one partition.
///
/// Later writes are not visible. Releasing happens on [`PartitionSearcher::close`]
/// or drop.
#[derive(Debug)]
pub struct PartitionSearcher {
    segment: Arc<IndexSegment>,
    acquired: Arc<AtomicUsize>,
}

impl PartitionSearcher {
    pub fn segment(&self) -> &IndexSegment {
        &self.segment
    }

    /// The view itself, for results that are resolved after the search.
    pub(crate) fn shared_segment(&self) -> Arc<IndexSegment> {
        self.segment.clone()
    }

    pub fn max_doc(&self) -> u32 {
        self.segment.max_doc()
    }

    pub fn num_docs(&self) -> usize {
        self.segment.num_docs()
    }

    pub fn search<C: Collector + ?Sized>(&self, query: &Query, collector: &mut C) -> Result<()> {
        collector::search(&self.segment, query, collector)
    }

    /// Stored document of a live id.
    pub fn document(&self, doc_id: u32) -> Result<&IndexDocument> {
        document_at(&self.segment, doc_id)
    }

    /// All live documents, in id order.
    pub fn all_docs(&self) -> LiveDocuments {
        LiveDocuments {
            segment: self.segment.clone(),
            next: 0,
        }
    }

    /// Release the searcher.
    pub fn close(self) {}
}

impl Drop for PartitionSearcher {
    fn drop(&mut self) {
        self.acquired.fetch_sub(1, Ordering::AcqRel);
    }
}

fn document_at(segment: &IndexSegment, doc_id: u32) -> Result<&IndexDocument> {
    if !segment.is_live(doc_id) {
        return Err(IndexError::retrieval(doc_id, "document is deleted"));
    }
    segment
        .document(doc_id)
        .ok_or_else(|| IndexError::retrieval(doc_id, "document is missing from segment"))
}

/// Iterator over the live documents of a searcher view.
#[derive(Debug)]
pub struct LiveDocuments {
    segment: Arc<IndexSegment>,
    next: u32,
}

impl Iterator for LiveDocuments {
    type Item = Result<IndexDocument>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.segment.max_doc() {
            let doc_id = self.next;
            self.next += 1;
            if self.segment.is_live(doc_id) {
                return Some(document_at(&self.segment, doc_id).cloned());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexical::directory::IndexDirectory;
    use crate::lexical::document::{FieldValue, Term};
    use crate::lexical::snapshot::SnapshotDeletionPolicy;
    use tempfile::TempDir;

    fn manager(temp_dir: &TempDir) -> (Arc<PartitionWriter>, SearcherManager) {
        let directory = IndexDirectory::open(temp_dir.path()).unwrap();
        let policy = Arc::new(SnapshotDeletionPolicy::new(directory.clone()));
        let writer = Arc::new(PartitionWriter::open(directory, policy).unwrap());
        let manager = SearcherManager::new(writer.clone());
        (writer, manager)
    }

    fn doc(id: u64) -> IndexDocument {
        IndexDocument::new().with_field("id", FieldValue::Long(id))
    }

    #[test]
    fn test_refresh_makes_writes_visible_to_new_searchers() {
        let temp_dir = TempDir::new().unwrap();
        let (writer, manager) = manager(&temp_dir);

        let before = manager.acquire().unwrap();
        writer.add_document(doc(1)).unwrap();
        assert_eq!(manager.acquire().unwrap().num_docs(), 0);

        assert!(manager.maybe_refresh().unwrap());
        let after = manager.acquire().unwrap();
        assert_eq!(after.num_docs(), 1);
        assert_eq!(before.num_docs(), 0);
    }

    #[test]
    fn test_acquired_count_tracks_releases() {
        let temp_dir = TempDir::new().unwrap();
        let (_writer, manager) = manager(&temp_dir);

        let first = manager.acquire().unwrap();
        let second = manager.acquire().unwrap();
        assert_eq!(manager.acquired_count(), 2);
        first.close();
        drop(second);
        assert_eq!(manager.acquired_count(), 0);

        manager.close();
        assert!(matches!(
            manager.acquire(),
            Err(IndexError::IllegalState(_))
        ));
    }

    #[test]
    fn test_all_docs_skips_deleted_documents() {
        let temp_dir = TempDir::new().unwrap();
        let (writer, manager) = manager(&temp_dir);
        for id in 1..=3 {
            writer.add_document(doc(id)).unwrap();
        }
        writer
            .delete_documents(&Term::new("id", &FieldValue::Long(2)))
            .unwrap();
        manager.maybe_refresh_blocking().unwrap();

        let searcher = manager.acquire().unwrap();
        let ids: Vec<u64> = searcher
            .all_docs()
            .map(|doc| doc.unwrap().get("id").and_then(FieldValue::as_long).unwrap())
            .collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(matches!(
            searcher.document(1),
            Err(IndexError::Retrieval { doc_id: 1, .. })
        ));
    }
}
