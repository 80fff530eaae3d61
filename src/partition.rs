//! One physical partition of a partitioned index.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::lexical::directory::IndexDirectory;
use crate::lexical::searcher::{PartitionSearcher, SearcherManager};
use crate::lexical::snapshot::{PartitionSnapshot, SnapshotDeletionPolicy};
use crate::lexical::writer::PartitionWriter;

/// A partition owns a writer and a searcher manager over one directory.
#[derive(Debug)]
pub struct IndexPartition {
    folder: PathBuf,
    writer: Arc<PartitionWriter>,
    searcher_manager: SearcherManager,
    policy: Arc<SnapshotDeletionPolicy>,
}

impl IndexPartition {
    /// Open a partition on `directory`, located at `folder`.
    pub fn new(folder: PathBuf, directory: IndexDirectory) -> Result<Self> {
        let policy = Arc::new(SnapshotDeletionPolicy::new(directory.clone()));
        let writer = Arc::new(PartitionWriter::open(directory, policy.clone())?);
        let searcher_manager = SearcherManager::new(writer.clone());
        Ok(IndexPartition {
            folder,
            writer,
            searcher_manager,
            policy,
        })
    }

    /// Folder holding the partition files.
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Writer of the partition. Changes become visible to searchers after a refresh.
    pub fn writer(&self) -> &PartitionWriter {
        &self.writer
    }

    /// Acquire a searcher; the caller must close or drop it.
    pub fn acquire_searcher(&self) -> Result<PartitionSearcher> {
        self.searcher_manager.acquire()
    }

    /// Refresh the searcher view unless a refresh is running; `false` if skipped.
    pub fn maybe_refresh(&self) -> Result<bool> {
        self.searcher_manager.maybe_refresh()
    }

    /// Refresh the searcher view, waiting for a running refresh.
    pub fn maybe_refresh_blocking(&self) -> Result<()> {
        self.searcher_manager.maybe_refresh_blocking()
    }

    /// Snapshot of the files of the last commit.
    pub fn snapshot(&self) -> Result<PartitionSnapshot> {
        self.writer.snapshot()
    }

    /// Close the searcher manager and the writer, committing pending changes.
    pub fn close(&self) -> Result<()> {
        log::debug!("closing partition {}", self.folder.display());
        self.searcher_manager.close();
        self.writer.close()
    }

    /// Searchers acquired and not yet released.
    pub fn acquired_searchers(&self) -> usize {
        self.searcher_manager.acquired_count()
    }

    /// Snapshots taken and not yet closed.
    pub fn open_snapshots(&self) -> usize {
        self.policy.open_snapshots()
    }
}
