//! The partitioned index: an ordered set of partitions behind one logical index.
//!
//! # Locking
//!
//! Two mutexes guard disjoint concerns:
//!
//! - `read_write_lock` guards the shape and currency of the partition list:
//!   adding a partition, refreshing searchers and acquiring readers.
//! - `commit_close_lock` guards lifecycle transitions and durable commits:
//!   close, drop, marking online, flush and snapshot.
//!
//! When both are needed, `commit_close_lock` is taken first.
//!
//! The partition list itself is copy-on-write: readers clone the current
//! `Arc` and never observe a half-appended list.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::config::{IndexConfig, IndexSamplingConfig};
use crate::error::{IndexError, Result, close_all};
use crate::lexical::document::{IndexDocument, Term};
use crate::lexical::snapshot::PartitionSnapshot;
use crate::partition::IndexPartition;
use crate::reader::{
    PartitionedIndexReader, ReaderContext, SchemaIndexReader, SimpleIndexReader,
};
use crate::snapshot::SnapshotIterator;
use crate::storage::IndexStorage;
use crate::task::TaskCoordinator;
use crate::writer::PartitionedIndexWriter;

/// Commit data key recording the index status.
pub const STATUS_KEY: &str = "status";
/// Value of [`STATUS_KEY`] once population finished.
pub const ONLINE: &str = "online";

/// Snapshot of the partition list.
pub type Partitions = Arc<Vec<Arc<IndexPartition>>>;

/// A logical schema index made of numbered partitions.
///
/// Constructed closed. Call [`PartitionedIndex::prepare`] once for a new
/// index, then [`PartitionedIndex::open`].
#[derive(Debug)]
pub struct PartitionedIndex {
    storage: Arc<dyn IndexStorage>,
    config: Arc<IndexConfig>,
    sampling_config: Arc<IndexSamplingConfig>,
    partitions: RwLock<Partitions>,
    open: AtomicBool,
    read_write_lock: Mutex<()>,
    commit_close_lock: Mutex<()>,
    task_coordinator: TaskCoordinator,
}

impl PartitionedIndex {
    /// Create a closed index over `storage`.
    pub fn new(
        storage: Arc<dyn IndexStorage>,
        config: IndexConfig,
        sampling_config: IndexSamplingConfig,
    ) -> Self {
        let task_coordinator = TaskCoordinator::new(config.task_poll_interval());
        PartitionedIndex {
            storage,
            config: Arc::new(config),
            sampling_config: Arc::new(sampling_config),
            partitions: RwLock::new(Arc::new(Vec::new())),
            open: AtomicBool::new(false),
            read_write_lock: Mutex::new(()),
            commit_close_lock: Mutex::new(()),
            task_coordinator,
        }
    }

    /// Configuration the index was created with.
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Coordinator tracking the sampling and verification tasks of this index.
    pub fn task_coordinator(&self) -> &TaskCoordinator {
        &self.task_coordinator
    }

    /// Create the index folder, the failure record and the first partition folder.
    ///
    /// Any previous content of the index folder is removed.
    pub fn prepare(&self) -> Result<()> {
        let index_folder = self.storage.index_folder();
        self.storage.prepare_folder(index_folder)?;
        self.storage.reserve_index_failure_storage()?;
        self.storage
            .prepare_folder(&self.storage.partition_folder(1))?;
        log::info!("prepared index at {}", index_folder.display());
        Ok(())
    }

    /// Open every partition found in the index folder.
    pub fn open(&self) -> Result<()> {
        let _guard = self.read_write_lock.lock();
        if self.is_open() {
            return Err(IndexError::illegal_state("index is already open"));
        }

        let mut partitions = Vec::new();
        for (folder, directory) in self.storage.open_index_directories()? {
            match IndexPartition::new(folder, directory) {
                Ok(partition) => partitions.push(Arc::new(partition)),
                Err(e) => {
                    return Err(match close_all(&partitions, |p| p.close()) {
                        Ok(()) => e,
                        Err(close_error) => e.with_cause(close_error),
                    });
                }
            }
        }

        log::info!(
            "opened index at {} with {} partition(s)",
            self.storage.index_folder().display(),
            partitions.len()
        );
        *self.partitions.write() = Arc::new(partitions);
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    /// Whether [`PartitionedIndex::open`] succeeded and no close or drop followed.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Whether the index folder holds at least one partition.
    pub fn exists(&self) -> Result<bool> {
        if !self.storage.index_folder().is_dir() {
            return Ok(false);
        }
        Ok(!self.storage.open_index_directories()?.is_empty())
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.is_open() {
            return Err(IndexError::illegal_state(
                "Please open index before working with it.",
            ));
        }
        Ok(())
    }

    fn current_partitions(&self) -> Partitions {
        self.partitions.read().clone()
    }

    /// The partitions as of now, in partition order.
    pub fn partitions(&self) -> Result<Partitions> {
        self.ensure_open()?;
        Ok(self.current_partitions())
    }

    /// A fresh writer handle for this index.
    pub fn writer(&self) -> Result<PartitionedIndexWriter<'_>> {
        self.ensure_open()?;
        Ok(PartitionedIndexWriter::new(self))
    }

    /// Refresh the searchers of every partition, skipping partitions
    /// already being refreshed.
    pub fn maybe_refresh(&self) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.read_write_lock.lock();
        self.ensure_open()?;
        for partition in self.current_partitions().iter() {
            partition.maybe_refresh()?;
        }
        Ok(())
    }

    /// Refresh the searchers of every partition, waiting for running refreshes.
    pub fn maybe_refresh_blocking(&self) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.read_write_lock.lock();
        self.ensure_open()?;
        for partition in self.current_partitions().iter() {
            partition.maybe_refresh_blocking()?;
        }
        Ok(())
    }

    /// Append a new partition numbered one past the last.
    pub fn add_new_partition(&self) -> Result<Arc<IndexPartition>> {
        self.ensure_open()?;
        let _guard = self.read_write_lock.lock();
        self.ensure_open()?;
        self.add_partition_locked()
    }

    // Caller holds read_write_lock and has checked the index is open.
    fn add_partition_locked(&self) -> Result<Arc<IndexPartition>> {
        let current = self.current_partitions();
        let folder = self.storage.partition_folder(current.len() + 1);
        let directory = self.storage.open_directory(&folder)?;
        let partition = Arc::new(IndexPartition::new(folder, directory)?);

        let mut partitions = Vec::with_capacity(current.len() + 1);
        partitions.extend(current.iter().cloned());
        partitions.push(partition.clone());
        *self.partitions.write() = Arc::new(partitions);

        log::debug!("added partition {}", partition.folder().display());
        Ok(partition)
    }

    /// Add `docs` to the first partition with room for all of them, adding
    /// a partition if none has.
    ///
    /// Choosing the partition and appending happen under `read_write_lock`,
    /// so concurrent writers never overfill a partition.
    pub fn add_to_partition_with_space(
        &self,
        docs: Vec<IndexDocument>,
    ) -> Result<Arc<IndexPartition>> {
        self.ensure_open()?;
        let documents = docs.len();
        if documents > self.config.max_partition_size {
            return Err(IndexError::invalid_argument(format!(
                "{documents} documents exceed the partition size of {}",
                self.config.max_partition_size
            )));
        }
        let _guard = self.read_write_lock.lock();
        self.ensure_open()?;
        let found = self
            .current_partitions()
            .iter()
            .find(|p| self.has_space(p, documents))
            .cloned();
        let partition = match found {
            Some(partition) => partition,
            None => self.add_partition_locked()?,
        };
        partition.writer().add_documents(docs)?;
        Ok(partition)
    }

    /// Replace the documents carrying `term` in place when the index has a
    /// single partition with room for `doc`.
    ///
    /// Hands `doc` back when the update has to be split into a delete and
    /// an add instead.
    pub(crate) fn update_in_single_partition(
        &self,
        term: &Term,
        doc: IndexDocument,
    ) -> Result<Option<IndexDocument>> {
        self.ensure_open()?;
        let _guard = self.read_write_lock.lock();
        self.ensure_open()?;
        match self.current_partitions().as_slice() {
            [partition] if self.has_space(partition, 1) => {
                partition.writer().update_document(term, doc)?;
                Ok(None)
            }
            _ => Ok(Some(doc)),
        }
    }

    fn has_space(&self, partition: &IndexPartition, documents: usize) -> bool {
        partition.writer().max_doc() + documents <= self.config.max_partition_size
    }

    /// A reader over the partitions present now.
    ///
    /// A single partition gets a [`SimpleIndexReader`], several get a
    /// merging [`PartitionedIndexReader`]. The reader must be closed.
    pub fn reader(&self) -> Result<SchemaIndexReader> {
        self.ensure_open()?;
        let _guard = self.read_write_lock.lock();
        self.ensure_open()?;
        let partitions = self.current_partitions();
        let context = ReaderContext::new(
            self.config.clone(),
            self.sampling_config.clone(),
            self.task_coordinator.clone(),
        );

        if let [partition] = partitions.as_slice() {
            let searcher = partition.acquire_searcher()?;
            return Ok(SchemaIndexReader::Simple(SimpleIndexReader::new(
                searcher, context,
            )));
        }
        // Searchers acquired before a failure are released on drop.
        let searchers = partitions
            .iter()
            .map(|partition| partition.acquire_searcher())
            .collect::<Result<Vec<_>>>()?;
        Ok(SchemaIndexReader::Partitioned(PartitionedIndexReader::new(
            searchers, context,
        )))
    }

    /// Record in the first partition that population finished, and commit.
    pub fn mark_as_online(&self) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.commit_close_lock.lock();
        self.ensure_open()?;
        let partitions = self.current_partitions();
        let first = partitions
            .first()
            .ok_or_else(|| IndexError::illegal_state("index has no partitions"))?;
        let mut commit_data: BTreeMap<String, String> = first.writer().commit_data();
        commit_data.insert(STATUS_KEY.to_string(), ONLINE.to_string());
        first.writer().set_commit_data(commit_data)?;
        first.writer().commit()?;
        log::info!(
            "index at {} marked online",
            self.storage.index_folder().display()
        );
        Ok(())
    }

    /// Whether [`PartitionedIndex::mark_as_online`] was committed.
    pub fn is_online(&self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self
            .current_partitions()
            .first()
            .and_then(|p| p.writer().commit_data().get(STATUS_KEY).cloned())
            .is_some_and(|status| status == ONLINE))
    }

    /// Persist why population failed.
    pub fn mark_as_failed(&self, failure: &str) -> Result<()> {
        log::warn!(
            "index at {} failed: {failure}",
            self.storage.index_folder().display()
        );
        self.storage.store_index_failure(failure)
    }

    /// The failure message stored by [`PartitionedIndex::mark_as_failed`].
    pub fn stored_index_failure(&self) -> Result<String> {
        self.storage.stored_index_failure()
    }

    /// Commit pending changes of every partition.
    pub fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.commit_close_lock.lock();
        self.ensure_open()?;
        for partition in self.current_partitions().iter() {
            if partition.writer().has_uncommitted_changes() {
                partition.writer().commit()?;
            }
        }
        Ok(())
    }

    /// Close every partition. Closing a closed index does nothing.
    pub fn close(&self) -> Result<()> {
        let _guard = self.commit_close_lock.lock();
        self.close_locked()
    }

    // Caller holds commit_close_lock.
    fn close_locked(&self) -> Result<()> {
        let partitions = {
            let _guard = self.read_write_lock.lock();
            self.open.store(false, Ordering::Release);
            std::mem::take(&mut *self.partitions.write())
        };
        let result = close_all(partitions.iter(), |p| p.close());
        if let Err(e) = &result {
            log::warn!("failed to close index partitions: {e}");
        } else if !partitions.is_empty() {
            log::debug!("closed {} partition(s)", partitions.len());
        }
        result
    }

    /// Cancel running tasks, wait for them, close and delete the index folder.
    ///
    /// The index must not be used afterwards. If running tasks do not finish
    /// within the drop timeout, cancellation is lifted again and the index
    /// stays open and usable.
    pub fn drop(&self) -> Result<()> {
        let _guard = self.commit_close_lock.lock();
        self.task_coordinator.cancel();
        if let Err(e) = self
            .task_coordinator
            .await_completion(self.config.drop_timeout())
        {
            self.task_coordinator.reset();
            log::warn!("drop of {} interrupted: {e}", self.storage.index_folder().display());
            return Err(IndexError::Io(io::Error::new(io::ErrorKind::Interrupted, e)));
        }
        self.close_locked()?;
        self.storage.cleanup_folder(self.storage.index_folder())?;
        log::info!(
            "dropped index at {}",
            self.storage.index_folder().display()
        );
        Ok(())
    }

    /// Pin the last commit of every partition and list its files.
    ///
    /// If a partition fails, the snapshots already taken are released
    /// before the error is returned.
    pub fn snapshot(&self) -> Result<SnapshotIterator> {
        self.ensure_open()?;
        let _guard = self.commit_close_lock.lock();
        self.ensure_open()?;
        let partitions = self.current_partitions();
        let mut snapshots = Vec::with_capacity(partitions.len());
        for partition in partitions.iter() {
            match partition.snapshot() {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => {
                    log::warn!(
                        "snapshot of partition {} failed: {e}",
                        partition.folder().display()
                    );
                    return Err(match close_all(snapshots, PartitionSnapshot::close) {
                        Ok(()) => e,
                        Err(close_error) => e.with_cause(close_error),
                    });
                }
            }
        }
        Ok(SnapshotIterator::new(snapshots))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PartitionedIndexStorage;
    use tempfile::TempDir;

    fn index(temp_dir: &TempDir) -> PartitionedIndex {
        let storage = Arc::new(PartitionedIndexStorage::new(temp_dir.path().join("index")));
        PartitionedIndex::new(storage, IndexConfig::default(), IndexSamplingConfig::default())
    }

    #[test]
    fn test_operations_on_closed_index_fail() {
        let temp_dir = TempDir::new().unwrap();
        let index = index(&temp_dir);
        index.prepare().unwrap();

        assert!(matches!(index.reader(), Err(IndexError::IllegalState(_))));
        assert!(matches!(index.writer(), Err(IndexError::IllegalState(_))));
        assert!(matches!(
            index.add_new_partition(),
            Err(IndexError::IllegalState(_))
        ));
        index.close().unwrap();
    }

    #[test]
    fn test_open_twice_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let index = index(&temp_dir);
        index.prepare().unwrap();
        index.open().unwrap();
        assert!(matches!(index.open(), Err(IndexError::IllegalState(_))));

        index.close().unwrap();
        index.open().unwrap();
        assert_eq!(index.partitions().unwrap().len(), 1);
        index.close().unwrap();
    }

    #[test]
    fn test_online_status_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let index = index(&temp_dir);
        index.prepare().unwrap();
        index.open().unwrap();
        assert!(!index.is_online().unwrap());

        index.mark_as_online().unwrap();
        assert!(index.is_online().unwrap());
        index.close().unwrap();

        index.open().unwrap();
        assert!(index.is_online().unwrap());
        index.close().unwrap();
    }

    #[test]
    fn test_failure_message() {
        let temp_dir = TempDir::new().unwrap();
        let index = index(&temp_dir);
        index.prepare().unwrap();
        assert_eq!(index.stored_index_failure().unwrap(), "");
        index.mark_as_failed("out of disk").unwrap();
        assert_eq!(index.stored_index_failure().unwrap(), "out of disk");
    }

    #[test]
    fn test_exists() {
        let temp_dir = TempDir::new().unwrap();
        let index = index(&temp_dir);
        assert!(!index.exists().unwrap());
        index.prepare().unwrap();
        assert!(index.exists().unwrap());
    }
}
