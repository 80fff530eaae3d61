//! Partition writer: buffers changes in memory and persists them as commits.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{IndexError, Result};
use crate::lexical::directory::{CommitPoint, IndexDirectory, commit_file_name};
use crate::lexical::document::{IndexDocument, Term};
use crate::lexical::query::Query;
use crate::lexical::segment::IndexSegment;
use crate::lexical::snapshot::{PartitionSnapshot, SnapshotDeletionPolicy};

#[derive(Debug)]
struct WriterState {
    /// Current content, committed and uncommitted.
    ///
    /// Shared with the searchers refreshed since the last change; the first
    /// change after a refresh copies it.
    segment: Arc<IndexSegment>,
    /// Bumped on every change to `segment`.
    version: u64,
    /// Version of `segment` at the last commit.
    committed_version: u64,
    /// Generation of the last commit.
    generation: u64,
    /// User data of the last commit.
    commit_data: BTreeMap<String, String>,
    /// User data to record with the next commit.
    pending_commit_data: Option<BTreeMap<String, String>>,
    closed: bool,
}

impl WriterState {
    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(IndexError::illegal_state("partition writer is closed"));
        }
        Ok(())
    }

    fn is_dirty(&self) -> bool {
        self.version != self.committed_version || self.pending_commit_data.is_some()
    }
}

/// Writer of one partition.
///
/// All methods take `&self`; changes are serialized by an internal lock.
/// Changes become visible to searchers on refresh and durable on commit.
#[derive(Debug)]
pub struct PartitionWriter {
    directory: IndexDirectory,
    policy: Arc<SnapshotDeletionPolicy>,
    state: Mutex<WriterState>,
}

impl PartitionWriter {
    /// Open the writer on the latest commit of `directory`, creating an
    /// initial empty commit for a fresh directory.
    pub fn open(directory: IndexDirectory, policy: Arc<SnapshotDeletionPolicy>) -> Result<Self> {
        directory.remove_temporary_files()?;
        let generations = directory.commit_generations()?;

        let commit = match generations.last() {
            Some(&latest) => directory.read_commit(latest)?,
            None => {
                let initial = CommitPoint {
                    generation: 1,
                    ..CommitPoint::default()
                };
                directory.write_commit(&initial)?;
                initial
            }
        };
        for &stale in generations.iter().filter(|g| **g < commit.generation) {
            log::debug!("removing stale commit generation {stale}");
            directory.delete_file(&commit_file_name(stale))?;
        }

        let state = WriterState {
            segment: Arc::new(IndexSegment::from_documents(commit.documents)),
            version: 0,
            committed_version: 0,
            generation: commit.generation,
            commit_data: commit.user_data,
            pending_commit_data: None,
            closed: false,
        };
        Ok(Self {
            directory,
            policy,
            state: Mutex::new(state),
        })
    }

    pub fn directory(&self) -> &IndexDirectory {
        &self.directory
    }

    /// Add a document, returning its id in the partition.
    pub fn add_document(&self, doc: IndexDocument) -> Result<u32> {
        let mut state = self.state.lock();
        state.check_open()?;
        let doc_id = Arc::make_mut(&mut state.segment).add_document(doc);
        state.version += 1;
        Ok(doc_id)
    }

    /// Add several documents atomically with respect to other writers.
    pub fn add_documents(&self, docs: impl IntoIterator<Item = IndexDocument>) -> Result<usize> {
        let mut state = self.state.lock();
        state.check_open()?;
        let mut docs = docs.into_iter().peekable();
        if docs.peek().is_none() {
            return Ok(0);
        }
        let segment = Arc::make_mut(&mut state.segment);
        let mut added = 0;
        for doc in docs {
            segment.add_document(doc);
            added += 1;
        }
        if added > 0 {
            state.version += 1;
        }
        Ok(added)
    }

    /// Replace every document carrying `term` with `doc`.
    pub fn update_document(&self, term: &Term, doc: IndexDocument) -> Result<()> {
        let mut state = self.state.lock();
        state.check_open()?;
        let segment = Arc::make_mut(&mut state.segment);
        segment.delete_term(term);
        segment.add_document(doc);
        state.version += 1;
        Ok(())
    }

    /// Delete every document carrying `term`, returning how many were deleted.
    pub fn delete_documents(&self, term: &Term) -> Result<usize> {
        let mut state = self.state.lock();
        state.check_open()?;
        if state.segment.postings(&term.field, &term.bytes).is_none() {
            return Ok(0);
        }
        let deleted = Arc::make_mut(&mut state.segment).delete_term(term);
        if deleted > 0 {
            state.version += 1;
        }
        Ok(deleted)
    }

    /// Delete every document matching `query`, returning how many were deleted.
    pub fn delete_documents_by_query(&self, query: &Query) -> Result<usize> {
        let mut state = self.state.lock();
        state.check_open()?;
        let matches = query.matching_docs(&state.segment);
        if matches.is_empty() {
            return Ok(0);
        }
        let segment = Arc::make_mut(&mut state.segment);
        let deleted = matches
            .into_iter()
            .filter(|doc| segment.delete(*doc))
            .count();
        if deleted > 0 {
            state.version += 1;
        }
        Ok(deleted)
    }

    /// Set the user data recorded with the next commit.
    pub fn set_commit_data(&self, data: BTreeMap<String, String>) -> Result<()> {
        let mut state = self.state.lock();
        state.check_open()?;
        state.pending_commit_data = Some(data);
        Ok(())
    }

    /// User data of the last commit.
    pub fn commit_data(&self) -> BTreeMap<String, String> {
        self.state.lock().commit_data.clone()
    }

    /// Persist the current content as a new commit generation.
    ///
    /// User data carries over from the previous commit unless replaced by
    /// [`PartitionWriter::set_commit_data`].
    pub fn commit(&self) -> Result<u64> {
        let mut state = self.state.lock();
        state.check_open()?;
        self.commit_locked(&mut state)
    }

    fn commit_locked(&self, state: &mut WriterState) -> Result<u64> {
        let user_data = state
            .pending_commit_data
            .clone()
            .unwrap_or_else(|| state.commit_data.clone());
        let previous = state.generation;
        let commit = CommitPoint {
            generation: previous + 1,
            user_data,
            documents: state
                .segment
                .live_documents()
                .map(|(_, doc)| doc.clone())
                .collect(),
        };
        self.directory.write_commit(&commit)?;

        state.generation = commit.generation;
        state.commit_data = commit.user_data;
        state.pending_commit_data = None;
        state.committed_version = state.version;
        self.policy.on_superseded(previous)?;
        log::debug!(
            "committed generation {} with {} document(s) in {}",
            state.generation,
            commit.documents.len(),
            self.directory.path().display()
        );
        Ok(state.generation)
    }

    /// Pin the last commit and list its files.
    pub fn snapshot(&self) -> Result<PartitionSnapshot> {
        let state = self.state.lock();
        state.check_open()?;
        let name = commit_file_name(state.generation);
        let path = self.directory.file_path(&name);
        // metadata() surfaces a missing or unreadable commit as an I/O error
        std::fs::metadata(&path)?;
        self.policy.pin(state.generation);
        Ok(PartitionSnapshot::new(
            self.policy.clone(),
            state.generation,
            vec![path],
        ))
    }

    /// The current content if it changed since `version`.
    pub fn changes_since(&self, version: u64) -> Result<Option<(u64, Arc<IndexSegment>)>> {
        let state = self.state.lock();
        state.check_open()?;
        if state.version == version {
            return Ok(None);
        }
        Ok(Some((state.version, state.segment.clone())))
    }

    /// Current content and its version.
    pub fn current(&self) -> (u64, Arc<IndexSegment>) {
        let state = self.state.lock();
        (state.version, state.segment.clone())
    }

    /// Document slots used, deleted documents included.
    pub fn max_doc(&self) -> usize {
        self.state.lock().segment.max_doc() as usize
    }

    /// Number of live documents.
    pub fn num_docs(&self) -> usize {
        self.state.lock().segment.num_docs()
    }

    /// Generation of the last commit.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub fn has_uncommitted_changes(&self) -> bool {
        self.state.lock().is_dirty()
    }

    /// Commit pending changes and close. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        let result = if state.is_dirty() {
            self.commit_locked(&mut state).map(|_| ())
        } else {
            Ok(())
        };
        state.closed = true;
        result
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
