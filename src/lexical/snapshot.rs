//! Commit pinning for online backup.
//!
//! While a [`PartitionSnapshot`] is open, the files of its commit generation
//! are not deleted, even if newer commits supersede it. Deletion of a
//! superseded generation is deferred until its last pin is released.

use std::path::PathBuf;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;

use crate::error::Result;
use crate::lexical::directory::{IndexDirectory, commit_file_name};

#[derive(Debug, Default)]
struct PolicyState {
    pins: AHashMap<u64, usize>,
    superseded: AHashSet<u64>,
}

/// Tracks pinned commit generations of one directory.
#[derive(Debug)]
pub struct SnapshotDeletionPolicy {
    directory: IndexDirectory,
    state: Mutex<PolicyState>,
}

impl SnapshotDeletionPolicy {
    pub fn new(directory: IndexDirectory) -> Self {
        Self {
            directory,
            state: Mutex::new(PolicyState::default()),
        }
    }

    /// Keep the files of `generation` until a matching release.
    pub fn pin(&self, generation: u64) {
        *self.state.lock().pins.entry(generation).or_insert(0) += 1;
    }

    /// Release one pin, deleting the generation if it was superseded meanwhile.
    pub fn release(&self, generation: u64) -> Result<()> {
        let mut state = self.state.lock();
        let remaining = match state.pins.get_mut(&generation) {
            Some(count) => {
                *count -= 1;
                *count
            }
            None => return Ok(()),
        };
        if remaining == 0 {
            state.pins.remove(&generation);
            if state.superseded.remove(&generation) {
                self.delete_generation(generation)?;
            }
        }
        Ok(())
    }

    /// A newer commit replaced `generation`: delete it now unless pinned.
    pub fn on_superseded(&self, generation: u64) -> Result<()> {
        let mut state = self.state.lock();
        if state.pins.contains_key(&generation) {
            state.superseded.insert(generation);
            Ok(())
        } else {
            self.delete_generation(generation)
        }
    }

    /// Number of currently open pins across all generations.
    pub fn open_snapshots(&self) -> usize {
        self.state.lock().pins.values().sum()
    }

    fn delete_generation(&self, generation: u64) -> Result<()> {
        let name = commit_file_name(generation);
        if self.directory.file_exists(&name) {
            self.directory.delete_file(&name)?;
        }
        Ok(())
    }
}

/// The files of one pinned partition commit.
///
/// Iterating yields each file path once. The pin is released by
/// [`PartitionSnapshot::close`], or on drop if never closed.
#[derive(Debug)]
pub struct PartitionSnapshot {
    policy: Arc<SnapshotDeletionPolicy>,
    generation: u64,
    files: std::vec::IntoIter<PathBuf>,
    released: bool,
}

impl PartitionSnapshot {
    pub(crate) fn new(
        policy: Arc<SnapshotDeletionPolicy>,
        generation: u64,
        files: Vec<PathBuf>,
    ) -> Self {
        Self {
            policy,
            generation,
            files: files.into_iter(),
            released: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Release the pin, deleting the files if the commit was superseded meanwhile.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.policy.release(self.generation)
    }
}

impl Iterator for PartitionSnapshot {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        self.files.next()
    }
}

impl Drop for PartitionSnapshot {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!(
                "failed to release snapshot of generation {}: {e}",
                self.generation
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexical::directory::CommitPoint;
    use tempfile::TempDir;

    fn write_generation(directory: &IndexDirectory, generation: u64) {
        directory
            .write_commit(&CommitPoint {
                generation,
                ..CommitPoint::default()
            })
            .unwrap();
    }

    #[test]
    fn test_superseded_generation_survives_until_released() {
        let temp_dir = TempDir::new().unwrap();
        let directory = IndexDirectory::open(temp_dir.path()).unwrap();
        let policy = Arc::new(SnapshotDeletionPolicy::new(directory.clone()));
        write_generation(&directory, 1);

        policy.pin(1);
        let snapshot =
            PartitionSnapshot::new(policy.clone(), 1, vec![directory.file_path("commit_000001.seg")]);
        write_generation(&directory, 2);
        policy.on_superseded(1).unwrap();

        assert_eq!(directory.commit_generations().unwrap(), vec![1, 2]);
        assert_eq!(policy.open_snapshots(), 1);

        snapshot.close().unwrap();
        assert_eq!(policy.open_snapshots(), 0);
        assert_eq!(directory.commit_generations().unwrap(), vec![2]);
    }

    #[test]
    fn test_drop_releases_pin() {
        let temp_dir = TempDir::new().unwrap();
        let directory = IndexDirectory::open(temp_dir.path()).unwrap();
        let policy = Arc::new(SnapshotDeletionPolicy::new(directory.clone()));
        write_generation(&directory, 1);

        policy.pin(1);
        {
            let mut snapshot = PartitionSnapshot::new(policy.clone(), 1, vec![PathBuf::from("a")]);
            assert_eq!(snapshot.next(), Some(PathBuf::from("a")));
            assert_eq!(snapshot.next(), None);
        }
        assert_eq!(policy.open_snapshots(), 0);

        policy.on_superseded(1).unwrap();
        assert!(directory.commit_generations().unwrap().is_empty());
    }
}
