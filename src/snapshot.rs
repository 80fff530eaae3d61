//! Online backup snapshot over all partitions of an index.

use std::path::PathBuf;

use crate::error::{Result, close_all};
use crate::lexical::snapshot::PartitionSnapshot;

/// Files of every partition's last commit, partition by partition.
///
/// All partition commits stay pinned until the iterator is closed or
/// dropped, so the listed files remain present while they are copied.
#[derive(Debug)]
pub struct SnapshotIterator {
    snapshots: Vec<PartitionSnapshot>,
    position: usize,
}

impl SnapshotIterator {
    /// Iterate the files of `snapshots` in partition order.
    pub fn new(snapshots: Vec<PartitionSnapshot>) -> Self {
        SnapshotIterator {
            snapshots,
            position: 0,
        }
    }

    /// Release every partition snapshot, attempting all of them.
    pub fn close(self) -> Result<()> {
        close_all(self.snapshots, PartitionSnapshot::close)
    }
}

impl Iterator for SnapshotIterator {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        while let Some(snapshot) = self.snapshots.get_mut(self.position) {
            if let Some(file) = snapshot.next() {
                return Some(file);
            }
            self.position += 1;
        }
        None
    }
}
