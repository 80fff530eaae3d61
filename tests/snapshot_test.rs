mod common;

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use partitioned_index::{IndexConfig, IndexError};

use common::{entry, open_index};

#[test]
fn test_snapshot_lists_every_partition_and_pins_files() -> partitioned_index::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let index = open_index(temp_dir.path(), IndexConfig::default())?;
    index.add_new_partition()?;
    let partitions = index.partitions()?;
    partitions[0].writer().add_document(entry(1, "a"))?;
    partitions[1].writer().add_document(entry(2, "b"))?;
    index.flush()?;

    let mut snapshot = index.snapshot()?;
    assert!(partitions.iter().all(|p| p.open_snapshots() == 1));

    // A newer commit does not remove the pinned files
    partitions[0].writer().add_document(entry(3, "c"))?;
    index.flush()?;

    let files: Vec<PathBuf> = snapshot.by_ref().collect();
    assert_eq!(files.len(), 2);
    assert!(files[0].starts_with(partitions[0].folder()));
    assert!(files[1].starts_with(partitions[1].folder()));
    assert!(files.iter().all(|f| f.exists()));

    snapshot.close()?;
    assert!(partitions.iter().all(|p| p.open_snapshots() == 0));
    // The superseded commit of partition 1 goes away once released
    assert!(!files[0].exists());
    assert!(files[1].exists());

    index.close()?;
    Ok(())
}

#[test]
fn test_failed_snapshot_releases_acquired_partitions() -> partitioned_index::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let index = open_index(temp_dir.path(), IndexConfig::default())?;
    for _ in 0..3 {
        index.add_new_partition()?;
    }
    let partitions = index.partitions()?;
    assert_eq!(partitions.len(), 4);

    // Break the third partition by removing its commit files
    for file in fs::read_dir(partitions[2].folder())? {
        let path = file?.path();
        if path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("commit_"))
        {
            fs::remove_file(path)?;
        }
    }

    let err = index.snapshot().unwrap_err();
    assert!(matches!(err, IndexError::Io(_)), "unexpected error: {err}");
    for partition in partitions.iter() {
        assert_eq!(partition.open_snapshots(), 0);
    }

    // Healthy partitions can still be snapshotted individually
    let snapshot = partitions[0].snapshot()?;
    assert_eq!(partitions[0].open_snapshots(), 1);
    snapshot.close()?;
    index.close()?;
    Ok(())
}

#[test]
fn test_snapshot_requires_open_index() {
    let temp_dir = TempDir::new().unwrap();
    let index = open_index(temp_dir.path(), IndexConfig::default()).unwrap();
    index.close().unwrap();
    assert!(matches!(index.snapshot(), Err(IndexError::IllegalState(_))));
}
