//! Folder layout of a partitioned index.
//!
//! ```text
//! <index folder>/
//!     failure-message     fixed-size failure record
//!     1/                  partition 1
//!     2/                  partition 2
//!     ...
//! ```

use std::fmt;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::lexical::directory::IndexDirectory;

/// File name of the failure record inside the index folder.
pub const FAILURE_FILE_NAME: &str = "failure-message";

/// Size of the failure record. Longer messages are truncated.
pub const MAX_FAILURE_SIZE: usize = 16 * 1024;

/// Storage collaborator owning the on-disk layout of one index.
pub trait IndexStorage: Send + Sync + fmt::Debug {
    /// Remove anything at `folder` and create it empty.
    fn prepare_folder(&self, folder: &Path) -> Result<()>;

    fn index_folder(&self) -> &Path;

    /// Folder of partition `partition`, numbered from 1.
    fn partition_folder(&self, partition: usize) -> PathBuf;

    /// Open all partition directories, ordered by partition number.
    fn open_index_directories(&self) -> Result<Vec<(PathBuf, IndexDirectory)>>;

    fn open_directory(&self, folder: &Path) -> Result<IndexDirectory>;

    fn reserve_index_failure_storage(&self) -> Result<()>;

    fn store_index_failure(&self, failure: &str) -> Result<()>;

    /// The stored failure message, empty when none was stored.
    fn stored_index_failure(&self) -> Result<String>;

    /// Delete `folder` and everything below it.
    fn cleanup_folder(&self, folder: &Path) -> Result<()>;
}

/// Local file-system implementation of [`IndexStorage`].
#[derive(Debug, Clone)]
pub struct PartitionedIndexStorage {
    index_folder: PathBuf,
    failure_storage: FailureStorage,
}

impl PartitionedIndexStorage {
    /// Storage rooted at `index_folder`, with the failure record inside it.
    pub fn new<P: AsRef<Path>>(index_folder: P) -> Self {
        let index_folder = index_folder.as_ref().to_path_buf();
        let failure_storage = FailureStorage::new(&index_folder);
        PartitionedIndexStorage {
            index_folder,
            failure_storage,
        }
    }
}

impl IndexStorage for PartitionedIndexStorage {
    fn prepare_folder(&self, folder: &Path) -> Result<()> {
        self.cleanup_folder(folder)?;
        fs::create_dir_all(folder)?;
        Ok(())
    }

    fn index_folder(&self) -> &Path {
        &self.index_folder
    }

    fn partition_folder(&self, partition: usize) -> PathBuf {
        self.index_folder.join(partition.to_string())
    }

    fn open_index_directories(&self) -> Result<Vec<(PathBuf, IndexDirectory)>> {
        let mut partitions = Vec::new();
        for entry in fs::read_dir(&self.index_folder)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(number) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<usize>().ok())
            {
                partitions.push((number, entry.path()));
            }
        }
        partitions.sort_by_key(|(number, _)| *number);

        partitions
            .into_iter()
            .map(|(_, path)| {
                let directory = self.open_directory(&path)?;
                Ok((path, directory))
            })
            .collect()
    }

    fn open_directory(&self, folder: &Path) -> Result<IndexDirectory> {
        IndexDirectory::open(folder)
    }

    fn reserve_index_failure_storage(&self) -> Result<()> {
        self.failure_storage.reserve()
    }

    fn store_index_failure(&self, failure: &str) -> Result<()> {
        self.failure_storage.store(failure)
    }

    fn stored_index_failure(&self) -> Result<String> {
        self.failure_storage.load()
    }

    fn cleanup_folder(&self, folder: &Path) -> Result<()> {
        if folder.exists() {
            fs::remove_dir_all(folder)?;
            log::debug!("removed {}", folder.display());
        }
        Ok(())
    }
}

/// Fixed-size, zero-padded record of why an index failed.
#[derive(Debug, Clone)]
pub struct FailureStorage {
    path: PathBuf,
}

impl FailureStorage {
    pub fn new(folder: &Path) -> Self {
        FailureStorage {
            path: folder.join(FAILURE_FILE_NAME),
        }
    }

    /// Create the zero-filled record if it does not exist yet.
    pub fn reserve(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.write_padded(&[])
    }

    /// Overwrite the record with `failure`, truncated to the record size.
    pub fn store(&self, failure: &str) -> Result<()> {
        let message = truncate_to_char_boundary(failure, MAX_FAILURE_SIZE);
        if message.len() < failure.len() {
            log::warn!(
                "failure message of {} bytes truncated to {}",
                failure.len(),
                message.len()
            );
        }
        self.write_padded(message.as_bytes())
    }

    /// The stored message, or an empty string if none was stored.
    pub fn load(&self) -> Result<String> {
        if !self.path.exists() {
            return Ok(String::new());
        }
        let mut bytes = Vec::with_capacity(MAX_FAILURE_SIZE);
        fs::File::open(&self.path)?.read_to_end(&mut bytes)?;
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    fn write_padded(&self, message: &[u8]) -> Result<()> {
        let mut buf = vec![0u8; MAX_FAILURE_SIZE];
        buf[..message.len()].copy_from_slice(message);
        let mut file = fs::File::create(&self.path)?;
        file.write_all(&buf)?;
        file.sync_all()?;
        Ok(())
    }
}

fn truncate_to_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
