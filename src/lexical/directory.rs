//! File-system directory holding one partition's commit files.
//!
//! ## File format
//!
//! Every commit is one file `commit_NNNNNN.seg`:
//! `[u32: magic][u32: crc32 of payload][u64: payload length][payload: json CommitPoint]`,
//! integers little-endian. Files are written to a temporary name, synced,
//! then renamed into place.
//!
//! A commit holds every live document of the partition, so committing costs
//! time proportional to the partition size. Partitions are bounded by
//! `IndexConfig::max_partition_size`, which bounds that cost as well.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::lexical::document::IndexDocument;

const COMMIT_MAGIC: u32 = 0x5049_4458;
const COMMIT_HEADER_SIZE: usize = 16;
const COMMIT_PREFIX: &str = "commit_";
const COMMIT_SUFFIX: &str = ".seg";
const TMP_SUFFIX: &str = ".tmp";

/// Durable state of a partition at one commit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitPoint {
    pub generation: u64,
    /// Opaque key-value pairs recorded with the commit.
    pub user_data: BTreeMap<String, String>,
    pub documents: Vec<IndexDocument>,
}

/// File name of the commit of `generation`.
pub fn commit_file_name(generation: u64) -> String {
    format!("{COMMIT_PREFIX}{generation:06}{COMMIT_SUFFIX}")
}

/// Generation of a commit file name, `None` for other files.
pub fn parse_commit_generation(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix(COMMIT_PREFIX)?
        .strip_suffix(COMMIT_SUFFIX)?
        .parse()
        .ok()
}

/// A directory of index files.
#[derive(Debug, Clone)]
pub struct IndexDirectory {
    path: PathBuf,
}

impl IndexDirectory {
    /// Open a directory, creating it if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    pub fn file_exists(&self, name: &str) -> bool {
        self.file_path(name).is_file()
    }

    /// Names of regular files in the directory, sorted.
    pub fn list_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_file()
                && let Some(name) = entry.file_name().to_str()
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn delete_file(&self, name: &str) -> Result<()> {
        fs::remove_file(self.file_path(name))?;
        Ok(())
    }

    /// Generations of all commit files present, ascending.
    pub fn commit_generations(&self) -> Result<Vec<u64>> {
        let mut generations: Vec<u64> = self
            .list_files()?
            .iter()
            .filter_map(|name| parse_commit_generation(name))
            .collect();
        generations.sort_unstable();
        Ok(generations)
    }

    /// Write a commit point atomically and return its file name.
    pub fn write_commit(&self, commit: &CommitPoint) -> Result<String> {
        let payload = serde_json::to_vec(commit)?;
        let mut buf = Vec::with_capacity(payload.len() + COMMIT_HEADER_SIZE);
        buf.write_u32::<LittleEndian>(COMMIT_MAGIC)?;
        buf.write_u32::<LittleEndian>(crc32fast::hash(&payload))?;
        buf.write_u64::<LittleEndian>(payload.len() as u64)?;
        buf.extend_from_slice(&payload);

        let name = commit_file_name(commit.generation);
        let tmp_name = format!("{name}{TMP_SUFFIX}");
        {
            let mut file = fs::File::create(self.file_path(&tmp_name))?;
            file.write_all(&buf)?;
            file.sync_all()?;
        }
        fs::rename(self.file_path(&tmp_name), self.file_path(&name))?;
        Ok(name)
    }

    /// Read and validate the commit point of a generation.
    pub fn read_commit(&self, generation: u64) -> Result<CommitPoint> {
        let name = commit_file_name(generation);
        let bytes = fs::read(self.file_path(&name))?;
        if bytes.len() < COMMIT_HEADER_SIZE {
            return Err(IndexError::corrupted(format!(
                "{name}: truncated header of {} bytes",
                bytes.len()
            )));
        }
        let (header, payload) = bytes.split_at(COMMIT_HEADER_SIZE);
        let mut cursor = Cursor::new(header);

        let magic = cursor.read_u32::<LittleEndian>()?;
        if magic != COMMIT_MAGIC {
            return Err(IndexError::corrupted(format!("{name}: bad magic {magic:#x}")));
        }
        let checksum = cursor.read_u32::<LittleEndian>()?;
        let len = cursor.read_u64::<LittleEndian>()?;
        if len != payload.len() as u64 {
            return Err(IndexError::corrupted(format!(
                "{name}: expected {len} payload bytes, found {}",
                payload.len()
            )));
        }
        if crc32fast::hash(payload) != checksum {
            return Err(IndexError::corrupted(format!("{name}: checksum mismatch")));
        }

        let commit: CommitPoint = serde_json::from_slice(payload)?;
        if commit.generation != generation {
            return Err(IndexError::corrupted(format!(
                "{name}: contains generation {}",
                commit.generation
            )));
        }
        Ok(commit)
    }

    /// Remove leftovers of interrupted commits.
    pub fn remove_temporary_files(&self) -> Result<()> {
        for name in self.list_files()? {
            if name.ends_with(TMP_SUFFIX) {
                self.delete_file(&name)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexical::document::FieldValue;
    use tempfile::TempDir;

    #[test]
    fn test_commit_file_names() {
        assert_eq!(commit_file_name(12), "commit_000012.seg");
        assert_eq!(parse_commit_generation("commit_000012.seg"), Some(12));
        assert_eq!(parse_commit_generation("commit_000012.seg.tmp"), None);
        assert_eq!(parse_commit_generation("failure-message"), None);
    }

    #[test]
    fn test_corrupted_commit_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let directory = IndexDirectory::open(temp_dir.path().join("1")).unwrap();
        let commit = CommitPoint {
            generation: 3,
            user_data: BTreeMap::new(),
            documents: vec![IndexDocument::new().with_field("id", FieldValue::Long(1))],
        };
        let name = directory.write_commit(&commit).unwrap();
        assert_eq!(directory.commit_generations().unwrap(), vec![3]);
        assert_eq!(directory.read_commit(3).unwrap().documents.len(), 1);

        let path = directory.file_path(&name);
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 2;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        let err = directory.read_commit(3).unwrap_err();
        assert!(matches!(err, IndexError::Corrupted(_)));
    }

    #[test]
    fn test_bad_header_length_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let directory = IndexDirectory::open(temp_dir.path()).unwrap();
        let path = directory.file_path(&commit_file_name(1));

        let mut bytes = Vec::new();
        bytes.write_u32::<LittleEndian>(COMMIT_MAGIC).unwrap();
        bytes.write_u32::<LittleEndian>(0).unwrap();
        bytes.write_u64::<LittleEndian>(u64::MAX).unwrap();
        bytes.extend_from_slice(b"{}");
        fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            directory.read_commit(1),
            Err(IndexError::Corrupted(_))
        ));

        fs::write(&path, &bytes[..6]).unwrap();
        assert!(matches!(
            directory.read_commit(1),
            Err(IndexError::Corrupted(_))
        ));
    }

    #[test]
    fn test_temporary_files_are_removed() {
        let temp_dir = TempDir::new().unwrap();
        let directory = IndexDirectory::open(temp_dir.path()).unwrap();
        fs::write(directory.file_path("commit_000002.seg.tmp"), b"partial").unwrap();
        directory.remove_temporary_files().unwrap();
        assert!(directory.list_files().unwrap().is_empty());
    }
}
