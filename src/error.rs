//! Error types for the partitioned index.
//!
//! All fallible operations in this crate return [`Result`], whose error type
//! [`IndexError`] separates programming errors (misuse of a closed index),
//! I/O failures, uniqueness conflicts found during deferred verification and
//! document retrieval failures.

use std::fmt;

use thiserror::Error;

use crate::value::PropertyValue;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Two entities found to share a value under a uniqueness constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntryConflict {
    /// Entity that was indexed first.
    pub existing_entity_id: u64,
    /// Entity that was found to collide with it.
    pub added_entity_id: u64,
    /// Property key the constraint is defined on.
    pub property_key_id: u32,
    /// The shared property value.
    pub value: PropertyValue,
}

impl fmt::Display for IndexEntryConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "both entity {} and entity {} share the property value {} for property key {}",
            self.existing_entity_id, self.added_entity_id, self.value, self.property_key_id
        )
    }
}

/// Errors raised by the partitioned index.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Folder, file or engine I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure of a commit file or configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The index was used in a state that does not permit the operation.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// A uniqueness constraint is violated by two indexed entities.
    #[error("index entry conflict: {0}")]
    EntryConflict(Box<IndexEntryConflict>),

    /// A document believed to be live could not be materialized.
    #[error("can't retrieve document with id {doc_id}: {message}")]
    Retrieval { doc_id: u32, message: String },

    /// On-disk commit data failed validation.
    #[error("corrupted index data: {0}")]
    Corrupted(String),

    /// A long-running task observed cancellation of its task control.
    #[error("task cancelled: {0}")]
    Cancelled(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Several failures collected while closing a group of resources.
    #[error("{} errors occurred, first: {}", .0.len(), .0.first().map(|e| e.to_string()).unwrap_or_default())]
    Aggregate(Vec<IndexError>),

    /// An error that happened while cleaning up after another error.
    #[error("{error}")]
    Chained {
        error: Box<IndexError>,
        #[source]
        cause: Box<IndexError>,
    },
}

impl IndexError {
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        IndexError::InvalidArgument(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        IndexError::NotFound(msg.into())
    }

    /// Misuse of the index, such as working with a closed one.
    pub fn illegal_state<S: Into<String>>(msg: S) -> Self {
        IndexError::IllegalState(msg.into())
    }

    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        IndexError::Cancelled(msg.into())
    }

    pub fn corrupted<S: Into<String>>(msg: S) -> Self {
        IndexError::Corrupted(msg.into())
    }

    /// A live document that could not be read.
    pub fn retrieval<S: Into<String>>(doc_id: u32, msg: S) -> Self {
        IndexError::Retrieval {
            doc_id,
            message: msg.into(),
        }
    }

    /// Wrap a conflict found by constraint verification.
    pub fn conflict(conflict: IndexEntryConflict) -> Self {
        IndexError::EntryConflict(Box::new(conflict))
    }

    /// Attach `cause` to this error.
    pub fn with_cause(self, cause: IndexError) -> Self {
        IndexError::Chained {
            error: Box::new(self),
            cause: Box::new(cause),
        }
    }

    /// Returns the conflict details if this is a constraint conflict.
    pub fn as_conflict(&self) -> Option<&IndexEntryConflict> {
        match self {
            IndexError::EntryConflict(conflict) => Some(conflict),
            IndexError::Chained { error, .. } => error.as_conflict(),
            _ => None,
        }
    }

    /// Whether this is, or wraps, a constraint conflict.
    pub fn is_conflict(&self) -> bool {
        self.as_conflict().is_some()
    }

    /// Collapse a list of errors into a single error, if any.
    pub fn aggregate(mut errors: Vec<IndexError>) -> Option<IndexError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(IndexError::Aggregate(errors)),
        }
    }
}

/// Close every item, attempting all of them, and report the collected failures.
pub(crate) fn close_all<T, F>(items: impl IntoIterator<Item = T>, mut close: F) -> Result<()>
where
    F: FnMut(T) -> Result<()>,
{
    let errors: Vec<IndexError> = items
        .into_iter()
        .filter_map(|item| close(item).err())
        .collect();
    match IndexError::aggregate(errors) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
