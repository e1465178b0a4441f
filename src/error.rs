//! Error type shared by the index and corpus layers.

use crate::index::types::DType;
use std::io;
use std::path::PathBuf;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, CorpusError>;

/// Errors produced while building, opening or reading a corpus
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("Index file doesn't match expected format (bad magic {found:?})")]
    BadMagic { found: Vec<u8> },

    #[error("Unsupported index version: expected {expected}, found {found}")]
    UnsupportedVersion { expected: u64, found: u64 },

    #[error("Unknown dtype code: {0}")]
    UnknownDtype(u8),

    #[error("Invalid retrieval_db flag: {0}")]
    BadFlag(u8),

    #[error("Truncated {what}: need {needed} bytes, found {found}")]
    Truncated {
        what: &'static str,
        needed: u64,
        found: u64,
    },

    #[error("Corrupt index: {0}")]
    Corrupt(String),

    #[error("Dtype mismatch: expected {expected}, found {found}")]
    DtypeMismatch { expected: DType, found: DType },

    #[error("Incompatible corpus: {0}")]
    Incompatible(String),

    #[error("{what} {index} out of range (len {len})")]
    OutOfBounds {
        what: &'static str,
        index: u64,
        len: u64,
    },

    #[error("Document {doc_id} has size {size}, not a multiple of chunk size {chunk_size}")]
    Misaligned {
        doc_id: usize,
        size: u64,
        chunk_size: u64,
    },

    #[error("Offset {offset} is not a multiple of chunk size {chunk_size}")]
    UnalignedOffset { offset: u64, chunk_size: u64 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error on {}: {source}", path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Broad classification of a [`CorpusError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    Bounds,
    Alignment,
    InvalidArgument,
    Resource,
}

impl CorpusError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CorpusError::BadMagic { .. }
            | CorpusError::UnsupportedVersion { .. }
            | CorpusError::UnknownDtype(_)
            | CorpusError::BadFlag(_)
            | CorpusError::Truncated { .. }
            | CorpusError::Corrupt(_)
            | CorpusError::DtypeMismatch { .. }
            | CorpusError::Incompatible(_) => ErrorKind::Format,
            CorpusError::OutOfBounds { .. } => ErrorKind::Bounds,
            CorpusError::Misaligned { .. } | CorpusError::UnalignedOffset { .. } => {
                ErrorKind::Alignment
            }
            CorpusError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            CorpusError::Resource { .. } => ErrorKind::Resource,
        }
    }

    pub(crate) fn out_of_bounds(what: &'static str, index: impl TryInto<u64>, len: impl TryInto<u64>) -> Self {
        CorpusError::OutOfBounds {
            what,
            index: index.try_into().unwrap_or(u64::MAX),
            len: len.try_into().unwrap_or(u64::MAX),
        }
    }
}

/// Attach a path to an I/O error
pub(crate) trait IoContext<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| CorpusError::Resource {
            path: path.into(),
            source,
        })
    }
}
