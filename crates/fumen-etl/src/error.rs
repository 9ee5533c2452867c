//! Error types for the indexing pipeline.

use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The source list or indexer options are unusable. Reported before any
/// scanning begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("source_directories must not be empty")]
    NoSourceDirectories,

    #[error("source directory ({}) must not be a relative path", .0.display())]
    RelativeSourceDirectory(PathBuf),

    #[error("source directory does not exist: {}", .0.display())]
    MissingSourceDirectory(PathBuf),

    #[error("source path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to check source directory {}: {source}", path.display())]
    Inaccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file_extensions must not be empty")]
    NoExtensions,

    #[error("file extension {0:?} must be in dotted form, e.g. \".bms\"")]
    InvalidExtension(String),

    #[error("indexer.workers must be at least 1")]
    InvalidWorkers,

    #[error("indexer.batch_size must be at least 1")]
    InvalidBatchSize,
}

/// Character-encoding normalization failures.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// The detector could not produce any guess for the input.
    #[error("failed to detect encoding: {0}")]
    Detection(String),

    /// The input could not be decoded as the detected charset.
    #[error("failed to decode {charset}: {message}")]
    Decoding { charset: String, message: String },
}

/// Failure to turn one chart file into a record.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to normalize {}: {source}", path.display())]
    Encoding {
        path: PathBuf,
        #[source]
        source: EncodingError,
    },
}

impl ParseError {
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Read { path, .. } | Self::Encoding { path, .. } => path,
        }
    }
}

/// Where an isolated failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Listing a directory failed; the subtree was skipped.
    Walk,
    /// Reading or normalizing a single chart failed.
    Parse,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Walk => write!(f, "walk"),
            Self::Parse => write!(f, "parse"),
        }
    }
}

/// A recorded failure that did not stop the scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanFailure {
    #[serde(serialize_with = "lossy_path")]
    pub path: PathBuf,
    pub kind: FailureKind,
    pub message: String,
}

impl ScanFailure {
    pub fn walk(err: &walkdir::Error) -> Self {
        Self {
            path: err.path().map(PathBuf::from).unwrap_or_default(),
            kind: FailureKind::Walk,
            message: err.to_string(),
        }
    }

    pub fn parse(err: &ParseError) -> Self {
        Self {
            path: err.path().clone(),
            kind: FailureKind::Parse,
            message: err.to_string(),
        }
    }
}

fn lossy_path<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&path.to_string_lossy())
}

impl fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.path.display(), self.message)
    }
}

/// Errors that abort an indexing run.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A flush failed and was rolled back. Batches committed earlier remain.
    #[error("database error: {0}")]
    Database(#[from] fumen_core::Error),

    #[error("aborting: {count} files failed (limit {limit})")]
    TooManyFailures { count: usize, limit: usize },

    #[error("indexing was cancelled")]
    Cancelled,

    /// A pipeline task panicked or was aborted by the runtime.
    #[error("pipeline task failed: {0}")]
    Worker(String),
}

/// Convenience alias for indexing results.
pub type IndexResult<T> = std::result::Result<T, IndexError>;
