// error.rs — Error types for the staged filesystem.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while staging or flushing repository files.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The path is absolute or climbs out of the repository root.
    #[error("path traversal detected: '{path}' resolves outside the repository")]
    PathTraversal { path: String },

    /// The path does not name a file (empty, or only `.` components).
    #[error("invalid path: '{path}'")]
    InvalidPath { path: String },

    /// Failed to serialize a JSON document.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
