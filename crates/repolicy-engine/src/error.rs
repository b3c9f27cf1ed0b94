// error.rs — Error types for policy evaluation and configuration.

use std::path::PathBuf;

use repolicy_workspace::WorkspaceError;
use thiserror::Error;

/// Errors that can occur while registering or evaluating policies.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A staged filesystem operation failed.
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// A policy check found a problem it cannot fix.
    #[error("check failed: {0}")]
    CheckFailed(String),

    /// A policy failed during `run()`; evaluation stopped here.
    #[error("policy '{policy}' failed: {source}")]
    PolicyFailed {
        policy: String,
        source: Box<PolicyError>,
    },

    /// The policy configuration file could not be read or parsed.
    #[error("invalid policy config {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    /// A managed-file template could not be read.
    #[error("cannot read template {path}: {source}")]
    Template {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A template glob pattern is malformed.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}
