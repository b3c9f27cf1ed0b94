//! # repolicy-workspace
//!
//! Staged filesystem for repolicy.
//!
//! Policies never touch the real repository directly. They read and write
//! through a [`Repo`], an in-memory overlay that hydrates each path from disk
//! on first access and counts every effective change in a version counter.
//! [`Repo::flush`] commits the overlay with the minimal set of file
//! operations.
//!
//! ## Key components
//!
//! - [`Repo`] — lazy, change-tracking overlay over a directory.
//! - [`JsonEditor`] — read-modify-write JSON editing that only stages a
//!   write when the document changed by value.

pub mod error;
pub mod json_editor;
pub mod repo;

pub use error::WorkspaceError;
pub use json_editor::{get_field, remove_field, set_field, values_equal, JsonEditor};
pub use repo::{Contents, Entry, FlushAction, FlushChange, Repo};
