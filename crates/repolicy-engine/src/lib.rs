//! # repolicy-engine
//!
//! Registers repository conventions as named policies and evaluates them
//! against a staged [`Repo`](repolicy_workspace::Repo).
//!
//! Each policy is an async check-and-fix function. `run()` awaits them one at
//! a time in registration order and classifies each by whether the repo's
//! version counter moved:
//!
//! - **ok** — the check staged nothing
//! - **update** — the check staged at least one change
//! - **todo** — the policy has no check yet
//!
//! Nothing is written until [`RepolicyContext::flush`].
//!
//! ## Key components
//!
//! - [`RepolicyContext`] — the engine: registration, `run()`, `flush()`.
//! - [`PolicyObserver`] — per-policy reporting hook.
//! - [`plugins`] — reusable policy families (managed files, package.json).
//! - [`PolicyConfig`] — the policy catalog loaded from `repolicy.toml`.

pub mod config;
pub mod context;
pub mod error;
pub mod observer;
pub mod plugins;
pub mod policy;

pub use config::{DefaultFile, FilesConfig, JsonFileConfig, PackageConfig, PolicyConfig};
pub use context::{Plugin, PolicyOutcome, RepolicyContext, RunSummary};
pub use error::PolicyError;
pub use observer::{PolicyObserver, PolicyStats, TracingObserver};
pub use policy::{Policy, PolicyFn, PolicyFuture, PolicyStatus};
