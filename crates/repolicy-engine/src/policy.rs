// policy.rs — Policy definitions and evaluation outcomes.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use repolicy_workspace::Repo;
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Boxed future returned by a policy check.
pub type PolicyFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PolicyError>> + Send + 'a>>;

/// A check-and-fix function. It reads and stages writes through the `Repo`;
/// whether it changed anything is decided by the repo's version counter.
pub type PolicyFn = Box<dyn for<'a> Fn(&'a mut Repo) -> PolicyFuture<'a> + Send + Sync>;

/// A named convention, optionally backed by a check.
///
/// A policy without a check is a "todo": registered so it shows up in
/// reports, but never executed.
pub struct Policy {
    name: String,
    check: Option<PolicyFn>,
}

impl Policy {
    pub fn new(name: impl Into<String>, check: Option<PolicyFn>) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_todo(&self) -> bool {
        self.check.is_none()
    }

    pub(crate) fn check(&self) -> Option<&PolicyFn> {
        self.check.as_ref()
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("name", &self.name)
            .field("todo", &self.is_todo())
            .finish()
    }
}

/// Result of evaluating one policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    /// The check ran and staged no change.
    Ok,
    /// The check ran and staged at least one change.
    Update,
    /// The policy has no check.
    Todo,
}

impl PolicyStatus {
    /// Classify a check by the repo version before and after it ran.
    pub fn from_versions(before: u64, after: u64) -> Self {
        if before == after {
            PolicyStatus::Ok
        } else {
            PolicyStatus::Update
        }
    }
}

impl fmt::Display for PolicyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyStatus::Ok => write!(f, "ok"),
            PolicyStatus::Update => write!(f, "update"),
            PolicyStatus::Todo => write!(f, "todo"),
        }
    }
}
