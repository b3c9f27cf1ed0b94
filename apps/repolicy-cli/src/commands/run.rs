// run.rs — Evaluate the policy catalog against one repository.

use std::path::Path;

use anyhow::Context;
use repolicy_engine::{
    Policy, PolicyConfig, PolicyObserver, PolicyStatus, RepolicyContext, RunSummary,
};
use repolicy_workspace::Repo;

use super::{format_change, format_outcome, ReportOptions};

/// Prints one report line per evaluated policy.
pub struct ConsoleObserver {
    options: ReportOptions,
}

impl ConsoleObserver {
    pub fn new(options: ReportOptions) -> Self {
        Self { options }
    }
}

impl PolicyObserver for ConsoleObserver {
    fn on_policy_evaluated(&mut self, policy: &Policy, status: PolicyStatus) {
        println!("{}", format_outcome(status, policy.name(), self.options));
    }
}

/// Run every catalog policy against `repo_dir`.
///
/// With `enforce`, staged changes are flushed and each file operation is
/// printed; otherwise the pending operations are printed and nothing is
/// written.
pub async fn execute(
    config: &PolicyConfig,
    repo_dir: &Path,
    enforce: bool,
    options: ReportOptions,
) -> anyhow::Result<RunSummary> {
    let repo_dir = repo_dir
        .canonicalize()
        .with_context(|| format!("repository not found: {}", repo_dir.display()))?;
    tracing::debug!(repo = %repo_dir.display(), enforce, "evaluating policies");

    let mut ctx =
        RepolicyContext::new(Repo::new(&repo_dir)).with_observer(ConsoleObserver::new(options));
    ctx.use_plugins(config.plugins(&repo_dir)?);

    let summary = ctx
        .run()
        .await
        .with_context(|| format!("policy run failed in {}", repo_dir.display()))?;

    let changes = if enforce {
        ctx.flush()
            .with_context(|| format!("failed to write changes to {}", repo_dir.display()))?
    } else {
        ctx.pending_changes()?
    };

    if !changes.is_empty() {
        println!();
        if !enforce {
            println!("Pending changes (re-run with --enforce to apply):");
        }
        for change in &changes {
            println!("{}", format_change(change, options));
        }
    }

    Ok(summary)
}
