// run_all.rs — Evaluate the catalog against several repositories in turn.

use std::path::PathBuf;

use repolicy_engine::{PolicyConfig, PolicyStats};
use serde::Serialize;

use super::{run, ReportOptions};

/// One row of the run-all summary.
#[derive(Debug, Serialize)]
pub struct RepoReport {
    pub repo: String,
    #[serde(flatten)]
    pub stats: PolicyStats,
}

/// Run each repository in order and print a summary.
///
/// Stops at the first repository whose run fails. Repositories are expected
/// to be checked out already.
pub async fn execute(
    config: &PolicyConfig,
    repos: &[PathBuf],
    enforce: bool,
    json: bool,
    options: ReportOptions,
) -> anyhow::Result<()> {
    let mut reports = Vec::with_capacity(repos.len());

    for repo in repos {
        println!("== {}", repo.display());
        let summary = run::execute(config, repo, enforce, options).await?;
        reports.push(RepoReport {
            repo: repo.display().to_string(),
            stats: summary.stats,
        });
        println!();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print!("{}", render_table(&reports));
    }
    Ok(())
}

fn render_table(reports: &[RepoReport]) -> String {
    let width = reports
        .iter()
        .map(|r| r.repo.len())
        .max()
        .unwrap_or(0)
        .max("REPO".len());

    let mut out = format!(
        "{:<width$} {:>6} {:>6} {:>6} {:>6}\n",
        "REPO", "TOTAL", "OK", "UPDATE", "TODO"
    );
    out.push_str(&"-".repeat(width + 28));
    out.push('\n');

    let mut totals = PolicyStats::default();
    for report in reports {
        let s = report.stats;
        out.push_str(&format!(
            "{:<width$} {:>6} {:>6} {:>6} {:>6}\n",
            report.repo, s.total, s.ok, s.update, s.todo
        ));
        totals.total += s.total;
        totals.ok += s.ok;
        totals.update += s.update;
        totals.todo += s.todo;
    }

    if reports.len() > 1 {
        out.push_str(&format!(
            "{:<width$} {:>6} {:>6} {:>6} {:>6}\n",
            "all", totals.total, totals.ok, totals.update, totals.todo
        ));
    }
    out
}
