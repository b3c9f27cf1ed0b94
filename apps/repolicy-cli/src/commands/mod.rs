// mod.rs — Subcommands and the shared console report.

pub mod run;
pub mod run_all;

use repolicy_engine::PolicyStatus;
use repolicy_workspace::{FlushAction, FlushChange};

const RESET: &str = "\x1b[0m";

/// How reports are written to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    pub color: bool,
}

impl ReportOptions {
    fn paint(&self, color: &str, text: &str) -> String {
        if self.color {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }
}

/// `[ok] name`, `[update] name` or `[todo] name`.
pub fn format_outcome(status: PolicyStatus, name: &str, options: ReportOptions) -> String {
    let color = match status {
        PolicyStatus::Ok => "\x1b[32m",     // Green
        PolicyStatus::Update => "\x1b[33m", // Yellow
        PolicyStatus::Todo => "\x1b[90m",   // Gray
    };
    format!("{} {name}", options.paint(color, &format!("[{status}]")))
}

/// `[add] path`, `[delete] path`, `[chmod +x] path` and so on.
pub fn format_change(change: &FlushChange, options: ReportOptions) -> String {
    let color = match change.action {
        FlushAction::Add => "\x1b[32m",    // Green
        FlushAction::Update => "\x1b[33m", // Yellow
        FlushAction::Delete => "\x1b[31m", // Red
        FlushAction::ChmodExecutable | FlushAction::ChmodNonExecutable => "\x1b[36m", // Cyan
    };
    format!(
        "{} {}",
        options.paint(color, &format!("[{}]", change.action)),
        change.path
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_report_lines() {
        let plain = ReportOptions::default();
        assert_eq!(
            format_outcome(PolicyStatus::Update, "Unwanted file \"yarn.lock\"", plain),
            "[update] Unwanted file \"yarn.lock\""
        );
        let change = FlushChange {
            path: "scripts/release".to_string(),
            action: FlushAction::ChmodExecutable,
        };
        assert_eq!(format_change(&change, plain), "[chmod +x] scripts/release");
    }

    #[test]
    fn colored_report_wraps_the_tag() {
        let line = format_outcome(PolicyStatus::Ok, "p", ReportOptions { color: true });
        assert_eq!(line, "\x1b[32m[ok]\x1b[0m p");
    }
}
