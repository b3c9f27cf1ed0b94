// context.rs — The policy engine.
//
// A RepolicyContext owns one staged Repo and an ordered list of policies.
// `run()` evaluates them strictly in registration order, one at a time:
//
// 1. Todo policy (no check)? → Todo, nothing executed
// 2. Record repo version, await the check
// 3. Check failed? → stop the run, return PolicyFailed (staged writes stay)
// 4. Version unchanged? → Ok, otherwise → Update
// 5. Notify the observer
//
// Later policies see every write staged by earlier ones, so evaluation is
// never parallel. Nothing reaches disk until flush().

use repolicy_workspace::{FlushChange, Repo};
use serde::Serialize;

use crate::error::PolicyError;
use crate::observer::{PolicyObserver, PolicyStats, TracingObserver};
use crate::policy::{Policy, PolicyFn, PolicyFuture, PolicyStatus};

/// Registers a family of policies on a context.
pub type Plugin = Box<dyn FnOnce(&mut RepolicyContext)>;

/// Outcome of a single policy within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyOutcome {
    pub name: String,
    pub status: PolicyStatus,
}

/// Everything `run()` evaluated, in order, plus totals.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub outcomes: Vec<PolicyOutcome>,
    pub stats: PolicyStats,
}

impl RunSummary {
    fn record(&mut self, name: &str, status: PolicyStatus) {
        self.stats.record(status);
        self.outcomes.push(PolicyOutcome {
            name: name.to_string(),
            status,
        });
    }

    /// True when no policy staged a change.
    pub fn is_clean(&self) -> bool {
        self.stats.update == 0
    }
}

/// Policy engine bound to a single staged repository.
pub struct RepolicyContext {
    repo: Repo,
    policies: Vec<Policy>,
    observer: Box<dyn PolicyObserver + Send>,
}

impl RepolicyContext {
    /// Create an engine over `repo` that reports through [`TracingObserver`].
    pub fn new(repo: Repo) -> Self {
        Self {
            repo,
            policies: Vec::new(),
            observer: Box::new(TracingObserver),
        }
    }

    /// Replace the observer notified after each policy.
    pub fn with_observer(mut self, observer: impl PolicyObserver + Send + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn repo(&self) -> &Repo {
        &self.repo
    }

    pub fn repo_mut(&mut self) -> &mut Repo {
        &mut self.repo
    }

    pub fn into_repo(self) -> Repo {
        self.repo
    }

    /// Registered policies, in evaluation order.
    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    /// Register an asynchronous check. Names need not be unique.
    pub fn add_policy<F>(&mut self, name: impl Into<String>, check: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Repo) -> PolicyFuture<'a> + Send + Sync + 'static,
    {
        let check: PolicyFn = Box::new(check);
        self.policies.push(Policy::new(name, Some(check)));
        self
    }

    /// Register a check that does not need to await anything.
    pub fn add_sync_policy<F>(&mut self, name: impl Into<String>, check: F) -> &mut Self
    where
        F: Fn(&mut Repo) -> Result<(), PolicyError> + Send + Sync + 'static,
    {
        self.add_policy(name, move |repo| {
            let result = check(repo);
            Box::pin(std::future::ready(result))
        })
    }

    /// Register a convention that has no check yet.
    pub fn add_todo(&mut self, name: impl Into<String>) -> &mut Self {
        self.policies.push(Policy::new(name, None));
        self
    }

    /// Apply a plugin immediately.
    pub fn use_plugin(&mut self, plugin: impl FnOnce(&mut Self)) -> &mut Self {
        plugin(self);
        self
    }

    /// Apply plugins in order.
    pub fn use_plugins(&mut self, plugins: impl IntoIterator<Item = Plugin>) -> &mut Self {
        for plugin in plugins {
            plugin(self);
        }
        self
    }

    /// Evaluate every policy in registration order.
    ///
    /// Fails fast: the first failing check aborts the run. Changes staged by
    /// earlier policies (and by the failing one) remain in the repo.
    pub async fn run(&mut self) -> Result<RunSummary, PolicyError> {
        let mut summary = RunSummary::default();

        for policy in &self.policies {
            let status = match policy.check() {
                Some(check) => {
                    let before = self.repo.version();
                    check(&mut self.repo)
                        .await
                        .map_err(|source| PolicyError::PolicyFailed {
                            policy: policy.name().to_string(),
                            source: Box::new(source),
                        })?;
                    let after = self.repo.version();
                    tracing::debug!(policy = policy.name(), before, after, "policy checked");
                    PolicyStatus::from_versions(before, after)
                }
                None => PolicyStatus::Todo,
            };

            self.observer.on_policy_evaluated(policy, status);
            summary.record(policy.name(), status);
        }

        Ok(summary)
    }

    /// Commit staged changes to disk. Call only after `run()` has settled.
    pub fn flush(&mut self) -> Result<Vec<FlushChange>, PolicyError> {
        Ok(self.repo.flush()?)
    }

    /// What `flush()` would do, without writing.
    pub fn pending_changes(&self) -> Result<Vec<FlushChange>, PolicyError> {
        Ok(self.repo.pending_changes()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repolicy_workspace::{get_field, set_field, FlushAction, JsonEditor};
    use serde_json::json;
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    type Seen = Arc<Mutex<Vec<(String, PolicyStatus)>>>;

    fn recording_context(repo: Repo) -> (RepolicyContext, Seen) {
        let seen: Seen = Arc::default();
        let sink = Arc::clone(&seen);
        let ctx = RepolicyContext::new(repo).with_observer(
            move |policy: &Policy, status: PolicyStatus| {
                sink.lock()
                    .unwrap()
                    .push((policy.name().to_string(), status));
            },
        );
        (ctx, seen)
    }

    fn statuses(summary: &RunSummary) -> Vec<PolicyStatus> {
        summary.outcomes.iter().map(|o| o.status).collect()
    }

    /// Registers the same small policy set each time it is called.
    fn conventions(ctx: &mut RepolicyContext) {
        ctx.add_sync_policy("Readme exists", |repo| {
            repo.write("README.md", "# demo\n")?;
            Ok(())
        });
        ctx.add_sync_policy("Package has a name", |repo| {
            JsonEditor::new(repo).edit("package.json", |doc| {
                set_field(doc, &["name"], json!("demo"));
                None
            })?;
            Ok(())
        });
        ctx.add_sync_policy("No yarn lockfile", |repo| {
            repo.delete("yarn.lock")?;
            Ok(())
        });
        ctx.add_todo("Has a changelog");
    }

    #[tokio::test]
    async fn todo_policy_is_reported_and_never_mutates() {
        let dir = tempdir().unwrap();
        let (mut ctx, seen) = recording_context(Repo::new(dir.path()));
        ctx.add_todo("Not implemented yet");

        let summary = ctx.run().await.unwrap();

        assert_eq!(statuses(&summary), vec![PolicyStatus::Todo]);
        assert_eq!(summary.stats.todo, 1);
        assert_eq!(ctx.repo().version(), 0);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("Not implemented yet".to_string(), PolicyStatus::Todo)]
        );
    }

    #[tokio::test]
    async fn classifies_ok_and_update() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("stable.txt"), "same").unwrap();
        let mut ctx = RepolicyContext::new(Repo::new(dir.path()));
        ctx.add_sync_policy("already satisfied", |repo| {
            repo.write("stable.txt", "same")?;
            Ok(())
        })
        .add_sync_policy("needs a fix", |repo| {
            repo.write("stable.txt", "different")?;
            Ok(())
        });

        let summary = ctx.run().await.unwrap();

        assert_eq!(
            statuses(&summary),
            vec![PolicyStatus::Ok, PolicyStatus::Update]
        );
        assert!(!summary.is_clean());
    }

    #[tokio::test]
    async fn later_policies_see_earlier_writes() {
        let dir = tempdir().unwrap();
        let mut ctx = RepolicyContext::new(Repo::new(dir.path()));
        ctx.add_policy("A sets x", |repo| {
            Box::pin(async move {
                tokio::task::yield_now().await;
                JsonEditor::new(repo).edit("config.json", |doc| {
                    set_field(doc, &["x"], json!(1));
                    None
                })?;
                Ok::<(), PolicyError>(())
            })
        });
        ctx.add_sync_policy("B requires x", |repo| {
            let doc = JsonEditor::new(repo).read("config.json")?;
            match get_field(&doc, &["x"]) {
                Some(x) if *x == json!(1) => Ok(()),
                other => Err(PolicyError::CheckFailed(format!("x is {other:?}"))),
            }
        });

        let summary = ctx.run().await.unwrap();
        assert_eq!(
            statuses(&summary),
            vec![PolicyStatus::Update, PolicyStatus::Ok]
        );
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("yarn.lock"), "lock").unwrap();

        let mut first = RepolicyContext::new(Repo::new(dir.path()));
        first.use_plugin(conventions);
        let summary = first.run().await.unwrap();
        assert_eq!(summary.stats.update, 3);
        let changes = first.flush().unwrap();
        assert_eq!(changes.len(), 3);

        let mut second = RepolicyContext::new(Repo::new(dir.path()));
        second.use_plugin(conventions);
        let summary = second.run().await.unwrap();
        assert_eq!(
            statuses(&summary),
            vec![
                PolicyStatus::Ok,
                PolicyStatus::Ok,
                PolicyStatus::Ok,
                PolicyStatus::Todo
            ]
        );
        assert!(summary.is_clean());
        assert!(second.flush().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_policy_halts_the_run() {
        let dir = tempdir().unwrap();
        let reached = Arc::new(AtomicBool::new(false));
        let reached_flag = Arc::clone(&reached);
        let (mut ctx, seen) = recording_context(Repo::new(dir.path()));

        ctx.add_sync_policy("writes first", |repo| {
            repo.write("a.txt", "a")?;
            Ok(())
        });
        ctx.add_sync_policy("broken", |_repo| {
            Err(PolicyError::CheckFailed("boom".to_string()))
        });
        ctx.add_sync_policy("never runs", move |_repo| {
            reached_flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        let err = ctx.run().await.unwrap_err();

        match err {
            PolicyError::PolicyFailed { policy, source } => {
                assert_eq!(policy, "broken");
                assert!(matches!(*source, PolicyError::CheckFailed(_)));
            }
            other => panic!("expected PolicyFailed, got {:?}", other),
        }
        assert!(!reached.load(Ordering::SeqCst));
        assert_eq!(seen.lock().unwrap().len(), 1);
        // No rollback: the first policy's write is still staged.
        assert_eq!(ctx.repo_mut().read("a.txt").unwrap(), Some(&b"a"[..]));
    }

    #[tokio::test]
    async fn duplicate_names_are_evaluated_independently() {
        let dir = tempdir().unwrap();
        let mut ctx = RepolicyContext::new(Repo::new(dir.path()));
        for _ in 0..2 {
            ctx.add_sync_policy("Managed file", |repo| {
                repo.write("f", "x")?;
                Ok(())
            });
        }

        let summary = ctx.run().await.unwrap();
        assert_eq!(ctx.policies().len(), 2);
        assert_eq!(
            statuses(&summary),
            vec![PolicyStatus::Update, PolicyStatus::Ok]
        );
    }

    #[tokio::test]
    async fn plugins_register_in_order() {
        let dir = tempdir().unwrap();
        let (mut ctx, seen) = recording_context(Repo::new(dir.path()));
        let plugins: Vec<Plugin> = vec![
            Box::new(|ctx: &mut RepolicyContext| {
                ctx.add_todo("first").add_todo("second");
            }),
            Box::new(|ctx: &mut RepolicyContext| {
                ctx.add_todo("third");
            }),
        ];
        ctx.use_plugins(plugins);

        ctx.run().await.unwrap();

        let names: Vec<String> = seen.lock().unwrap().iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn pending_changes_preview_flush() {
        let dir = tempdir().unwrap();
        let mut ctx = RepolicyContext::new(Repo::new(dir.path()));
        ctx.use_plugin(conventions);
        ctx.run().await.unwrap();

        let pending = ctx.pending_changes().unwrap();
        let actions: Vec<(&str, FlushAction)> = pending
            .iter()
            .map(|c| (c.path.as_str(), c.action))
            .collect();
        assert_eq!(
            actions,
            vec![
                ("README.md", FlushAction::Add),
                ("package.json", FlushAction::Add),
            ]
        );
        assert!(!dir.path().join("README.md").exists());
    }
}
