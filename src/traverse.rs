//! Recursive walk of the group tree.
//!
//! [`Mirror`] owns everything a run shares: settings, the concurrency gate,
//! the listing API, and the clone runner. Each group visit:
//!
//! 1. fetches the group's sub-groups and projects concurrently, each listing
//!    admitted through the gate;
//! 2. spawns one task per sub-group (recursing with the prefix extended by
//!    the sub-group's path) and one task per project (cloning under the
//!    current prefix);
//! 3. completes when every task in its subtree has completed.
//!
//! Only listing fetches and clones hold gate slots. A visit that is waiting
//! on its children holds none, so a deep tree cannot deadlock the gate.
//! Every visit runs as its own task, so the native stack does not grow with
//! tree depth.
//!
//! The first hard failure is returned from [`Mirror::run`], but only after
//! every task already spawned in the failing subtree has run to completion.
//! Clones are never interrupted, so a failure elsewhere cannot leave a
//! half-written repository behind that a later run would mistake for an
//! existing clone.

use anyhow::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::api::{HttpListingApi, ListingApi};
use crate::clone::{clone_project, CloneOutcome, CloneRunner, GitCli};
use crate::config::Settings;
use crate::gate::ConcurrencyGate;
use crate::gitlab;
use crate::models::{GroupId, PathPrefix, Project};

type VisitFuture = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

/// Totals for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorReport {
    pub groups_visited: usize,
    pub cloned: usize,
    pub already_present: usize,
    /// Projects that a dry run would have cloned.
    pub planned: usize,
    /// Most listing and clone operations ever in flight at once.
    pub peak_in_flight: usize,
}

impl MirrorReport {
    pub fn projects(&self) -> usize {
        self.cloned + self.already_present + self.planned
    }
}

#[derive(Default)]
struct Counters {
    groups_visited: AtomicUsize,
    cloned: AtomicUsize,
    already_present: AtomicUsize,
    planned: AtomicUsize,
}

struct Shared {
    settings: Settings,
    gate: ConcurrencyGate,
    api: Arc<dyn ListingApi>,
    runner: Arc<dyn CloneRunner>,
    counters: Counters,
}

/// One mirror run.
pub struct Mirror {
    shared: Arc<Shared>,
}

impl Mirror {
    /// Build a run from explicit collaborators. Settings are validated here.
    pub fn new(
        settings: Settings,
        api: Arc<dyn ListingApi>,
        runner: Arc<dyn CloneRunner>,
    ) -> Result<Self> {
        settings.validate()?;
        let gate = ConcurrencyGate::new(settings.concurrency);
        Ok(Self {
            shared: Arc::new(Shared {
                settings,
                gate,
                api,
                runner,
                counters: Counters::default(),
            }),
        })
    }

    /// Build a run against a real GitLab server using the `git` CLI.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let api = Arc::new(HttpListingApi::from_settings(&settings)?);
        let runner = Arc::new(GitCli::new(settings.git_binary.clone()));
        Self::new(settings, api, runner)
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.shared.gate
    }

    /// Mirror the configured root group, or every top-level group.
    pub async fn run(&self) -> Result<MirrorReport> {
        let shared = &self.shared;

        match &shared.settings.group {
            Some(id) => {
                let root = shared
                    .gate
                    .run(gitlab::group(shared.api.as_ref(), id))
                    .await?;
                info!(group = %root.name, id = %root.id, "mirroring group");
                visit(shared.clone(), root.id, PathPrefix::new().child(&root.path)).await?;
            }
            None => {
                let groups = shared
                    .gate
                    .run(gitlab::top_level_groups(shared.api.as_ref()))
                    .await?;
                info!(count = groups.len(), "mirroring top-level groups");

                let mut tasks = JoinSet::new();
                for group in groups {
                    let prefix = PathPrefix::new().child(&group.path);
                    tasks.spawn(visit(shared.clone(), group.id, prefix));
                }
                join_all(tasks).await?;
            }
        }

        Ok(self.report())
    }

    /// Totals so far; final once [`run`](Mirror::run) has returned.
    pub fn report(&self) -> MirrorReport {
        let counters = &self.shared.counters;
        MirrorReport {
            groups_visited: counters.groups_visited.load(Ordering::SeqCst),
            cloned: counters.cloned.load(Ordering::SeqCst),
            already_present: counters.already_present.load(Ordering::SeqCst),
            planned: counters.planned.load(Ordering::SeqCst),
            peak_in_flight: self.shared.gate.peak(),
        }
    }
}

/// Visit one group. Boxed because it recurses through spawned tasks.
fn visit(shared: Arc<Shared>, id: GroupId, prefix: PathPrefix) -> VisitFuture {
    Box::pin(async move {
        debug!(group = %id, path = %prefix, "visiting group");

        let api = shared.api.as_ref();
        let (subgroups, projects) = tokio::try_join!(
            shared.gate.run(gitlab::subgroups(api, &id)),
            shared.gate.run(gitlab::group_projects(api, &id))
        )?;
        shared.counters.groups_visited.fetch_add(1, Ordering::SeqCst);

        debug!(
            group = %id,
            subgroups = subgroups.len(),
            projects = projects.len(),
            "listed group"
        );

        let mut tasks = JoinSet::new();
        for subgroup in subgroups {
            let child = prefix.child(&subgroup.path);
            tasks.spawn(visit(shared.clone(), subgroup.id, child));
        }
        for project in projects {
            tasks.spawn(dispatch_clone(shared.clone(), project, prefix.clone()));
        }
        join_all(tasks).await
    })
}

async fn dispatch_clone(shared: Arc<Shared>, project: Project, prefix: PathPrefix) -> Result<()> {
    let outcome = shared
        .gate
        .run(clone_project(
            &shared.settings,
            shared.runner.as_ref(),
            &project,
            &prefix,
        ))
        .await?;

    let counter = match outcome {
        CloneOutcome::Cloned => &shared.counters.cloned,
        CloneOutcome::AlreadyPresent => &shared.counters.already_present,
        CloneOutcome::Planned => &shared.counters.planned,
    };
    counter.fetch_add(1, Ordering::SeqCst);
    Ok(())
}

/// Wait for every task to finish, then return the first failure, if any.
async fn join_all(mut tasks: JoinSet<Result<()>>) -> Result<()> {
    let mut first_err = None;
    while let Some(joined) = tasks.join_next().await {
        let result = joined.map_err(anyhow::Error::from).and_then(|r| r);
        if let Err(err) = result {
            if first_err.is_none() {
                first_err = Some(err);
            } else {
                debug!(error = %err, "further failure after the first");
            }
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clone::CommandOutput;
    use crate::error::MirrorError;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// In-memory GitLab: group id → (path, children, project paths).
    #[derive(Default)]
    struct FakeGitLab {
        groups: HashMap<u64, (String, Vec<u64>, Vec<String>)>,
        top_level: Vec<u64>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeGitLab {
        fn group(mut self, id: u64, path: &str, children: &[u64], projects: &[&str]) -> Self {
            self.groups.insert(
                id,
                (
                    path.to_string(),
                    children.to_vec(),
                    projects.iter().map(|p| p.to_string()).collect(),
                ),
            );
            self
        }

        fn top(mut self, ids: &[u64]) -> Self {
            self.top_level = ids.to_vec();
            self
        }

        fn lookup(&self, id: u64) -> Result<&(String, Vec<u64>, Vec<String>)> {
            self.groups
                .get(&id)
                .ok_or_else(|| anyhow::anyhow!("404 Group Not Found: {}", id))
        }

        fn group_json(&self, id: u64) -> Result<Value> {
            let (path, _, _) = self.lookup(id)?;
            Ok(json!({"id": id, "name": path.to_uppercase(), "path": path}))
        }

        fn groups_json(&self, ids: &[u64]) -> Result<Value> {
            let groups = ids
                .iter()
                .map(|id| self.group_json(*id))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Array(groups))
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ListingApi for FakeGitLab {
        async fn get_json(&self, path: &str) -> Result<Value> {
            self.requests.lock().unwrap().push(path.to_string());
            let bare = path.split('?').next().unwrap_or(path);
            let parts: Vec<&str> = bare
                .trim_start_matches("api/v4/groups")
                .split('/')
                .collect();

            match parts.as_slice() {
                [""] => self.groups_json(&self.top_level),
                ["", id] => self.group_json(id.parse()?),
                ["", id, "subgroups"] => {
                    let (_, children, _) = self.lookup(id.parse()?)?;
                    self.groups_json(children)
                }
                ["", id, "projects"] => {
                    let id: u64 = id.parse()?;
                    let (_, _, projects) = self.lookup(id)?;
                    Ok(Value::Array(
                        projects
                            .iter()
                            .enumerate()
                            .map(|(n, p)| {
                                json!({
                                    "id": id * 100 + n as u64,
                                    "name": p,
                                    "path": p,
                                    "ssh_url_to_repo": format!("git@git.example.com:{}.git", p),
                                })
                            })
                            .collect(),
                    ))
                }
                _ => anyhow::bail!("unexpected path {}", path),
            }
        }
    }

    /// Records destinations; optionally sleeps or fails for one project.
    #[derive(Default)]
    struct RecordingRunner {
        delay: Option<Duration>,
        fail_on: Option<String>,
        /// Only this url sleeps for `delay` when set.
        slow_url: Option<String>,
        clones: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl CloneRunner for RecordingRunner {
        async fn clone_repo(&self, url: &str, dest: &Path) -> Result<CommandOutput> {
            let sleeps = self.slow_url.as_deref().map_or(true, |slow| slow == url);
            if let (Some(delay), true) = (self.delay, sleeps) {
                tokio::time::sleep(delay).await;
            }
            self.clones.lock().unwrap().push(dest.to_path_buf());
            if self.fail_on.as_deref() == Some(url) {
                return Ok(CommandOutput {
                    success: false,
                    status: "exit status: 128".into(),
                    stderr: "fatal: Could not read from remote repository.".into(),
                    ..Default::default()
                });
            }
            Ok(CommandOutput {
                success: true,
                status: "exit status: 0".into(),
                ..Default::default()
            })
        }
    }

    fn settings(root: &Path, concurrency: usize) -> Settings {
        let mut settings = Settings::new("https://git.example.com", "tok");
        settings.destination = root.to_path_buf();
        settings.concurrency = concurrency;
        settings
    }

    /// Two top-level groups, each with two sub-groups and one project; each
    /// sub-group holds one project.
    fn two_level_tree() -> FakeGitLab {
        FakeGitLab::default()
            .top(&[1, 2])
            .group(1, "a", &[11, 12], &["pa"])
            .group(2, "b", &[21, 22], &["pb"])
            .group(11, "a1", &[], &["p11"])
            .group(12, "a2", &[], &["p12"])
            .group(21, "b1", &[], &["p21"])
            .group(22, "b2", &[], &["p22"])
    }

    #[tokio::test]
    async fn mirrors_every_project_once() {
        let tmp = TempDir::new().unwrap();
        let api = Arc::new(two_level_tree());
        let runner = Arc::new(RecordingRunner::default());
        let mirror = Mirror::new(settings(tmp.path(), 5), api.clone(), runner.clone()).unwrap();

        let report = mirror.run().await.unwrap();

        let mut clones = runner.clones.lock().unwrap().clone();
        clones.sort();
        let root = tmp.path();
        let mut expected = vec![
            root.join("a/pa"),
            root.join("b/pb"),
            root.join("a/a1/p11"),
            root.join("a/a2/p12"),
            root.join("b/b1/p21"),
            root.join("b/b2/p22"),
        ];
        expected.sort();
        assert_eq!(clones, expected);
        assert_eq!(report.groups_visited, 6);
        assert_eq!(report.cloned, 6);

        let requests = api.requests();
        for id in [1, 2, 11, 12, 21, 22] {
            let prefix = format!("api/v4/groups/{}/subgroups?", id);
            assert_eq!(
                requests.iter().filter(|r| r.starts_with(&prefix)).count(),
                1,
                "group {} listed more than once",
                id
            );
        }
    }

    #[tokio::test]
    async fn root_group_seeds_prefix_with_its_path() {
        let tmp = TempDir::new().unwrap();
        let api = Arc::new(
            FakeGitLab::default()
                .group(7, "a", &[8], &[])
                .group(8, "b", &[], &["p"]),
        );
        let runner = Arc::new(RecordingRunner::default());
        let mut settings = settings(tmp.path(), 2);
        settings.group = Some(GroupId::Numeric(7));

        let mirror = Mirror::new(settings, api.clone(), runner.clone()).unwrap();
        mirror.run().await.unwrap();

        assert_eq!(
            runner.clones.lock().unwrap().as_slice(),
            [tmp.path().join("a").join("b").join("p")]
        );
        assert!(!api.requests().iter().any(|r| r.contains("top_level_only")));
    }

    #[tokio::test]
    async fn concurrency_limit_holds_across_tree() {
        for limit in [1, 3] {
            let tmp = TempDir::new().unwrap();
            let runner = Arc::new(RecordingRunner {
                delay: Some(Duration::from_millis(10)),
                ..Default::default()
            });
            let mirror =
                Mirror::new(settings(tmp.path(), limit), Arc::new(two_level_tree()), runner)
                    .unwrap();

            let report = mirror.run().await.unwrap();
            assert!(report.peak_in_flight <= limit, "limit {}: {:?}", limit, report);
            assert_eq!(report.cloned, 6);
            assert_eq!(mirror.gate().in_flight(), 0);
        }
    }

    #[tokio::test]
    async fn clone_failure_fails_the_run() {
        let tmp = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner {
            fail_on: Some("git@git.example.com:p21.git".into()),
            ..Default::default()
        });
        let mirror = Mirror::new(settings(tmp.path(), 5), Arc::new(two_level_tree()), runner)
            .unwrap();

        let err = mirror.run().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MirrorError>(),
            Some(MirrorError::CloneFailed { .. })
        ));
    }

    #[tokio::test]
    async fn failure_waits_for_running_siblings() {
        let tmp = TempDir::new().unwrap();
        let api = Arc::new(
            FakeGitLab::default()
                .top(&[1])
                .group(1, "a", &[], &["bad", "slow"]),
        );
        let runner = Arc::new(RecordingRunner {
            delay: Some(Duration::from_millis(200)),
            slow_url: Some("git@git.example.com:slow.git".into()),
            fail_on: Some("git@git.example.com:bad.git".into()),
            ..Default::default()
        });
        let mirror = Mirror::new(settings(tmp.path(), 5), api, runner.clone()).unwrap();

        let err = mirror.run().await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<MirrorError>(),
            Some(MirrorError::CloneFailed { .. })
        ));
        let clones = runner.clones.lock().unwrap().clone();
        assert!(
            clones.contains(&tmp.path().join("a").join("slow")),
            "slow sibling was cut short: {:?}",
            clones
        );
    }

    #[tokio::test]
    async fn listing_failure_fails_the_run() {
        let tmp = TempDir::new().unwrap();
        // Group 12 is a child of group 1 but does not exist.
        let api = Arc::new(FakeGitLab::default().top(&[1]).group(1, "a", &[12], &[]));
        let mirror = Mirror::new(
            settings(tmp.path(), 5),
            api,
            Arc::new(RecordingRunner::default()),
        )
        .unwrap();

        assert!(mirror.run().await.is_err());
    }

    #[tokio::test]
    async fn dry_run_counts_without_cloning() {
        let tmp = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let mut settings = settings(tmp.path(), 5);
        settings.dry_run = true;

        let mirror = Mirror::new(settings, Arc::new(two_level_tree()), runner.clone()).unwrap();
        let report = mirror.run().await.unwrap();

        assert_eq!(report.planned, 6);
        assert_eq!(report.projects(), 6);
        assert!(runner.clones.lock().unwrap().is_empty());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let result = Mirror::new(
            settings(tmp.path(), 0),
            Arc::new(FakeGitLab::default()),
            Arc::new(RecordingRunner::default()),
        );
        assert!(result.is_err());
    }
}
