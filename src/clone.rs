//! Cloning a single project into the mirror.
//!
//! Workflow for each project:
//! 1. Compute `destination / prefix... / project.path`.
//! 2. Create that directory and any missing parents.
//! 3. Run `git clone <url> <dir>`.
//! 4. Classify the result.
//!
//! # Classification
//!
//! `git` reports free text on stderr, so the outcome is read from it:
//!
//! | Exit | stderr | Outcome |
//! |------|--------|---------|
//! | ok | empty, or contains `ExperimentalWarning` | [`CloneOutcome::Cloned`] |
//! | ok | contains `already exists` or `Cloning` | [`CloneOutcome::Cloned`] |
//! | failed | contains `already exists` or `Cloning` | [`CloneOutcome::AlreadyPresent`] |
//! | any other | | [`MirrorError::CloneFailed`] |
//!
//! Re-running the tool against a populated mirror therefore succeeds: every
//! clone fails with "destination path ... already exists and is not an empty
//! directory", which is the steady state.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::MirrorError;
use crate::models::{PathPrefix, Project};

const EXPERIMENTAL_WARNING: &str = "ExperimentalWarning";
const ALREADY_EXISTS: &str = "already exists";
const CLONING: &str = "Cloning";

/// Captured result of an external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    /// Exit status as printed by the OS, e.g. `exit status: 128`.
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command counts as failed: a non-zero exit, or anything on
    /// stderr other than an `ExperimentalWarning`.
    pub fn failed(&self) -> bool {
        let noisy = !self.stderr.trim().is_empty() && !self.stderr.contains(EXPERIMENTAL_WARNING);
        !self.success || noisy
    }
}

/// How a project ended up in the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneOutcome {
    Cloned,
    /// The destination already held a clone (or one in progress).
    AlreadyPresent,
    /// Dry run: nothing was created.
    Planned,
}

/// Runs the actual clone. [`GitCli`] shells out to `git`; tests use fakes.
#[async_trait]
pub trait CloneRunner: Send + Sync {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<CommandOutput>;
}

/// [`CloneRunner`] that invokes the `git` executable.
pub struct GitCli {
    binary: String,
}

impl GitCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

#[async_trait]
impl CloneRunner for GitCli {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<CommandOutput> {
        let output = Command::new(&self.binary)
            .arg("clone")
            .arg(url)
            .arg(dest)
            .output()
            .await
            .with_context(|| {
                format!("Failed to execute '{} clone'. Is git installed?", self.binary)
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Where `project` lands under `root` for the given prefix.
pub fn destination_for(root: &Path, prefix: &PathPrefix, project: &Project) -> PathBuf {
    prefix.resolve(root).join(&project.path)
}

/// Classify a finished clone. `Err` carries the output of a hard failure.
pub fn classify(output: &CommandOutput) -> Result<CloneOutcome, &CommandOutput> {
    if !output.failed() {
        return Ok(CloneOutcome::Cloned);
    }
    if output.stderr.contains(ALREADY_EXISTS) || output.stderr.contains(CLONING) {
        return Ok(if output.success {
            CloneOutcome::Cloned
        } else {
            CloneOutcome::AlreadyPresent
        });
    }
    Err(output)
}

/// Clone one project under `settings.destination`.
///
/// The caller is responsible for admitting this through the run's
/// [`ConcurrencyGate`](crate::gate::ConcurrencyGate).
pub async fn clone_project(
    settings: &Settings,
    runner: &dyn CloneRunner,
    project: &Project,
    prefix: &PathPrefix,
) -> Result<CloneOutcome> {
    let dest = destination_for(&settings.destination, prefix, project);
    let url = project.clone_url(settings.clone_url)?;

    if settings.dry_run {
        info!(project = %project.name, path = %dest.display(), "would clone");
        return Ok(CloneOutcome::Planned);
    }

    tokio::fs::create_dir_all(&dest)
        .await
        .with_context(|| format!("Failed to create directory: {}", dest.display()))?;

    info!(project = %project.name, path = %dest.display(), "cloning");
    let output = runner.clone_repo(url, &dest).await?;

    match classify(&output) {
        Ok(outcome) => {
            if !output.success {
                warn!(
                    project = %project.name,
                    path = %dest.display(),
                    stderr = %output.stderr.trim(),
                    "git clone failed, treating destination as already cloned"
                );
            }
            debug!(project = %project.name, ?outcome, "clone finished");
            Ok(outcome)
        }
        Err(output) => Err(MirrorError::CloneFailed {
            url: url.to_string(),
            path: dest,
            status: output.status.clone(),
            stderr: output.stderr.trim().to_string(),
        }
        .into()),
    }
}
