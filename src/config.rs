//! Run settings.
//!
//! Settings come from three layers, lowest precedence first: an optional
//! TOML file, environment variables, and command-line flags. Every layer is
//! a [`PartialSettings`]; [`PartialSettings::merge`] stacks them and
//! [`PartialSettings::resolve`] fills defaults and validates.
//!
//! ```toml
//! server = "https://gitlab.example.com"
//! token = "glpat-..."
//! group = 42            # or "platform/backend"; omit to mirror everything
//! destination = "/srv/mirror"
//! concurrency = 5
//! clone_url = "ssh"     # or "http"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::MirrorError;
use crate::models::GroupId;

pub const DEFAULT_CONCURRENCY: usize = 5;

/// Which remote endpoint of a project to clone from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloneUrlKind {
    #[default]
    Ssh,
    Http,
}

/// Immutable settings for one mirror run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: String,
    pub token: String,
    /// Mirror only this group (and its descendants) when set.
    pub group: Option<GroupId>,
    pub destination: PathBuf,
    pub concurrency: usize,
    pub clone_url: CloneUrlKind,
    pub dry_run: bool,
    pub git_binary: String,
}

impl Settings {
    pub fn new(server: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            token: token.into(),
            group: None,
            destination: PathBuf::from("."),
            concurrency: DEFAULT_CONCURRENCY,
            clone_url: CloneUrlKind::default(),
            dry_run: false,
            git_binary: "git".to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), MirrorError> {
        if self.server.trim().is_empty() {
            return Err(MirrorError::InvalidSettings("server must be set".into()));
        }
        if !(self.server.starts_with("http://") || self.server.starts_with("https://")) {
            return Err(MirrorError::InvalidSettings(format!(
                "server must start with http:// or https://, got '{}'",
                self.server
            )));
        }
        if self.token.trim().is_empty() {
            return Err(MirrorError::InvalidSettings("token must be set".into()));
        }
        if self.concurrency == 0 {
            return Err(MirrorError::InvalidSettings(
                "concurrency must be >= 1".into(),
            ));
        }
        if self.git_binary.trim().is_empty() {
            return Err(MirrorError::InvalidSettings(
                "git_binary must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// One layer of settings; unset fields fall through to lower layers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialSettings {
    pub server: Option<String>,
    pub token: Option<String>,
    pub group: Option<GroupId>,
    pub destination: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub clone_url: Option<CloneUrlKind>,
    pub dry_run: Option<bool>,
    pub git_binary: Option<String>,
}

impl PartialSettings {
    /// Stack `over` on top of `self`; fields set in `over` win.
    pub fn merge(self, over: PartialSettings) -> PartialSettings {
        PartialSettings {
            server: over.server.or(self.server),
            token: over.token.or(self.token),
            group: over.group.or(self.group),
            destination: over.destination.or(self.destination),
            concurrency: over.concurrency.or(self.concurrency),
            clone_url: over.clone_url.or(self.clone_url),
            dry_run: over.dry_run.or(self.dry_run),
            git_binary: over.git_binary.or(self.git_binary),
        }
    }

    pub fn resolve(self) -> Result<Settings> {
        let server = self
            .server
            .ok_or_else(|| MirrorError::InvalidSettings("server must be set".into()))?;
        let token = self
            .token
            .ok_or_else(|| MirrorError::InvalidSettings("token must be set".into()))?;

        let mut settings = Settings::new(server, token);
        settings.group = self.group;
        if let Some(destination) = self.destination {
            settings.destination = destination;
        }
        if let Some(concurrency) = self.concurrency {
            settings.concurrency = concurrency;
        }
        if let Some(kind) = self.clone_url {
            settings.clone_url = kind;
        }
        settings.dry_run = self.dry_run.unwrap_or(false);
        if let Some(git) = self.git_binary {
            settings.git_binary = git;
        }

        settings.validate()?;
        Ok(settings)
    }
}

pub fn load_settings_file(path: &Path) -> Result<PartialSettings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let partial: PartialSettings =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    Ok(partial)
}
