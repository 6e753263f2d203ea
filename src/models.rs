//! Core data models used throughout the mirror.
//!
//! [`Group`] and [`Project`] are deserialized straight from the GitLab
//! listing API and live only as long as the traversal step that fetched
//! them. [`PathPrefix`] is the local directory prefix accumulated on the way
//! down the group tree.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::CloneUrlKind;

/// Identifier of a GitLab group: either the numeric id or a full path
/// such as `"platform/backend"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
pub enum GroupId {
    Numeric(u64),
    Path(String),
}

impl GroupId {
    /// Form used inside an API path. Full group paths must have their
    /// slashes escaped or GitLab treats them as extra path components.
    pub fn as_url_segment(&self) -> String {
        match self {
            GroupId::Numeric(id) => id.to_string(),
            GroupId::Path(path) => path.replace('/', "%2F"),
        }
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupId::Numeric(id) => write!(f, "{}", id),
            GroupId::Path(path) => f.write_str(path),
        }
    }
}

impl FromStr for GroupId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().parse::<u64>() {
            Ok(id) => GroupId::Numeric(id),
            Err(_) => GroupId::Path(s.trim().to_string()),
        })
    }
}

impl From<u64> for GroupId {
    fn from(id: u64) -> Self {
        GroupId::Numeric(id)
    }
}

/// A group or sub-group as returned by `GET /groups`.
#[derive(Debug, Clone, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    /// Path segment used for the local directory name.
    pub path: String,
}

/// A project as returned by `GET /groups/:id/projects?simple=true`.
#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub path: String,
    pub ssh_url_to_repo: String,
    #[serde(default)]
    pub http_url_to_repo: Option<String>,
}

impl Project {
    /// Remote endpoint to clone from.
    pub fn clone_url(&self, kind: CloneUrlKind) -> anyhow::Result<&str> {
        match kind {
            CloneUrlKind::Ssh => Ok(&self.ssh_url_to_repo),
            CloneUrlKind::Http => self.http_url_to_repo.as_deref().ok_or_else(|| {
                anyhow::anyhow!("project '{}' has no http_url_to_repo", self.name)
            }),
        }
    }
}

/// Path segments from the traversal root down to the current group.
///
/// Each recursive visit owns its own prefix; [`child`](PathPrefix::child)
/// returns an extended copy and leaves `self` untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathPrefix(Vec<String>);

impl PathPrefix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `root` joined with every segment in order.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for segment in &self.0 {
            path.push(segment);
        }
        path
    }
}

impl fmt::Display for PathPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl<S: Into<String>> FromIterator<S> for PathPrefix {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
