//! The GitLab v4 endpoints the mirror walks.
//!
//! Sub-group listings return immediate children only, and project listings
//! exclude projects of sub-groups and projects shared into the group, so a
//! recursive walk sees every project exactly once.

use anyhow::{Context, Result};

use crate::api::ListingApi;
use crate::models::{Group, GroupId, Project};
use crate::paginate::fetch_all;

pub const TOP_LEVEL_GROUPS: &str =
    "api/v4/groups?all_available=true&top_level_only=true&sort=asc&order_by=id";

pub fn subgroups_endpoint(id: &GroupId) -> String {
    format!(
        "api/v4/groups/{}/subgroups?all_available=true&sort=asc&order_by=id",
        id.as_url_segment()
    )
}

pub fn projects_endpoint(id: &GroupId) -> String {
    format!(
        "api/v4/groups/{}/projects?simple=true&include_subgroups=false&with_shared=false&sort=asc&order_by=id",
        id.as_url_segment()
    )
}

pub fn group_endpoint(id: &GroupId) -> String {
    format!("api/v4/groups/{}", id.as_url_segment())
}

pub async fn top_level_groups(api: &dyn ListingApi) -> Result<Vec<Group>> {
    fetch_all(api, TOP_LEVEL_GROUPS).await
}

pub async fn subgroups(api: &dyn ListingApi, id: &GroupId) -> Result<Vec<Group>> {
    fetch_all(api, &subgroups_endpoint(id)).await
}

pub async fn group_projects(api: &dyn ListingApi, id: &GroupId) -> Result<Vec<Project>> {
    fetch_all(api, &projects_endpoint(id)).await
}

/// Look up a single group; used to learn the root group's path segment.
pub async fn group(api: &dyn ListingApi, id: &GroupId) -> Result<Group> {
    let value = api.get_json(&group_endpoint(id)).await?;
    serde_json::from_value(value).with_context(|| format!("Unexpected response for group {}", id))
}
