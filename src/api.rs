//! GitLab listing transport.
//!
//! The traversal only ever issues authenticated `GET` requests that return
//! JSON. [`ListingApi`] is that seam: [`HttpListingApi`] talks to a real
//! server through `reqwest`, and tests substitute in-memory fakes.
//!
//! # Credentials
//!
//! The access token is attached to every request as a `private_token` query
//! parameter by [`build_url`], which also collapses accidental `//` in the
//! path portion of the URL.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::Settings;
use crate::error::MirrorError;

const TOKEN_PARAM: &str = "private_token";

/// Full request URL for an API `path` (which may carry its own query).
///
/// ```
/// use git_bulk_cloner::api::build_url;
///
/// assert_eq!(
///     build_url("https://git.example.com/", "tok", "api/v4/groups"),
///     "https://git.example.com/api/v4/groups?private_token=tok"
/// );
/// ```
pub fn build_url(server: &str, token: &str, path: &str) -> String {
    let mut url = format!("{}/{}", server, path);
    url.push(if url.contains('?') { '&' } else { '?' });
    url.push_str(TOKEN_PARAM);
    url.push('=');
    url.push_str(token);
    collapse_slashes(&url)
}

/// Squash runs of `/` between the scheme and the query string.
fn collapse_slashes(url: &str) -> String {
    let (scheme, rest) = match url.find("://") {
        Some(idx) => url.split_at(idx + 3),
        None => ("", url),
    };
    let (path, query) = match rest.find('?') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };

    let mut out = String::with_capacity(url.len());
    out.push_str(scheme);
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' && prev_slash {
            continue;
        }
        prev_slash = c == '/';
        out.push(c);
    }
    out.push_str(query);
    out
}

/// `url` with the token value masked, for logs and error messages.
pub fn redact(url: &str) -> String {
    let marker = format!("{}=", TOKEN_PARAM);
    match url.find(&marker) {
        Some(start) => {
            let value_start = start + marker.len();
            let value_end = url[value_start..]
                .find('&')
                .map(|i| value_start + i)
                .unwrap_or(url.len());
            format!("{}[redacted]{}", &url[..value_start], &url[value_end..])
        }
        None => url.to_string(),
    }
}

/// Source of JSON listing responses.
#[async_trait]
pub trait ListingApi: Send + Sync {
    /// `GET` an API path (relative to the server, query string allowed)
    /// and return the decoded JSON body.
    async fn get_json(&self, path: &str) -> Result<Value>;
}

/// [`ListingApi`] backed by a GitLab server over HTTP(S).
pub struct HttpListingApi {
    client: reqwest::Client,
    server: String,
    token: String,
}

impl HttpListingApi {
    pub fn new(server: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("git-bulk-cloner/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            server: server.into(),
            token: token.into(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.server.clone(), settings.token.clone())
    }
}

#[async_trait]
impl ListingApi for HttpListingApi {
    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = build_url(&self.server, &self.token, path);
        debug!(url = %redact(&url), "GET");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MirrorError::Http {
                url: redact(&url),
                status: status.as_u16(),
            }
            .into());
        }

        Ok(response.json().await?)
    }
}
