//! Page-number pagination over GitLab listing endpoints.
//!
//! Pages are requested with `page=N&per_page=100` starting at page 1. A page
//! shorter than [`PER_PAGE`] (including an empty one) ends the listing. All
//! pages are concatenated in server order; any failed request discards the
//! partial listing and returns the error.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::api::ListingApi;

pub const PER_PAGE: usize = 100;

/// `endpoint` with pagination parameters for `page` appended.
pub fn page_path(endpoint: &str, page: usize) -> String {
    let sep = if endpoint.contains('?') { '&' } else { '?' };
    format!("{}{}page={}&per_page={}", endpoint, sep, page, PER_PAGE)
}

/// Fetch every page of `endpoint` and return the concatenated items.
pub async fn fetch_all<T>(api: &dyn ListingApi, endpoint: &str) -> Result<Vec<T>>
where
    T: DeserializeOwned,
{
    let mut results = Vec::new();
    let mut page = 1;

    loop {
        let path = page_path(endpoint, page);
        let items: Vec<T> = match api.get_json(&path).await? {
            value @ Value::Array(_) => serde_json::from_value(value)
                .with_context(|| format!("Unexpected item shape in page {} of {}", page, endpoint))?,
            other => bail!(
                "Expected a JSON array from {}, got {}",
                endpoint,
                json_kind(&other)
            ),
        };

        let count = items.len();
        debug!(endpoint, page, count, "fetched page");
        results.extend(items);

        if count < PER_PAGE {
            break;
        }
        page += 1;
    }

    Ok(results)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
