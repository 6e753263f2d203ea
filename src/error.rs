//! Typed failures that callers may want to tell apart.
//!
//! These travel inside [`anyhow::Error`] like every other error in the
//! crate; use `downcast_ref::<MirrorError>()` to inspect them.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// A listing request came back with a non-2xx status.
    #[error("GET {url} failed with status {status}")]
    Http { url: String, status: u16 },

    /// `git clone` failed in a way that is not the harmless
    /// "already cloned" condition.
    #[error("git clone {url} into {} failed ({status}): {stderr}", .path.display())]
    CloneFailed {
        url: String,
        path: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("concurrency gate closed")]
    GateClosed,
}
