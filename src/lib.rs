//! # git-bulk-cloner
//!
//! Mirror an entire GitLab group hierarchy onto local disk.
//!
//! Given a server URL and an access token, the mirror walks every group and
//! sub-group it can see, lists each group's own projects, and clones every
//! project into a directory tree that reproduces the remote group paths:
//!
//! ```text
//! https://gitlab.example.com/platform/backend/api
//!                  ──▶ <destination>/platform/backend/api
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────────┐   ┌───────────┐
//! │ traverse  │──▶│  paginate  │──▶│    api    │──▶ GitLab v4
//! │ (Mirror)  │   └────────────┘   └───────────┘
//! │           │   ┌────────────┐
//! │           │──▶│   clone    │──▶ git clone
//! └─────┬─────┘   └────────────┘
//!       │ every listing and clone
//!       ▼
//! ┌───────────┐
//! │   gate    │  at most N operations in flight
//! └───────────┘
//! ```
//!
//! Re-running against an existing mirror is safe: projects that are already
//! cloned are recognised from `git`'s "already exists" diagnostic and
//! skipped. Nothing is updated or pruned.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Settings layering and validation |
//! | [`models`] | Groups, projects, path prefixes |
//! | [`gate`] | Bounded-concurrency admission |
//! | [`api`] | Authenticated listing transport |
//! | [`paginate`] | Page-number pagination |
//! | [`gitlab`] | GitLab endpoints |
//! | [`clone`] | Per-project clone and outcome classification |
//! | [`traverse`] | Recursive group walk |
//! | [`error`] | Typed failures |
//! | [`logging`] | `tracing` subscriber setup |

pub mod api;
pub mod clone;
pub mod config;
pub mod error;
pub mod gate;
pub mod gitlab;
pub mod logging;
pub mod models;
pub mod paginate;
pub mod traverse;

pub use config::Settings;
pub use error::MirrorError;
pub use traverse::{Mirror, MirrorReport};
