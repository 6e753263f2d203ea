//! # git-bulk-cloner CLI
//!
//! Clones every project of a GitLab instance (or of one group) into a local
//! directory tree mirroring the group hierarchy.
//!
//! ## Usage
//!
//! ```bash
//! # Everything the token can see, into the current directory
//! git-bulk-cloner --server https://gitlab.example.com --token glpat-...
//!
//! # One group and its sub-groups, 10 operations at a time
//! git-bulk-cloner -s https://gitlab.example.com -t glpat-... \
//!     --group platform/backend --destination /srv/mirror --concurrency 10
//!
//! # Settings from a file, token from the environment
//! GITLAB_TOKEN=glpat-... git-bulk-cloner --config mirror.toml --dry-run
//! ```

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use git_bulk_cloner::config::{self, CloneUrlKind, PartialSettings};
use git_bulk_cloner::models::GroupId;
use git_bulk_cloner::{logging, Mirror};

/// Mirror a GitLab group hierarchy onto local disk.
///
/// Flags override environment variables, which override the `--config`
/// file.
#[derive(Parser)]
#[command(name = "git-bulk-cloner", version, about)]
struct Cli {
    /// Path to a TOML settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// GitLab server URL.
    #[arg(short, long, env = "GITLAB_SERVER")]
    server: Option<String>,

    /// GitLab private token.
    #[arg(short, long, env = "GITLAB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Group or sub-group to clone (numeric id or full path). Defaults to all.
    #[arg(short, long)]
    group: Option<GroupId>,

    /// Destination folder for cloned repositories. Defaults to the current
    /// directory.
    #[arg(short, long)]
    destination: Option<PathBuf>,

    /// Maximum listing requests and clones in flight at once (default 5).
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Which project URL to clone from.
    #[arg(long, value_enum)]
    clone_url: Option<CloneUrlArg>,

    /// List what would be cloned without creating anything.
    #[arg(long)]
    dry_run: bool,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum CloneUrlArg {
    Ssh,
    Http,
}

impl From<CloneUrlArg> for CloneUrlKind {
    fn from(arg: CloneUrlArg) -> Self {
        match arg {
            CloneUrlArg::Ssh => CloneUrlKind::Ssh,
            CloneUrlArg::Http => CloneUrlKind::Http,
        }
    }
}

impl Cli {
    fn overrides(&self) -> PartialSettings {
        PartialSettings {
            server: self.server.clone(),
            token: self.token.clone(),
            group: self.group.clone(),
            destination: self.destination.clone(),
            concurrency: self.concurrency,
            clone_url: self.clone_url.map(Into::into),
            dry_run: self.dry_run.then_some(true),
            git_binary: None,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let file = match &cli.config {
        Some(path) => config::load_settings_file(path)?,
        None => PartialSettings::default(),
    };
    let settings = file.merge(cli.overrides()).resolve()?;
    let dry_run = settings.dry_run;

    let mirror = Mirror::from_settings(settings)?;
    let report = mirror.run().await?;

    if dry_run {
        println!(
            "dry run: {} groups, {} projects would be cloned",
            report.groups_visited, report.planned
        );
    } else {
        println!(
            "mirrored {} groups: {} cloned, {} already present",
            report.groups_visited, report.cloned, report.already_present
        );
    }

    Ok(())
}
