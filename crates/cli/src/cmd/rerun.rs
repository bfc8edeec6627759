use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use argp::FromArgs;
use rerun_failed_core::config::{Config, RepoRef, SelectionCriteria};
use rerun_failed_engine::Rerunner;
use rerun_failed_github::GitHub;

use crate::util::{duration, repo_ref, terminal_width};

#[derive(FromArgs, PartialEq, Debug)]
/// Find failed GitHub Actions workflow runs and rerun them.
pub struct Args {
    #[argp(option, short = 'R', from_str_fn(repo_ref))]
    /// select another repository using the [HOST/]OWNER/REPO format
    repo: Option<RepoRef>,
    #[argp(option, short = 'b')]
    /// only consider runs for this branch
    branch: Option<String>,
    #[argp(option, short = 'L')]
    /// maximum number of runs to rerun
    limit: Option<usize>,
    #[argp(option, short = 's', from_str_fn(duration))]
    /// only consider runs created within this window (e.g. 24h, 90m, 2d)
    since: Option<Duration>,
    #[argp(option)]
    /// only consider runs for the head commit of this pull request
    pr: Option<u64>,
    #[argp(switch)]
    /// consider the head commits of all open pull requests
    all_prs: bool,
    #[argp(switch)]
    /// list the runs that would be rerun without triggering anything
    dry_run: bool,
    #[argp(option, default = "true")]
    /// rerun only the failed jobs (default true); false reruns every job
    failed_only: bool,
    #[argp(switch)]
    /// include draft pull requests with --all-prs
    include_drafts: bool,
    #[argp(switch)]
    /// also rerun cancelled runs
    include_cancelled: bool,
    #[argp(switch)]
    /// also rerun timed out runs
    include_timed_out: bool,
    #[argp(option)]
    /// config file (default: rerun-failed.yml if present)
    config: Option<PathBuf>,
}

impl Args {
    fn criteria(&self, repo: RepoRef) -> SelectionCriteria {
        SelectionCriteria {
            branch: self.branch.clone(),
            limit: self.limit,
            since: self.since,
            pr: self.pr,
            all_open_prs: self.all_prs,
            dry_run: self.dry_run,
            failed_only: self.failed_only,
            include_drafts: self.include_drafts,
            include_cancelled: self.include_cancelled,
            include_timed_out: self.include_timed_out,
            ..SelectionCriteria::new(repo)
        }
    }
}

pub async fn run(args: Args) -> Result<()> {
    let config = Config::load(args.config.as_deref())?;
    let repo = match &args.repo {
        Some(repo) => repo.clone(),
        None => RepoRef::current().context("Failed to determine the repository")?,
    };
    let github = GitHub::new(&config.github, repo.clone())?;
    let mut rerunner = Rerunner::new(Arc::new(github), args.criteria(repo));
    if let Some(width) = terminal_width() {
        rerunner = rerunner.with_terminal_width(width);
    }
    let summary = rerunner.run().await?;
    tracing::debug!(
        "Processed {} of {} matching runs ({} dispatched)",
        summary.runs.len(),
        summary.total_found,
        summary.dispatched.len()
    );
    Ok(())
}
