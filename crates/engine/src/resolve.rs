use std::sync::Arc;

use anyhow::{Context, Result};
use rerun_failed_core::{
    config::SelectionCriteria,
    models::{Conclusion, WorkflowRun},
};
use rerun_failed_github::RunSource;
use time::OffsetDateTime;

use crate::aggregate::{fetch_commit_runs, fetch_context_runs};

/// Consecutive open PRs without recent failures after which scanning stops.
pub const MAX_CONSECUTIVE_EMPTY_PRS: usize = 5;

/// Which runs a pass targets.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Target {
    PullRequest(u64),
    AllOpenPullRequests,
    Context,
}

impl Target {
    pub fn from_criteria(criteria: &SelectionCriteria) -> Self {
        if let Some(number) = criteria.pr() {
            Self::PullRequest(number)
        } else if criteria.all_open_prs {
            Self::AllOpenPullRequests
        } else {
            Self::Context
        }
    }
}

pub struct Resolver<'a> {
    source: &'a Arc<dyn RunSource>,
    criteria: &'a SelectionCriteria,
    statuses: Vec<Conclusion>,
    cutoff: Option<OffsetDateTime>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        source: &'a Arc<dyn RunSource>,
        criteria: &'a SelectionCriteria,
        cutoff: Option<OffsetDateTime>,
    ) -> Self {
        Self { source, criteria, statuses: criteria.statuses(), cutoff }
    }

    /// Collect the candidate runs for the configured target, unsorted.
    pub async fn resolve(&self) -> Result<Vec<WorkflowRun>> {
        match Target::from_criteria(self.criteria) {
            Target::PullRequest(number) => self.runs_for_pull_request(number).await,
            Target::AllOpenPullRequests => self.runs_for_open_pull_requests().await,
            Target::Context => fetch_context_runs(
                self.source,
                self.criteria.branch(),
                &self.statuses,
                self.cutoff,
                self.criteria.cap(),
            )
            .await
            .context("Failed to fetch workflow runs"),
        }
    }

    async fn runs_for_pull_request(&self, number: u64) -> Result<Vec<WorkflowRun>> {
        let pr = self
            .source
            .get_pull_request(number)
            .await
            .with_context(|| format!("Failed to fetch PR #{number}"))?;
        Ok(self.runs_for_commit(&pr.head_sha).await)
    }

    /// Scan open PRs newest first.
    ///
    /// With a lookback window, scanning stops after [`MAX_CONSECUTIVE_EMPTY_PRS`]
    /// PRs in a row had no matching runs. Older PRs with recent failures are
    /// missed in that case.
    async fn runs_for_open_pull_requests(&self) -> Result<Vec<WorkflowRun>> {
        let prs = self
            .source
            .list_open_pull_requests()
            .await
            .context("Failed to fetch open PRs")?;
        let mut runs = Vec::new();
        let mut consecutive_empty = 0;
        for pr in prs {
            if pr.is_draft && !self.criteria.include_drafts {
                tracing::debug!("Skipping draft PR #{}", pr.number);
                continue;
            }
            let pr_runs = self.runs_for_commit(&pr.head_sha).await;
            if !pr_runs.is_empty() {
                tracing::debug!("Found {} runs for PR #{}", pr_runs.len(), pr.number);
                runs.extend(pr_runs);
                consecutive_empty = 0;
            } else if self.cutoff.is_some() {
                consecutive_empty += 1;
                if consecutive_empty >= MAX_CONSECUTIVE_EMPTY_PRS {
                    tracing::info!(
                        "Stopping PR scan after {} consecutive PRs with no recent failed runs",
                        consecutive_empty
                    );
                    break;
                }
            }
        }
        Ok(runs)
    }

    async fn runs_for_commit(&self, sha: &str) -> Vec<WorkflowRun> {
        fetch_commit_runs(self.source, sha, &self.statuses, self.cutoff, self.criteria.cap()).await
    }
}
