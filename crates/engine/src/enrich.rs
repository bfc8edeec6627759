use std::{collections::HashMap, sync::Arc};

use rerun_failed_core::models::{Commit, RunId, WorkflowRun};
use rerun_failed_github::RunSource;
use tokio::sync::Mutex;

use crate::pool::run_bounded;

pub const JOB_FETCH_CONCURRENCY: usize = 10;
/// How many commits from the branch tip are used to compute distances.
pub const COMMIT_HISTORY_DEPTH: u8 = 50;

/// Names of the failed jobs of each run. Runs without failed jobs (or whose
/// jobs could not be fetched) are absent.
pub async fn fetch_failed_jobs(
    source: &Arc<dyn RunSource>,
    runs: &[WorkflowRun],
) -> HashMap<RunId, Vec<String>> {
    let run_ids = runs.iter().map(|run| run.id).collect::<Vec<_>>();
    run_bounded(run_ids, JOB_FETCH_CONCURRENCY, |run_id| {
        let source = source.clone();
        async move {
            match source.list_jobs(run_id).await {
                Ok(jobs) => {
                    let failed = jobs
                        .into_iter()
                        .filter(|job| job.failed())
                        .map(|job| job.name)
                        .collect::<Vec<_>>();
                    (run_id, failed)
                }
                Err(e) => {
                    tracing::debug!("Failed to fetch jobs for run {}: {:#}", run_id, e);
                    (run_id, Vec::new())
                }
            }
        }
    })
    .await
    .into_iter()
    .filter(|(_, failed)| !failed.is_empty())
    .collect()
}

/// Recent commits on the target branch plus a cache of looked-up commit messages.
#[derive(Default)]
pub struct CommitIndex {
    distances: HashMap<String, usize>,
    messages: Mutex<HashMap<String, String>>,
}

impl CommitIndex {
    pub fn from_commits(commits: &[Commit]) -> Self {
        let mut distances = HashMap::with_capacity(commits.len());
        let mut messages = HashMap::with_capacity(commits.len());
        for (distance, commit) in commits.iter().enumerate() {
            distances.entry(commit.sha.clone()).or_insert(distance);
            messages.insert(commit.sha.clone(), commit.summary().to_string());
        }
        Self { distances, messages: Mutex::new(messages) }
    }

    /// Fetch the most recent commits of `branch` (or the default branch).
    pub async fn load(source: &dyn RunSource, branch: Option<&str>) -> Self {
        match source.list_commits(branch, COMMIT_HISTORY_DEPTH).await {
            Ok(commits) => Self::from_commits(&commits),
            Err(e) => {
                tracing::warn!("Failed to fetch recent commits: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn distance(&self, sha: &str) -> Option<usize> { self.distances.get(sha).copied() }

    /// `HEAD`, `HEAD^n`, or `HEAD^?` for commits outside the fetched history.
    pub fn distance_label(&self, sha: &str) -> String {
        match self.distance(sha) {
            Some(0) => "HEAD".to_string(),
            Some(distance) => format!("HEAD^{distance}"),
            None => "HEAD^?".to_string(),
        }
    }

    /// First line of the commit message, fetching and caching unknown commits.
    pub async fn message(&self, source: &dyn RunSource, sha: &str) -> Option<String> {
        if let Some(message) = self.messages.lock().await.get(sha) {
            return Some(message.clone());
        }
        match source.get_commit(sha).await {
            Ok(commit) => {
                let message = commit.summary().to_string();
                self.messages.lock().await.insert(sha.to_string(), message.clone());
                Some(message)
            }
            Err(e) => {
                tracing::debug!("Failed to fetch commit {}: {:#}", sha, e);
                None
            }
        }
    }
}
