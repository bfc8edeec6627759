use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use rerun_failed_core::models::{
    Commit, Conclusion, Job, PullRequest, RateLimit, RunId, RunPage, RunStatus, WorkflowRun,
};
use rerun_failed_github::RunSource;
use time::OffsetDateTime;

pub fn run(id: RunId, sha: &str, created_at: OffsetDateTime) -> WorkflowRun {
    WorkflowRun {
        id,
        run_number: id,
        run_attempt: 1,
        name: format!("Workflow {id}"),
        head_branch: "main".into(),
        head_sha: sha.into(),
        conclusion: Some(Conclusion::Failure),
        status: RunStatus::Completed,
        created_at,
        html_url: format!("https://github.com/owner/repo/actions/runs/{id}"),
    }
}

pub fn pull_request(number: u64, sha: &str, is_draft: bool) -> PullRequest {
    PullRequest { number, head_sha: sha.into(), is_draft, title: format!("PR {number}") }
}

#[derive(Debug, Default, Clone)]
pub struct Calls {
    pub list_runs: Vec<(Conclusion, u32)>,
    pub commit_runs: Vec<(String, Conclusion)>,
    pub get_pull_request: Vec<u64>,
    pub list_commits: usize,
    pub get_commit: Vec<String>,
    pub list_jobs: Vec<RunId>,
    pub rerun: Vec<(RunId, bool)>,
    pub rate_limit: usize,
}

/// In-memory `RunSource` that records every call.
#[derive(Default)]
pub struct FakeSource {
    /// Repository-wide runs per conclusion, newest first.
    pub runs: HashMap<Conclusion, Vec<WorkflowRun>>,
    /// Reported `total_count`, if different from the number of runs.
    pub total_count: Option<usize>,
    pub commit_runs: HashMap<(String, Conclusion), Vec<WorkflowRun>>,
    pub pull_requests: Vec<PullRequest>,
    pub commits: Vec<Commit>,
    pub extra_commits: HashMap<String, Commit>,
    pub jobs: HashMap<RunId, Vec<Job>>,
    pub failing_statuses: HashSet<Conclusion>,
    pub failing_commit_statuses: HashSet<Conclusion>,
    pub failing_jobs: HashSet<RunId>,
    pub failing_reruns: HashSet<RunId>,
    pub failing_rate_limit: bool,
    pub calls: Mutex<Calls>,
}

impl FakeSource {
    pub fn calls(&self) -> Calls { self.calls.lock().unwrap().clone() }

    pub fn with_runs(mut self, status: Conclusion, runs: Vec<WorkflowRun>) -> Self {
        self.runs.insert(status, runs);
        self
    }

    pub fn with_commit_runs(mut self, sha: &str, status: Conclusion, runs: Vec<WorkflowRun>) -> Self {
        self.commit_runs.insert((sha.to_string(), status), runs);
        self
    }
}

#[async_trait]
impl RunSource for FakeSource {
    async fn list_runs(
        &self,
        _branch: Option<&str>,
        status: Conclusion,
        _created_after: Option<OffsetDateTime>,
        per_page: u32,
        page: u32,
    ) -> Result<RunPage> {
        self.calls.lock().unwrap().list_runs.push((status, page));
        if self.failing_statuses.contains(&status) {
            bail!("list_runs failed for {status}");
        }
        let runs = self.runs.get(&status).cloned().unwrap_or_default();
        let total_count = self.total_count.unwrap_or(runs.len());
        let start = ((page - 1) * per_page) as usize;
        let items = runs.into_iter().skip(start).take(per_page as usize).collect();
        Ok(RunPage { total_count, items })
    }

    async fn list_runs_for_commit(
        &self,
        sha: &str,
        status: Conclusion,
        limit: Option<usize>,
    ) -> Result<Vec<WorkflowRun>> {
        self.calls.lock().unwrap().commit_runs.push((sha.to_string(), status));
        if self.failing_commit_statuses.contains(&status) {
            bail!("list_runs_for_commit failed for {status}");
        }
        let mut runs =
            self.commit_runs.get(&(sha.to_string(), status)).cloned().unwrap_or_default();
        if let Some(limit) = limit.filter(|&l| l > 0) {
            runs.truncate(limit);
        }
        Ok(runs)
    }

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
        self.calls.lock().unwrap().get_pull_request.push(number);
        self.pull_requests
            .iter()
            .find(|pr| pr.number == number)
            .cloned()
            .ok_or_else(|| anyhow!("Pull request #{number} not found"))
    }

    async fn list_open_pull_requests(&self) -> Result<Vec<PullRequest>> {
        Ok(self.pull_requests.clone())
    }

    async fn list_commits(&self, _branch: Option<&str>, count: u8) -> Result<Vec<Commit>> {
        self.calls.lock().unwrap().list_commits += 1;
        Ok(self.commits.iter().take(count as usize).cloned().collect())
    }

    async fn get_commit(&self, sha: &str) -> Result<Commit> {
        self.calls.lock().unwrap().get_commit.push(sha.to_string());
        self.extra_commits.get(sha).cloned().ok_or_else(|| anyhow!("Commit {sha} not found"))
    }

    async fn list_jobs(&self, run_id: RunId) -> Result<Vec<Job>> {
        self.calls.lock().unwrap().list_jobs.push(run_id);
        if self.failing_jobs.contains(&run_id) {
            bail!("list_jobs failed for {run_id}");
        }
        Ok(self.jobs.get(&run_id).cloned().unwrap_or_default())
    }

    async fn rerun(&self, run_id: RunId, failed_only: bool) -> Result<()> {
        self.calls.lock().unwrap().rerun.push((run_id, failed_only));
        if self.failing_reruns.contains(&run_id) {
            bail!("rerun rejected for {run_id}");
        }
        Ok(())
    }

    async fn rate_limit(&self) -> Result<RateLimit> {
        let calls = {
            let mut calls = self.calls.lock().unwrap();
            calls.rate_limit += 1;
            calls.rerun.len() as u64
        };
        if self.failing_rate_limit {
            bail!("rate limit unavailable");
        }
        Ok(RateLimit { limit: 5000, remaining: 5000 - calls, reset: 1766059200 })
    }
}
