pub mod graphql;
pub mod pagination;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use http::StatusCode;
use octocrab::{GitHubError, Octocrab};
use rerun_failed_core::{
    config::{GitHubConfig, RepoRef},
    models::{Commit, Conclusion, Job, PullRequest, RateLimit, RunId, RunPage, WorkflowRun},
};
use time::{
    OffsetDateTime, UtcOffset, format_description::BorrowedFormatItem,
    macros::format_description,
};

use crate::pagination::{MAX_COMMIT_PAGES, PAGE_SIZE, collect_pages};

/// The remote operations the rerun pipeline depends on.
#[async_trait]
pub trait RunSource: Send + Sync {
    /// Fetch one page of repository-wide runs with the given conclusion.
    async fn list_runs(
        &self,
        branch: Option<&str>,
        status: Conclusion,
        created_after: Option<OffsetDateTime>,
        per_page: u32,
        page: u32,
    ) -> Result<RunPage>;

    /// Fetch all runs for a commit with the given conclusion, up to `limit`.
    async fn list_runs_for_commit(
        &self,
        sha: &str,
        status: Conclusion,
        limit: Option<usize>,
    ) -> Result<Vec<WorkflowRun>>;

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest>;

    /// Open pull requests, newest created first.
    async fn list_open_pull_requests(&self) -> Result<Vec<PullRequest>>;

    /// Most recent commits on `branch` (or the default branch), tip first.
    async fn list_commits(&self, branch: Option<&str>, count: u8) -> Result<Vec<Commit>>;

    async fn get_commit(&self, sha: &str) -> Result<Commit>;

    async fn list_jobs(&self, run_id: RunId) -> Result<Vec<Job>>;

    async fn rerun(&self, run_id: RunId, failed_only: bool) -> Result<()>;

    async fn rate_limit(&self) -> Result<RateLimit>;
}

#[derive(Clone)]
pub struct GitHub {
    pub client: Octocrab,
    pub repo: RepoRef,
}

#[derive(serde::Serialize)]
struct RunParams<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    head_sha: Option<&'a str>,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    created: Option<String>,
    per_page: u32,
    page: u32,
}

#[derive(serde::Serialize)]
struct PageParams {
    per_page: u8,
}

#[derive(serde::Deserialize)]
struct RunsResponse {
    total_count: usize,
    #[serde(default)]
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(serde::Serialize)]
struct CommitParams<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    per_page: u8,
}

#[derive(serde::Deserialize)]
struct CommitResponse {
    sha: String,
    commit: CommitDetail,
}

#[derive(serde::Deserialize)]
struct CommitDetail {
    message: String,
}

impl From<CommitResponse> for Commit {
    fn from(response: CommitResponse) -> Self {
        Self { sha: response.sha, message: response.commit.message }
    }
}

#[derive(serde::Deserialize)]
struct JobsResponse {
    #[serde(default)]
    jobs: Vec<Job>,
}

#[derive(serde::Deserialize)]
struct RateLimitResponse {
    resources: RateLimitResources,
}

#[derive(serde::Deserialize)]
struct RateLimitResources {
    core: RateLimit,
}

const QUERY_TIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");

impl GitHub {
    pub fn new(config: &GitHubConfig, repo: RepoRef) -> Result<Self> {
        let token = config.resolve_token(&repo.host)?;
        let mut builder = Octocrab::builder().personal_token(token);
        if let Some(base) = config.api_base(&repo.host) {
            builder = builder
                .base_uri(base.as_str())
                .with_context(|| format!("Invalid API base URL {base}"))?;
        }
        let client = builder.build().context("Failed to create GitHub client")?;
        Ok(Self { client, repo })
    }

    pub fn with_client(client: Octocrab, repo: RepoRef) -> Self { Self { client, repo } }

    fn route(&self, path: &str) -> String {
        format!("/repos/{}/{}/{}", self.repo.owner, self.repo.name, path)
    }

    async fn runs_page(&self, params: &RunParams<'_>) -> Result<RunPage> {
        tracing::debug!(
            "Fetching page {} for runs with status {}{}",
            params.page,
            params.status,
            params.head_sha.map(|sha| format!(" and SHA {sha}")).unwrap_or_default()
        );
        let response: RunsResponse = self
            .client
            .get(self.route("actions/runs"), Some(params))
            .await
            .with_context(|| format!("Failed to fetch {} runs page {}", params.status, params.page))?;
        Ok(RunPage { total_count: response.total_count, items: response.workflow_runs })
    }
}

fn is_not_found(err: &octocrab::Error) -> bool {
    matches!(err, octocrab::Error::GitHub { source, .. }
        if matches!(**source, GitHubError { status_code: StatusCode::NOT_FOUND, .. }))
}

#[async_trait]
impl RunSource for GitHub {
    async fn list_runs(
        &self,
        branch: Option<&str>,
        status: Conclusion,
        created_after: Option<OffsetDateTime>,
        per_page: u32,
        page: u32,
    ) -> Result<RunPage> {
        let created = created_after.and_then(|t| {
            t.to_offset(UtcOffset::UTC).format(QUERY_TIME_FORMAT).ok().map(|t| format!(">={t}"))
        });
        self.runs_page(&RunParams {
            branch,
            head_sha: None,
            status: status.as_str(),
            created,
            per_page,
            page,
        })
        .await
    }

    async fn list_runs_for_commit(
        &self,
        sha: &str,
        status: Conclusion,
        limit: Option<usize>,
    ) -> Result<Vec<WorkflowRun>> {
        collect_pages(limit, MAX_COMMIT_PAGES, |page| async move {
            self.runs_page(&RunParams {
                branch: None,
                head_sha: Some(sha),
                status: status.as_str(),
                created: None,
                per_page: PAGE_SIZE,
                page,
            })
            .await
        })
        .await
    }

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
        graphql::fetch_pull_request(&self.client, &self.repo, number).await
    }

    async fn list_open_pull_requests(&self) -> Result<Vec<PullRequest>> {
        graphql::fetch_open_pull_requests(&self.client, &self.repo).await
    }

    async fn list_commits(&self, branch: Option<&str>, count: u8) -> Result<Vec<Commit>> {
        let commits: Vec<CommitResponse> = self
            .client
            .get(self.route("commits"), Some(&CommitParams { sha: branch, per_page: count }))
            .await
            .context("Failed to fetch commits")?;
        Ok(commits.into_iter().map(Commit::from).collect())
    }

    async fn get_commit(&self, sha: &str) -> Result<Commit> {
        let route = self.route(&format!("commits/{sha}"));
        match self.client.get::<CommitResponse, _, ()>(route, None).await {
            Ok(commit) => Ok(commit.into()),
            Err(e) if is_not_found(&e) => Err(anyhow!("Commit {sha} not found")),
            Err(e) => Err(e).with_context(|| format!("Failed to fetch commit {sha}")),
        }
    }

    async fn list_jobs(&self, run_id: RunId) -> Result<Vec<Job>> {
        let response: JobsResponse = self
            .client
            .get(
                self.route(&format!("actions/runs/{run_id}/jobs")),
                Some(&PageParams { per_page: 100 }),
            )
            .await
            .with_context(|| format!("Failed to fetch jobs for run {run_id}"))?;
        Ok(response.jobs)
    }

    async fn rerun(&self, run_id: RunId, failed_only: bool) -> Result<()> {
        let endpoint = if failed_only { "rerun-failed-jobs" } else { "rerun" };
        let response = self
            .client
            ._post(self.route(&format!("actions/runs/{run_id}/{endpoint}")), None::<&()>)
            .await
            .with_context(|| format!("Failed to request rerun of run {run_id}"))?;
        octocrab::map_github_error(response)
            .await
            .with_context(|| format!("Rerun of run {run_id} was rejected"))?;
        Ok(())
    }

    async fn rate_limit(&self) -> Result<RateLimit> {
        let response: RateLimitResponse = self
            .client
            .get("/rate_limit", None::<&()>)
            .await
            .context("Failed to fetch rate limit")?;
        Ok(response.resources.core)
    }
}
