use anyhow::{Result, anyhow, bail};
use octocrab::Octocrab;
use rerun_failed_core::{config::RepoRef, models::PullRequest};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;

const PULL_REQUEST_QUERY: &str = r#"
query GetPullRequest($owner: String!, $name: String!, $number: Int!) {
  repository(owner: $owner, name: $name) {
    pullRequest(number: $number) {
      number
      headRefOid
      isDraft
      title
    }
  }
}
"#;

const OPEN_PULL_REQUESTS_QUERY: &str = r#"
query ListOpenPullRequests($owner: String!, $name: String!) {
  repository(owner: $owner, name: $name) {
    pullRequests(first: 100, states: OPEN, orderBy: {field: CREATED_AT, direction: DESC}) {
      nodes {
        number
        headRefOid
        isDraft
        title
      }
    }
  }
}
"#;

#[derive(Deserialize)]
struct Response<T> {
    data: Option<T>,
    errors: Option<Vec<Error>>,
}

#[derive(Deserialize)]
struct Error {
    message: String,
}

#[derive(Deserialize)]
struct RepositoryData<T> {
    repository: Option<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestData {
    pull_request: Option<PullRequest>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestsData {
    pull_requests: Nodes<PullRequest>,
}

#[derive(Deserialize)]
struct Nodes<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<Option<T>>,
}

async fn run_query<T: DeserializeOwned>(
    client: &Octocrab,
    query: &str,
    variables: serde_json::Value,
) -> Result<T> {
    let response: Response<T> =
        client.graphql(&json!({ "query": query, "variables": variables })).await?;
    if let Some(errors) = response.errors
        && !errors.is_empty()
    {
        let message = errors.into_iter().map(|error| error.message).collect::<Vec<_>>().join("\n");
        bail!("GraphQL query failed: {message}");
    }
    response.data.ok_or_else(|| anyhow!("No data returned from GraphQL query"))
}

pub async fn fetch_pull_request(
    client: &Octocrab,
    repo: &RepoRef,
    number: u64,
) -> Result<PullRequest> {
    let data = run_query::<RepositoryData<PullRequestData>>(
        client,
        PULL_REQUEST_QUERY,
        json!({ "owner": repo.owner, "name": repo.name, "number": number }),
    )
    .await?;
    data.repository
        .and_then(|r| r.pull_request)
        .ok_or_else(|| anyhow!("Pull request #{number} not found in {repo}"))
}

/// Open pull requests, newest created first.
pub async fn fetch_open_pull_requests(
    client: &Octocrab,
    repo: &RepoRef,
) -> Result<Vec<PullRequest>> {
    let data = run_query::<RepositoryData<PullRequestsData>>(
        client,
        OPEN_PULL_REQUESTS_QUERY,
        json!({ "owner": repo.owner, "name": repo.name }),
    )
    .await?;
    let repository = data.repository.ok_or_else(|| anyhow!("Repository {repo} not found"))?;
    Ok(repository.pull_requests.nodes.into_iter().flatten().collect())
}
