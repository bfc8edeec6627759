use std::{collections::HashSet, sync::Arc};

use anyhow::{Context, Result};
use rerun_failed_core::models::{Conclusion, WorkflowRun};
use rerun_failed_github::{
    RunSource,
    pagination::{MAX_CONTEXT_PAGES, PAGE_SIZE, pages_for},
};
use time::OffsetDateTime;
use tokio::task::JoinSet;

/// The merged, deduplicated and ordered result of a resolution pass.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Runs to act on, newest first, at most `cap` of them.
    pub runs: Vec<WorkflowRun>,
    /// Number of distinct runs found before the cap was applied.
    pub total_found: usize,
}

/// Deduplicate by run ID, sort newest first and apply the cap.
pub fn finalize(runs: Vec<WorkflowRun>, cap: Option<usize>) -> Selection {
    let mut seen = HashSet::with_capacity(runs.len());
    let mut runs = runs.into_iter().filter(|run| seen.insert(run.id)).collect::<Vec<_>>();
    sort_newest_first(&mut runs);
    let total_found = runs.len();
    if let Some(cap) = cap.filter(|&c| c > 0) {
        runs.truncate(cap);
    }
    Selection { runs, total_found }
}

pub fn sort_newest_first(runs: &mut [WorkflowRun]) {
    runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

fn created_after(runs: Vec<WorkflowRun>, cutoff: Option<OffsetDateTime>) -> Vec<WorkflowRun> {
    match cutoff {
        Some(cutoff) => runs.into_iter().filter(|run| run.created_at > cutoff).collect(),
        None => runs,
    }
}

/// Fetch repository-wide runs for every status concurrently.
///
/// Every fetch is awaited; if any of them failed the whole aggregation fails.
pub async fn fetch_context_runs(
    source: &Arc<dyn RunSource>,
    branch: Option<&str>,
    statuses: &[Conclusion],
    cutoff: Option<OffsetDateTime>,
    limit: Option<usize>,
) -> Result<Vec<WorkflowRun>> {
    let mut set = JoinSet::new();
    for (index, &status) in statuses.iter().enumerate() {
        let source = source.clone();
        let branch = branch.map(str::to_owned);
        set.spawn(async move {
            let result = fetch_paginated(source, branch.as_deref(), status, cutoff, limit)
                .await
                .with_context(|| format!("Failed to fetch {status} workflow runs"));
            (index, result)
        });
    }
    let mut results = Vec::with_capacity(statuses.len());
    while let Some(join_result) = set.join_next().await {
        results.push(join_result.context("Workflow run fetch task failed")?);
    }
    results.sort_by_key(|(index, _)| *index);
    let mut runs = Vec::new();
    for (_, result) in results {
        runs.extend(result?);
    }
    Ok(runs)
}

/// Fetch all runs for one status, fetching page 1 first and the rest in parallel.
pub async fn fetch_paginated(
    source: Arc<dyn RunSource>,
    branch: Option<&str>,
    status: Conclusion,
    cutoff: Option<OffsetDateTime>,
    limit: Option<usize>,
) -> Result<Vec<WorkflowRun>> {
    let limit = limit.filter(|&l| l > 0);
    let first = source
        .list_runs(branch, status, cutoff, PAGE_SIZE, 1)
        .await
        .context("Failed to fetch page 1")?;
    let first_len = first.items.len();
    // Pages are newest first, so an old last item means nothing older is needed
    let reached_cutoff = cutoff
        .is_some_and(|cutoff| first.items.last().is_some_and(|run| run.created_at <= cutoff));
    let mut runs = created_after(first.items, cutoff);
    if first_len < PAGE_SIZE as usize
        || reached_cutoff
        || limit.is_some_and(|limit| runs.len() >= limit)
    {
        if let Some(limit) = limit {
            runs.truncate(limit);
        }
        return Ok(runs);
    }

    let mut pages = pages_for(first.total_count).min(MAX_CONTEXT_PAGES);
    if let Some(limit) = limit {
        pages = pages.min(pages_for(limit));
    }
    if pages <= 1 {
        return Ok(runs);
    }

    let mut set = JoinSet::new();
    for page in 2..=pages {
        let source = source.clone();
        let branch = branch.map(str::to_owned);
        set.spawn(async move {
            let result = source
                .list_runs(branch.as_deref(), status, cutoff, PAGE_SIZE, page)
                .await
                .with_context(|| format!("Failed to fetch page {page}"));
            (page, result)
        });
    }
    let mut results = Vec::with_capacity(pages as usize - 1);
    while let Some(join_result) = set.join_next().await {
        results.push(join_result.context("Page fetch task failed")?);
    }
    results.sort_by_key(|(page, _)| *page);
    for (_, result) in results {
        runs.extend(created_after(result?.items, cutoff));
    }

    if let Some(limit) = limit {
        sort_newest_first(&mut runs);
        runs.truncate(limit);
    }
    Ok(runs)
}

/// Fetch the runs of a single commit for every status concurrently.
///
/// A failed status is logged and skipped.
pub async fn fetch_commit_runs(
    source: &Arc<dyn RunSource>,
    sha: &str,
    statuses: &[Conclusion],
    cutoff: Option<OffsetDateTime>,
    limit: Option<usize>,
) -> Vec<WorkflowRun> {
    let mut set = JoinSet::new();
    for (index, &status) in statuses.iter().enumerate() {
        let source = source.clone();
        let sha = sha.to_owned();
        set.spawn(async move {
            let result = source.list_runs_for_commit(&sha, status, limit).await;
            (index, status, result)
        });
    }
    let mut results = Vec::with_capacity(statuses.len());
    while let Some(join_result) = set.join_next().await {
        match join_result {
            Ok(result) => results.push(result),
            Err(e) => tracing::warn!("Commit run fetch task for {} failed: {:?}", sha, e),
        }
    }
    results.sort_by_key(|(index, _, _)| *index);
    let mut runs = Vec::new();
    for (_, status, result) in results {
        match result {
            Ok(items) => runs.extend(items),
            Err(e) => {
                tracing::warn!("Failed to fetch {} runs for sha {}: {:#}", status, sha, e)
            }
        }
    }
    created_after(runs, cutoff)
}

#[cfg(test)]
mod tests {
    use time::{Duration, macros::datetime};

    use super::*;
    use crate::fake::{FakeSource, run};

    const NOW: OffsetDateTime = datetime!(2025-12-18 12:00:00 UTC);

    /// `count` runs one minute apart, newest first.
    fn runs(start_id: u64, count: usize) -> Vec<WorkflowRun> {
        (0..count)
            .map(|i| run(start_id + i as u64, "abc", NOW - Duration::minutes(i as i64)))
            .collect()
    }

    fn shared(fake: FakeSource) -> (Arc<FakeSource>, Arc<dyn RunSource>) {
        let fake = Arc::new(fake);
        (fake.clone(), fake)
    }

    #[tokio::test]
    async fn test_paginated_fetches_all_pages() {
        let (fake, source) =
            shared(FakeSource::default().with_runs(Conclusion::Failure, runs(1, 250)));
        let result =
            fetch_paginated(source, None, Conclusion::Failure, None, None).await.unwrap();
        assert_eq!(result.len(), 250);
        let mut pages = fake.calls().list_runs.iter().map(|(_, p)| *p).collect::<Vec<_>>();
        pages.sort();
        assert_eq!(pages, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_paginated_stops_at_limit_page() {
        let (fake, source) =
            shared(FakeSource::default().with_runs(Conclusion::Failure, runs(1, 1000)));
        let result =
            fetch_paginated(source, None, Conclusion::Failure, None, Some(150)).await.unwrap();
        assert_eq!(result.len(), 150);
        assert_eq!(fake.calls().list_runs.len(), 2);
        assert!(result.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        assert_eq!(result[0].id, 1);
    }

    #[tokio::test]
    async fn test_paginated_limit_within_first_page() {
        let (fake, source) =
            shared(FakeSource::default().with_runs(Conclusion::Failure, runs(1, 500)));
        let result =
            fetch_paginated(source, None, Conclusion::Failure, None, Some(30)).await.unwrap();
        assert_eq!(result.len(), 30);
        assert_eq!(fake.calls().list_runs, vec![(Conclusion::Failure, 1)]);
    }

    #[tokio::test]
    async fn test_paginated_page_cap() {
        let (fake, source) =
            shared(FakeSource::default().with_runs(Conclusion::Failure, runs(1, 1500)));
        let result =
            fetch_paginated(source, None, Conclusion::Failure, None, None).await.unwrap();
        assert_eq!(result.len(), 1000);
        assert_eq!(fake.calls().list_runs.len(), MAX_CONTEXT_PAGES as usize);
    }

    #[tokio::test]
    async fn test_paginated_stops_at_cutoff_page() {
        // Page 1 spans 100 minutes, so a 30 minute lookback ends inside it
        let (fake, source) =
            shared(FakeSource::default().with_runs(Conclusion::Failure, runs(1, 400)));
        let cutoff = NOW - Duration::minutes(30);
        let result =
            fetch_paginated(source, None, Conclusion::Failure, Some(cutoff), None).await.unwrap();
        assert_eq!(result.len(), 30);
        assert!(result.iter().all(|r| r.created_at > cutoff));
        assert_eq!(fake.calls().list_runs.len(), 1);
    }

    #[tokio::test]
    async fn test_paginated_filters_later_pages() {
        // The cutoff falls on page 3
        let (fake, source) =
            shared(FakeSource::default().with_runs(Conclusion::Failure, runs(1, 400)));
        let cutoff = NOW - Duration::minutes(250);
        let result =
            fetch_paginated(source, None, Conclusion::Failure, Some(cutoff), None).await.unwrap();
        assert_eq!(result.len(), 250);
        assert_eq!(fake.calls().list_runs.len(), 4);
    }

    #[tokio::test]
    async fn test_context_runs_merge_statuses() {
        let (_, source) = shared(
            FakeSource::default()
                .with_runs(Conclusion::Failure, runs(1, 3))
                .with_runs(Conclusion::Cancelled, runs(100, 2)),
        );
        let result = fetch_context_runs(
            &source,
            Some("main"),
            &[Conclusion::Failure, Conclusion::Cancelled, Conclusion::TimedOut],
            None,
            None,
        )
        .await
        .unwrap();
        assert_eq!(result.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3, 100, 101]);
    }

    #[tokio::test]
    async fn test_context_runs_fail_fast() {
        let mut fake = FakeSource::default().with_runs(Conclusion::Failure, runs(1, 3));
        fake.failing_statuses.insert(Conclusion::Cancelled);
        let (fake, source) = shared(fake);
        let err = fetch_context_runs(
            &source,
            None,
            &[Conclusion::Failure, Conclusion::Cancelled],
            None,
            None,
        )
        .await
        .unwrap_err();
        assert!(format!("{err:#}").contains("cancelled"), "{err:#}");
        // The sibling fetch still ran to completion
        assert!(fake.calls().list_runs.contains(&(Conclusion::Failure, 1)));
    }

    #[tokio::test]
    async fn test_commit_runs_skip_failed_status_and_apply_lookback() {
        let mut fake = FakeSource::default()
            .with_commit_runs("abc", Conclusion::Failure, vec![
                run(1, "abc", datetime!(2025-12-18 10:00:00 UTC)),
                run(2, "abc", datetime!(2025-12-16 10:00:00 UTC)),
            ])
            .with_commit_runs("abc", Conclusion::TimedOut, vec![run(
                3,
                "abc",
                datetime!(2025-12-18 11:00:00 UTC),
            )]);
        fake.failing_commit_statuses.insert(Conclusion::Cancelled);
        let (_, source) = shared(fake);
        let cutoff = NOW - Duration::hours(24);
        let result = fetch_commit_runs(
            &source,
            "abc",
            &[Conclusion::Failure, Conclusion::Cancelled, Conclusion::TimedOut],
            Some(cutoff),
            None,
        )
        .await;
        assert_eq!(result.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_finalize() {
        let input = vec![
            run(1, "a", datetime!(2025-12-18 08:00:00 UTC)),
            run(2, "a", datetime!(2025-12-18 11:00:00 UTC)),
            run(1, "a", datetime!(2025-12-18 08:00:00 UTC)),
            run(3, "b", datetime!(2025-12-18 09:00:00 UTC)),
            run(4, "b", datetime!(2025-12-18 10:00:00 UTC)),
        ];
        let selection = finalize(input.clone(), Some(2));
        assert_eq!(selection.total_found, 4);
        assert_eq!(selection.runs.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 4]);

        let selection = finalize(input, None);
        assert_eq!(selection.runs.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 4, 3, 1]);
        assert!(selection.runs.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }
}
