use std::future::Future;

use anyhow::Result;
use rerun_failed_core::models::{RunPage, WorkflowRun};

/// Items requested per page from the runs endpoints.
pub const PAGE_SIZE: u32 = 100;
/// Hard page cap for repository-wide run listings.
pub const MAX_CONTEXT_PAGES: u32 = 10;
/// Hard page cap for commit-scoped run listings.
pub const MAX_COMMIT_PAGES: u32 = 5;

/// Fetch pages one at a time until a short page, the reported total, the limit
/// or `max_pages` is reached.
pub async fn collect_pages<F, Fut>(
    limit: Option<usize>,
    max_pages: u32,
    mut fetch_page: F,
) -> Result<Vec<WorkflowRun>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<RunPage>>,
{
    let limit = limit.filter(|&l| l > 0);
    let mut runs = Vec::new();
    for page in 1..=max_pages {
        let RunPage { total_count, items } = fetch_page(page).await?;
        let page_len = items.len();
        if page_len == 0 {
            break;
        }
        for run in items {
            runs.push(run);
            if limit.is_some_and(|l| runs.len() >= l) {
                return Ok(runs);
            }
        }
        if runs.len() >= total_count || page_len < PAGE_SIZE as usize {
            break;
        }
    }
    Ok(runs)
}

/// Number of pages needed to cover `count` items.
pub fn pages_for(count: usize) -> u32 {
    count.div_ceil(PAGE_SIZE as usize).try_into().unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use rerun_failed_core::models::{RunStatus, WorkflowRun};
    use time::OffsetDateTime;

    use super::*;

    fn page(start: u64, len: usize, total_count: usize) -> RunPage {
        let items = (0..len as u64)
            .map(|i| WorkflowRun {
                id: start + i,
                run_number: start + i,
                run_attempt: 1,
                name: "CI".into(),
                head_branch: "main".into(),
                head_sha: "abc".into(),
                conclusion: None,
                status: RunStatus::Completed,
                created_at: OffsetDateTime::UNIX_EPOCH,
                html_url: String::new(),
            })
            .collect();
        RunPage { total_count, items }
    }

    async fn run(limit: Option<usize>, max_pages: u32, total: usize) -> (usize, u32) {
        let calls = Arc::new(AtomicU32::new(0));
        let runs = collect_pages(limit, max_pages, |p| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let start = (p as usize - 1) * PAGE_SIZE as usize;
                let len = total.saturating_sub(start).min(PAGE_SIZE as usize);
                Ok(page(start as u64, len, total))
            }
        })
        .await
        .unwrap();
        (runs.len(), calls.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_collect_pages() {
        let cases: &[(Option<usize>, u32, usize, (usize, u32))] = &[
            // Stops once the reported total is reached
            (None, MAX_COMMIT_PAGES, 250, (250, 3)),
            // Exact multiple of the page size
            (None, MAX_COMMIT_PAGES, 200, (200, 2)),
            // Limit reached mid-page
            (Some(150), MAX_COMMIT_PAGES, 250, (150, 2)),
            // Page cap
            (None, MAX_COMMIT_PAGES, 5000, (500, 5)),
            // Empty result
            (None, MAX_COMMIT_PAGES, 0, (0, 1)),
            // Zero limit means no limit
            (Some(0), MAX_COMMIT_PAGES, 120, (120, 2)),
        ];
        for &(limit, max_pages, total, expected) in cases {
            assert_eq!(run(limit, max_pages, total).await, expected, "{limit:?} {total}");
        }
    }

    #[test]
    fn test_pages_for() {
        assert_eq!(pages_for(0), 0);
        assert_eq!(pages_for(1), 1);
        assert_eq!(pages_for(100), 1);
        assert_eq!(pages_for(250), 3);
    }
}
