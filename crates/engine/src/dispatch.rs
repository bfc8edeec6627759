use std::sync::Arc;

use rerun_failed_core::models::{RunId, WorkflowRun};
use rerun_failed_github::RunSource;

use crate::pool::run_bounded;

pub const DISPATCH_CONCURRENCY: usize = 5;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DispatchOutcome {
    pub run_id: RunId,
    /// The error message if the rerun could not be triggered.
    pub error: Option<String>,
}

impl DispatchOutcome {
    pub fn succeeded(&self) -> bool { self.error.is_none() }
}

/// Trigger a rerun of every run, reporting each result as it completes.
pub async fn dispatch(
    source: &Arc<dyn RunSource>,
    runs: &[WorkflowRun],
    failed_only: bool,
) -> Vec<DispatchOutcome> {
    run_bounded(runs.to_vec(), DISPATCH_CONCURRENCY, |run| {
        let source = source.clone();
        async move {
            match source.rerun(run.id, failed_only).await {
                Ok(()) => {
                    println!(
                        "✓ Triggered rerun for: {} ({}) | #{} (attempt {}) | {}",
                        run.name,
                        run.head_branch,
                        run.run_number,
                        run.run_attempt,
                        run.short_sha()
                    );
                    DispatchOutcome { run_id: run.id, error: None }
                }
                Err(e) => {
                    println!("✗ Failed to rerun {} ({}): {:#}", run.id, run.name, e);
                    DispatchOutcome { run_id: run.id, error: Some(format!("{e:#}")) }
                }
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::fake::{FakeSource, run};

    #[tokio::test]
    async fn test_failure_does_not_block_others() {
        let mut fake = FakeSource::default();
        fake.failing_reruns.insert(2);
        let fake = Arc::new(fake);
        let source: Arc<dyn RunSource> = fake.clone();
        let runs =
            (1..=3).map(|id| run(id, "abc", OffsetDateTime::UNIX_EPOCH)).collect::<Vec<_>>();

        let outcomes = dispatch(&source, &runs, true).await;
        assert_eq!(
            outcomes.iter().map(|o| (o.run_id, o.succeeded())).collect::<Vec<_>>(),
            vec![(1, true), (2, false), (3, true)]
        );
        assert!(outcomes[1].error.as_deref().is_some_and(|e| e.contains("rejected")));
        let mut reruns = fake.calls().rerun;
        reruns.sort();
        assert_eq!(reruns, vec![(1, true), (2, true), (3, true)]);
    }

    #[tokio::test]
    async fn test_full_rerun_flag() {
        let fake = Arc::new(FakeSource::default());
        let source: Arc<dyn RunSource> = fake.clone();
        let runs = vec![run(9, "abc", OffsetDateTime::UNIX_EPOCH)];
        dispatch(&source, &runs, false).await;
        assert_eq!(fake.calls().rerun, vec![(9, false)]);
    }
}
