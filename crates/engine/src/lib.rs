pub mod aggregate;
pub mod dispatch;
pub mod enrich;
pub mod pool;
pub mod report;
pub mod resolve;

#[cfg(test)]
mod fake;

use std::sync::Arc;

use anyhow::Result;
use rerun_failed_core::{
    config::SelectionCriteria,
    models::{RateLimit, WorkflowRun},
    util::format_clock,
};
use rerun_failed_github::RunSource;
use time::OffsetDateTime;

use crate::{
    aggregate::{Selection, finalize},
    dispatch::{DispatchOutcome, dispatch},
    enrich::{CommitIndex, fetch_failed_jobs},
    report::{DEFAULT_TERMINAL_WIDTH, TableLayout, render_rows},
    resolve::{Resolver, Target},
};

type Clock = Box<dyn Fn() -> OffsetDateTime + Send + Sync>;

/// Result of a single pass.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    /// Distinct matching runs before the cap was applied.
    pub total_found: usize,
    /// Runs that were reported or dispatched, newest first.
    pub runs: Vec<WorkflowRun>,
    /// Rendered dry-run table rows, in the order of `runs`.
    pub rows: Vec<String>,
    /// Per-run rerun results, in the order of `runs`. Empty for dry runs.
    pub dispatched: Vec<DispatchOutcome>,
}

/// Finds failed workflow runs and reruns (or reports) them.
pub struct Rerunner {
    source: Arc<dyn RunSource>,
    criteria: SelectionCriteria,
    terminal_width: usize,
    clock: Clock,
}

impl Rerunner {
    pub fn new(source: Arc<dyn RunSource>, criteria: SelectionCriteria) -> Self {
        Self {
            source,
            criteria,
            terminal_width: DEFAULT_TERMINAL_WIDTH,
            clock: Box::new(OffsetDateTime::now_utc),
        }
    }

    pub fn with_terminal_width(mut self, width: usize) -> Self {
        if width > 0 {
            self.terminal_width = width;
        }
        self
    }

    pub fn with_clock(mut self, clock: impl Fn() -> OffsetDateTime + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Runs created at or before this instant are ignored.
    fn cutoff(&self) -> Option<OffsetDateTime> {
        self.criteria.since().map(|since| {
            let since = time::Duration::try_from(since).unwrap_or(time::Duration::MAX);
            (self.clock)().saturating_sub(since)
        })
    }

    pub async fn run(&self) -> Result<Summary> {
        let criteria = &self.criteria;
        println!("Targeting repository: {}", criteria.repo);

        let start_rate = self.sample_rate_limit("start").await;
        if let Some(rate) = &start_rate {
            tracing::info!(
                "Rate limit at start: {}/{} (resets at {})",
                rate.remaining,
                rate.limit,
                format_clock(rate.reset)
            );
        }

        let target = Target::from_criteria(criteria);
        let commits = if criteria.branch().is_some() || !matches!(target, Target::PullRequest(_))
        {
            CommitIndex::load(self.source.as_ref(), criteria.branch()).await
        } else {
            CommitIndex::default()
        };

        let runs = Resolver::new(&self.source, criteria, self.cutoff()).resolve().await?;
        if runs.is_empty() {
            println!("No failed workflow runs found matching the criteria.");
            return Ok(Summary::default());
        }

        let Selection { runs, total_found } = finalize(runs, criteria.cap());
        println!(
            "Found {} failed/cancelled workflow runs (processed {}).",
            total_found,
            runs.len()
        );

        let failed_jobs = Arc::new(fetch_failed_jobs(&self.source, &runs).await);

        if criteria.dry_run {
            let layout = TableLayout::new(self.terminal_width, &runs);
            let rows =
                render_rows(&self.source, layout, &runs, &failed_jobs, &Arc::new(commits)).await;
            println!();
            println!("{}", layout.header());
            println!("{}", layout.separator());
            for row in &rows {
                println!("{row}");
            }
            println!("Dry-run complete. No reruns were triggered.");
            return Ok(Summary { total_found, runs, rows, dispatched: Vec::new() });
        }

        println!("Starting reruns...");
        let dispatched = dispatch(&self.source, &runs, criteria.failed_only).await;

        if let Some(end_rate) = self.sample_rate_limit("end").await {
            let spent =
                start_rate.map(|start| start.remaining.saturating_sub(end_rate.remaining));
            tracing::info!(
                "Rate limit at end: {}/{} (spent {})",
                end_rate.remaining,
                end_rate.limit,
                spent.unwrap_or_default()
            );
        }
        let failed = dispatched.iter().filter(|o| !o.succeeded()).count();
        if failed > 0 {
            tracing::warn!("{} of {} reruns could not be triggered", failed, dispatched.len());
        }
        println!("Done triggering reruns.");
        Ok(Summary { total_found, runs, rows: Vec::new(), dispatched })
    }

    async fn sample_rate_limit(&self, when: &str) -> Option<RateLimit> {
        match self.source.rate_limit().await {
            Ok(rate) => Some(rate),
            Err(e) => {
                tracing::warn!("Could not fetch {} rate limit: {:#}", when, e);
                None
            }
        }
    }
}
