use std::{collections::HashMap, sync::Arc};

use rerun_failed_core::{
    models::{RunId, WorkflowRun},
    util::{format_timestamp, truncate},
};
use rerun_failed_github::RunSource;

use crate::{enrich::CommitIndex, pool::run_bounded};

pub const RENDER_CONCURRENCY: usize = 5;
pub const DEFAULT_TERMINAL_WIDTH: usize = 120;

const WORKFLOW_WIDTH: usize = 40;
const ATTEMPT_WIDTH: usize = 3;
const BRANCH_WIDTH: usize = 20;
const SHA_WIDTH: usize = 7;
const DATE_WIDTH: usize = 19;
// Six " | " column separators
const SEPARATORS_WIDTH: usize = 18;
const MIN_URL_WIDTH: usize = 3;
const MIN_MESSAGE_WIDTH: usize = 20;

/// Column widths of the dry-run table.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct TableLayout {
    pub url_width: usize,
    pub message_width: usize,
    pub line_width: usize,
}

impl TableLayout {
    pub fn new(terminal_width: usize, runs: &[WorkflowRun]) -> Self {
        let url_width = runs
            .iter()
            .map(|run| run.html_url.chars().count())
            .max()
            .unwrap_or_default()
            .max(MIN_URL_WIDTH);
        let overhead = SEPARATORS_WIDTH
            + WORKFLOW_WIDTH
            + ATTEMPT_WIDTH
            + BRANCH_WIDTH
            + SHA_WIDTH
            + DATE_WIDTH
            + url_width;
        let message_width = terminal_width.saturating_sub(overhead).max(MIN_MESSAGE_WIDTH);
        let line_width = (overhead + message_width).min(terminal_width);
        Self { url_width, message_width, line_width }
    }

    pub fn header(&self) -> String {
        format!(
            "{:<WORKFLOW_WIDTH$} | {:<ATTEMPT_WIDTH$} | {:<BRANCH_WIDTH$} | {:<SHA_WIDTH$} | {:<DATE_WIDTH$} | {:<url_width$} | {}",
            "Workflow (+Failed Jobs)",
            "Att",
            "Branch@Dist",
            "SHA",
            "Created At",
            "URL",
            "Message",
            url_width = self.url_width,
        )
    }

    pub fn separator(&self) -> String { "-".repeat(self.line_width) }

    pub fn row(&self, row: &Row<'_>) -> String {
        let run = row.run;
        let name = if row.failed_jobs.is_empty() {
            run.name.clone()
        } else {
            format!("{} ({})", run.name, row.failed_jobs.join(", "))
        };
        let branch = format!("{}@{}", run.head_branch, row.distance);
        format!(
            "{:<WORKFLOW_WIDTH$} | {:<ATTEMPT_WIDTH$} | {:<BRANCH_WIDTH$} | {:<SHA_WIDTH$} | {:<DATE_WIDTH$} | {:<url_width$} | {}",
            truncate(&name, WORKFLOW_WIDTH),
            run.run_attempt,
            truncate(&branch, BRANCH_WIDTH),
            run.short_sha(),
            format_timestamp(run.created_at),
            run.html_url,
            truncate(&row.message, self.message_width),
            url_width = self.url_width,
        )
    }
}

/// Everything needed to render one table row.
pub struct Row<'a> {
    pub run: &'a WorkflowRun,
    pub failed_jobs: &'a [String],
    pub distance: String,
    pub message: String,
}

/// Render one row per run, looking up missing commit messages concurrently.
///
/// Rows are returned in the order of `runs`.
pub async fn render_rows(
    source: &Arc<dyn RunSource>,
    layout: TableLayout,
    runs: &[WorkflowRun],
    failed_jobs: &Arc<HashMap<RunId, Vec<String>>>,
    commits: &Arc<CommitIndex>,
) -> Vec<String> {
    run_bounded(runs.to_vec(), RENDER_CONCURRENCY, |run| {
        let source = source.clone();
        let failed_jobs = failed_jobs.clone();
        let commits = commits.clone();
        async move {
            let message = commits
                .message(source.as_ref(), &run.head_sha)
                .await
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "unknown".to_string());
            let failed = failed_jobs.get(&run.id).map(Vec::as_slice).unwrap_or_default();
            layout.row(&Row {
                run: &run,
                failed_jobs: failed,
                distance: commits.distance_label(&run.head_sha),
                message,
            })
        }
    })
    .await
}
