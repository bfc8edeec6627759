use std::time::Duration;

use rerun_failed_core::config::{RepoRef, parse_duration};

// For argp::FromArgs
pub fn duration(value: &str) -> Result<Duration, String> {
    parse_duration(value).map_err(|e| e.to_string())
}

pub fn repo_ref(value: &str) -> Result<RepoRef, String> {
    value.parse().map_err(|e: anyhow::Error| e.to_string())
}

/// Width of the attached terminal, if stdout is one.
pub fn terminal_width() -> Option<usize> {
    console::Term::stdout().size_checked().map(|(_, cols)| cols as usize).filter(|&w| w > 0)
}
