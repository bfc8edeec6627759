use std::sync::OnceLock;

use regex::Regex;
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const CLOCK_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[hour]:[minute]:[second]");

/// Extract `(host, owner, repo)` from an https or ssh remote URL.
pub fn extract_remote_url(url: &str) -> Option<(&str, &str, &str)> {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    let caps = REGEX
        .get_or_init(|| {
            Regex::new(
                r"^(?:(?:https?|ssh|git)://(?:[^@/]+@)?(?P<host>[^/:]+)(?::\d+)?/|git@(?P<ssh_host>[^:]+):)(?P<owner>[^/]+)/(?P<repo>[^/]+?)(?:\.git)?/?$",
            )
            .unwrap()
        })
        .captures(url)?;
    let host = caps.name("host").or_else(|| caps.name("ssh_host"))?.as_str();
    let owner = caps.name("owner")?.as_str();
    let repo = caps.name("repo")?.as_str();
    Some((host, owner, repo))
}

/// Format a timestamp as `YYYY-MM-DD HH:MM:SS`.
pub fn format_timestamp(value: OffsetDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).unwrap_or_else(|_| value.to_string())
}

/// Format a unix timestamp as `HH:MM:SS` (UTC).
pub fn format_clock(unix: i64) -> String {
    OffsetDateTime::from_unix_timestamp(unix)
        .ok()
        .and_then(|t| t.format(CLOCK_FORMAT).ok())
        .unwrap_or_else(|| unix.to_string())
}

/// Shorten `s` to at most `width` characters, ending in `...` if cut.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    if width > 3 {
        let mut out = s.chars().take(width - 3).collect::<String>();
        out.push_str("...");
        out
    } else {
        s.chars().take(width).collect()
    }
}
