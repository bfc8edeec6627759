use std::{
    fmt,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    process::Command,
    str::FromStr,
    time::Duration,
};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::{models::Conclusion, util::extract_remote_url};

pub const DEFAULT_HOST: &str = "github.com";
pub const DEFAULT_CONFIG_FILE: &str = "rerun-failed.yml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GitHubConfig {
    pub token: Option<String>,
    /// Overrides the API base, e.g. for GitHub Enterprise Server.
    pub api_url: Option<String>,
}

impl Config {
    /// Load the config from `path`, or from the default file if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let file = BufReader::new(
            File::open(&path)
                .with_context(|| format!("Failed to open config file {}", path.display()))?,
        );
        serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

impl GitHubConfig {
    /// Resolve the API token: config file, then `GH_TOKEN`, `GITHUB_TOKEN`, then `gh auth token`.
    pub fn resolve_token(&self, host: &str) -> Result<String> {
        if let Some(token) = self.token.as_ref().filter(|t| !t.is_empty()) {
            return Ok(token.clone());
        }
        for var in ["GH_TOKEN", "GITHUB_TOKEN"] {
            if let Ok(token) = std::env::var(var)
                && !token.is_empty()
            {
                return Ok(token);
            }
        }
        let output = Command::new("gh")
            .args(["auth", "token", "--hostname", host])
            .output()
            .context("No token configured and failed to run `gh auth token`")?;
        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() || token.is_empty() {
            bail!("No GitHub token found; set GH_TOKEN or run `gh auth login`");
        }
        Ok(token)
    }

    pub fn api_base(&self, host: &str) -> Option<String> {
        if let Some(url) = &self.api_url {
            Some(url.clone())
        } else if host.eq_ignore_ascii_case(DEFAULT_HOST) {
            None
        } else {
            Some(format!("https://{host}/api/v3"))
        }
    }
}

/// A repository in `[HOST/]OWNER/REPO` form.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub host: String,
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self { host: DEFAULT_HOST.to_string(), owner: owner.into(), name: name.into() }
    }

    /// Determine the repository from the `origin` remote of the current directory.
    pub fn current() -> Result<Self> {
        let output = Command::new("git")
            .args(["remote", "get-url", "origin"])
            .output()
            .context("Failed to run git")?;
        if !output.status.success() {
            bail!("Not a git repository with an `origin` remote; use --repo");
        }
        let url = String::from_utf8_lossy(&output.stdout);
        let url = url.trim();
        let (host, owner, name) = extract_remote_url(url)
            .ok_or_else(|| anyhow!("Unrecognized remote URL {url}"))?;
        Ok(Self { host: host.to_string(), owner: owner.to_string(), name: name.to_string() })
    }
}

impl FromStr for RepoRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.contains("://") || s.starts_with("git@") {
            let (host, owner, name) =
                extract_remote_url(s).ok_or_else(|| anyhow!("Unrecognized repository URL {s}"))?;
            return Ok(Self {
                host: host.to_string(),
                owner: owner.to_string(),
                name: name.to_string(),
            });
        }
        let parts = s.split('/').collect::<Vec<_>>();
        let (host, owner, name) = match parts.as_slice() {
            [owner, name] => (DEFAULT_HOST, *owner, *name),
            [host, owner, name] => (*host, *owner, *name),
            _ => bail!("Expected the \"[HOST/]OWNER/REPO\" format, got {s:?}"),
        };
        if host.is_empty() || owner.is_empty() || name.is_empty() {
            bail!("Expected the \"[HOST/]OWNER/REPO\" format, got {s:?}");
        }
        Ok(Self { host: host.to_string(), owner: owner.to_string(), name: name.to_string() })
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// What to look for and what to do with it. Built once per invocation.
#[derive(Debug, Clone)]
pub struct SelectionCriteria {
    pub repo: RepoRef,
    pub branch: Option<String>,
    pub limit: Option<usize>,
    pub since: Option<Duration>,
    pub pr: Option<u64>,
    pub all_open_prs: bool,
    pub dry_run: bool,
    pub failed_only: bool,
    pub include_drafts: bool,
    pub include_cancelled: bool,
    pub include_timed_out: bool,
}

impl SelectionCriteria {
    pub fn new(repo: RepoRef) -> Self {
        Self {
            repo,
            branch: None,
            limit: None,
            since: None,
            pr: None,
            all_open_prs: false,
            dry_run: false,
            failed_only: true,
            include_drafts: false,
            include_cancelled: false,
            include_timed_out: false,
        }
    }

    /// Conclusions to query for. Always starts with `failure`.
    pub fn statuses(&self) -> Vec<Conclusion> {
        let mut statuses = vec![Conclusion::Failure];
        if self.include_cancelled {
            statuses.push(Conclusion::Cancelled);
        }
        if self.include_timed_out {
            statuses.push(Conclusion::TimedOut);
        }
        statuses
    }

    /// The result cap, if one is set and positive.
    pub fn cap(&self) -> Option<usize> { self.limit.filter(|&l| l > 0) }

    pub fn branch(&self) -> Option<&str> { self.branch.as_deref().filter(|b| !b.is_empty()) }

    pub fn pr(&self) -> Option<u64> { self.pr.filter(|&n| n > 0) }

    /// The lookback window, if one is set and non-zero.
    pub fn since(&self) -> Option<Duration> { self.since.filter(|d| !d.is_zero()) }
}

/// Parse a duration such as `24h`, `90m`, `1h30m` or `2d`.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        bail!("Empty duration");
    }
    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            bail!("Invalid duration {s:?}: expected a number");
        }
        let value: u64 =
            rest[..digits].parse().with_context(|| format!("Invalid duration {s:?}"))?;
        rest = &rest[digits..];
        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = match &rest[..unit_len] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.saturating_mul(60)),
            "h" => Duration::from_secs(value.saturating_mul(60 * 60)),
            "d" => Duration::from_secs(value.saturating_mul(60 * 60 * 24)),
            "" => bail!("Invalid duration {s:?}: missing unit"),
            other => bail!("Invalid duration {s:?}: unknown unit {other:?}"),
        };
        total += unit;
        rest = &rest[unit_len..];
    }
    Ok(total)
}
