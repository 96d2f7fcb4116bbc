//! Designated per-site log files and the commands that read them.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::nginx;
use crate::shell::quote;
use crate::types::Timestamp;

/// Upper bound on lines returned by one request.
pub const MAX_LINES: usize = 5000;

/// Default window when the caller does not ask for a size.
pub const DEFAULT_LINES: usize = 100;

static ACCESS_TS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d{2}/\w{3}/\d{4}:\d{2}:\d{2}:\d{2} [+-]\d{4})\]").expect("valid regex"));

static ERROR_TS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2})").expect("valid regex"));

/// The logs a caller may read for a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    NginxAccess,
    NginxError,
    SiteError,
    CmsDebug,
}

impl LogKind {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "nginx_access" | "access" => Ok(LogKind::NginxAccess),
            "nginx_error" | "error" => Ok(LogKind::NginxError),
            "site_error" | "php_error" => Ok(LogKind::SiteError),
            "cms_debug" | "wp_debug" | "debug" => Ok(LogKind::CmsDebug),
            other => Err(CoreError::Validation(format!("Unknown log '{other}'"))),
        }
    }

    /// Absolute path of this log for a site.
    pub fn path(self, domain: &str, site_path: &str) -> String {
        let site_path = site_path.trim_end_matches('/');
        match self {
            LogKind::NginxAccess => nginx::access_log_path(domain),
            LogKind::NginxError => nginx::error_log_path(domain),
            LogKind::SiteError => format!("{site_path}/logs/error.log"),
            LogKind::CmsDebug => format!("{site_path}/wp-content/debug.log"),
        }
    }
}

/// Clamp a requested window to `1..=MAX_LINES`.
pub fn clamp_lines(requested: Option<usize>) -> usize {
    requested.unwrap_or(DEFAULT_LINES).clamp(1, MAX_LINES)
}

/// Last `lines` lines of `path`; prints nothing when the file is absent.
pub fn tail_command(path: &str, lines: usize) -> String {
    format!("if [ -f {0} ]; then tail -n {lines} {0}; fi", quote(path))
}

/// Last `lines` lines of `path` containing `pattern` (literal, case-insensitive).
pub fn search_command(path: &str, pattern: &str, lines: usize) -> String {
    format!(
        "if [ -f {0} ]; then {{ grep -F -i -- {1} {0} || true; }} | tail -n {lines}; fi",
        quote(path),
        quote(pattern)
    )
}

/// Timestamp of an nginx access or error log line.
pub fn parse_line_timestamp(line: &str) -> Option<Timestamp> {
    if let Some(caps) = ACCESS_TS_RE.captures(line) {
        return DateTime::parse_from_str(&caps[1], "%d/%b/%Y:%H:%M:%S %z")
            .ok()
            .map(|dt| dt.to_utc());
    }
    if let Some(caps) = ERROR_TS_RE.captures(line) {
        // nginx writes error logs in server local time; hosts run in UTC.
        return NaiveDateTime::parse_from_str(&caps[1], "%Y/%m/%d %H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc());
    }
    None
}

/// Lines strictly newer than `since`.
///
/// Lines without a timestamp (stack traces, wrapped messages) follow the
/// decision made for the preceding timestamped line.
pub fn filter_since<'a>(lines: impl IntoIterator<Item = &'a str>, since: Timestamp) -> Vec<String> {
    let mut keep = false;
    let mut out = Vec::new();
    for line in lines {
        if let Some(ts) = parse_line_timestamp(line) {
            keep = ts > since;
        }
        if keep {
            out.push(line.to_string());
        }
    }
    out
}
