//! Read-only access to a site's designated log files.

use hostwright_core::error::CoreError;
use hostwright_core::log_tail::{self, LogKind, MAX_LINES};
use hostwright_core::types::{DbId, Timestamp};
use serde::Serialize;

use crate::context::Context;

/// Lines read from one log.
#[derive(Debug, Clone, Serialize)]
pub struct LogExcerpt {
    pub log: LogKind,
    pub path: String,
    pub lines: Vec<String>,
}

#[derive(Clone)]
pub struct LogGateway {
    ctx: Context,
}

impl LogGateway {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// The last `lines` lines (default 100, at most 5000).
    pub async fn tail(&self, website_id: DbId, log: LogKind, lines: Option<usize>) -> Result<LogExcerpt, CoreError> {
        let lines = log_tail::clamp_lines(lines);
        self.read(website_id, log, |path| log_tail::tail_command(path, lines))
            .await
    }

    /// The last matching lines for a literal, case-insensitive pattern.
    pub async fn search(
        &self,
        website_id: DbId,
        log: LogKind,
        pattern: &str,
        lines: Option<usize>,
    ) -> Result<LogExcerpt, CoreError> {
        if pattern.trim().is_empty() {
            return Err(CoreError::Validation("Search pattern is required".into()));
        }
        let lines = log_tail::clamp_lines(lines);
        self.read(website_id, log, |path| log_tail::search_command(path, pattern, lines))
            .await
    }

    /// Lines written after `since`, from the last 5000 lines of the log.
    pub async fn since(&self, website_id: DbId, log: LogKind, since: Timestamp) -> Result<LogExcerpt, CoreError> {
        let mut excerpt = self
            .read(website_id, log, |path| log_tail::tail_command(path, MAX_LINES))
            .await?;
        excerpt.lines = log_tail::filter_since(excerpt.lines.iter().map(String::as_str), since);
        Ok(excerpt)
    }

    async fn read(
        &self,
        website_id: DbId,
        log: LogKind,
        command: impl FnOnce(&str) -> String,
    ) -> Result<LogExcerpt, CoreError> {
        let website = self.ctx.website(website_id).await?;
        let host = self.ctx.site_host(&website).await?;
        let path = log.path(&website.domain, &website.site_path);
        let outcome = self.ctx.exec(&host, &command(&path)).await?;
        Ok(LogExcerpt {
            log,
            path,
            lines: outcome.stdout.lines().map(str::to_string).collect(),
        })
    }
}
