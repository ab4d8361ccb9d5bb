//! Upstream issue-tracker access.
//!
//! [`IssueSearch`] is the single expensive capability the rest of the
//! system depends on; [`RestSearch`] implements it against the tracker's
//! JSON search API, and [`producers`] composes searches into the dashboard
//! view payloads.

pub mod producers;
mod rest;

pub use rest::RestSearch;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("tracker request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("tracker returned status {status}")]
    Status { status: u16 },
    #[error("failed to decode tracker response: {0}")]
    Decode(String),
    #[error("cannot build tracker query: {0}")]
    Query(String),
}

/// A single issue as far as the dashboard cares: when it was created and
/// which labels it carries.
#[derive(Debug, Clone, Default)]
pub struct Issue {
    pub created: Option<OffsetDateTime>,
    pub labels: Vec<String>,
}

/// One page of search results.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub total: u64,
    pub issues: Vec<Issue>,
}

/// The expensive upstream capability: run a saved search against the
/// issue tracker.
#[async_trait]
pub trait IssueSearch: Send + Sync {
    /// Number of issues matching `query`, without fetching any of them.
    async fn count(&self, query: &str) -> Result<u64, SourceError>;

    /// One page of issues matching `query`, projected to `fields`.
    async fn search(
        &self,
        query: &str,
        fields: &[&str],
        max_results: u32,
        start_at: u32,
    ) -> Result<SearchPage, SourceError>;

    /// Every issue matching `query`, paging until the reported total is
    /// reached.
    async fn search_all(
        &self,
        query: &str,
        fields: &[&str],
        page_size: u32,
    ) -> Result<Vec<Issue>, SourceError> {
        let mut issues = Vec::new();
        let mut start_at = 0u32;
        loop {
            let page = self.search(query, fields, page_size, start_at).await?;
            let fetched = page.issues.len() as u32;
            issues.extend(page.issues);
            if fetched == 0 || issues.len() as u64 >= page.total {
                break;
            }
            start_at += fetched;
        }
        Ok(issues)
    }
}
