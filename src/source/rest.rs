//! REST adapter for the issue tracker's JSON search API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::debug;
use url::Url;

use crate::config::TrackerSettings;

use super::{Issue, IssueSearch, SearchPage, SourceError};

const SEARCH_PATH: &str = "rest/api/2/search";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Issue-tracker client over the `/search` endpoint.
pub struct RestSearch {
    http: reqwest::Client,
    search_url: Url,
    username: Option<String>,
    token: Option<String>,
}

impl RestSearch {
    pub fn new(settings: &TrackerSettings) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let search_url = settings
            .base_url
            .join(SEARCH_PATH)
            .map_err(|err| SourceError::Query(err.to_string()))?;

        Ok(Self {
            http,
            search_url,
            username: settings.username.clone(),
            token: settings.token.clone(),
        })
    }

    async fn execute(
        &self,
        query: &str,
        fields: &[&str],
        max_results: u32,
        start_at: u32,
    ) -> Result<RawSearchResponse, SourceError> {
        let mut request = self.http.get(self.search_url.clone()).query(&[
            ("jql", query),
            ("maxResults", &max_results.to_string()),
            ("startAt", &start_at.to_string()),
        ]);
        if !fields.is_empty() {
            request = request.query(&[("fields", fields.join(","))]);
        }
        request = match (self.username.as_deref(), self.token.as_deref()) {
            (Some(username), token) => request.basic_auth(username, token),
            (None, Some(token)) => request.bearer_auth(token),
            (None, None) => request,
        };

        debug!(target = "veduta::source", query, start_at, "executing tracker search");

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
            });
        }

        response
            .json::<RawSearchResponse>()
            .await
            .map_err(|err| SourceError::Decode(err.to_string()))
    }
}

#[async_trait]
impl IssueSearch for RestSearch {
    async fn count(&self, query: &str) -> Result<u64, SourceError> {
        Ok(self.execute(query, &[], 0, 0).await?.total)
    }

    async fn search(
        &self,
        query: &str,
        fields: &[&str],
        max_results: u32,
        start_at: u32,
    ) -> Result<SearchPage, SourceError> {
        let raw = self.execute(query, fields, max_results, start_at).await?;
        Ok(SearchPage {
            total: raw.total,
            issues: raw.issues.into_iter().map(Issue::from).collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawSearchResponse {
    total: u64,
    #[serde(default)]
    issues: Vec<RawIssue>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    #[serde(default)]
    fields: RawFields,
}

#[derive(Debug, Deserialize, Default)]
struct RawFields {
    created: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
}

impl From<RawIssue> for Issue {
    fn from(raw: RawIssue) -> Self {
        Issue {
            created: raw.fields.created.as_deref().and_then(parse_created),
            labels: raw.fields.labels,
        }
    }
}

/// Parse the tracker's created timestamp.
///
/// The API emits `2025-03-02T10:11:12.000+0000` (no offset colon), which
/// RFC 3339 rejects, so both forms are attempted.
fn parse_created(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(parsed);
    }
    let tracker_format = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory][offset_minute]"
    );
    OffsetDateTime::parse(raw, &tracker_format).ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn settings(base_url: &str) -> TrackerSettings {
        TrackerSettings {
            base_url: Url::parse(base_url).unwrap(),
            project: "QA".to_string(),
            username: Some("robot".to_string()),
            token: Some("secret".to_string()),
            reporter: "robot".to_string(),
            triage_users: vec![],
            area_labels: vec![],
            area_version: String::new(),
        }
    }

    #[test]
    fn parses_tracker_timestamps() {
        let parsed = parse_created("2025-03-02T10:11:12.000+0000").expect("tracker format");
        assert_eq!(parsed.year(), 2025);
        assert_eq!(u8::from(parsed.month()), 3);

        let parsed = parse_created("2025-03-02T10:11:12Z").expect("rfc3339 format");
        assert_eq!(parsed.day(), 2);

        assert!(parse_created("not a date").is_none());
    }

    #[tokio::test]
    async fn count_requests_zero_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .and(query_param("jql", "project = QA AND issuetype = Test"))
            .and(query_param("maxResults", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "total": 42 })))
            .mount(&server)
            .await;

        let search = RestSearch::new(&settings(&server.uri())).unwrap();
        let total = search
            .count("project = QA AND issuetype = Test")
            .await
            .unwrap();
        assert_eq!(total, 42);
    }

    #[tokio::test]
    async fn search_all_pages_through_results() {
        let server = MockServer::start().await;
        let issue = |created: &str| json!({ "fields": { "created": created, "labels": [] } });

        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .and(query_param("startAt", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total": 3,
                "issues": [issue("2025-01-10T00:00:00.000+0000"), issue("2025-02-10T00:00:00.000+0000")],
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .and(query_param("startAt", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total": 3,
                "issues": [issue("2025-03-10T00:00:00.000+0000")],
            })))
            .mount(&server)
            .await;

        let search = RestSearch::new(&settings(&server.uri())).unwrap();
        let issues = search
            .search_all("project = QA", &["created"], 2)
            .await
            .unwrap();

        assert_eq!(issues.len(), 3);
        assert!(issues.iter().all(|issue| issue.created.is_some()));
    }

    #[tokio::test]
    async fn upstream_error_surfaces_as_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let search = RestSearch::new(&settings(&server.uri())).unwrap();
        let err = search.count("bad jql").await.unwrap_err();
        assert!(matches!(err, SourceError::Status { status: 400 }));
    }
}
