//! Dashboard view producers.
//!
//! Each producer is a plain async function composing tracker searches into
//! a JSON payload. The HTTP handlers and the warming scheduler both call
//! these functions; neither layer owns them and no request/response shapes
//! appear here.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime};
use tracing::warn;

use crate::config::TrackerSettings;

use super::{Issue, IssueSearch, SourceError};

const SEARCH_PAGE_SIZE: u32 = 1_000;
const AUTOMATION_COMPONENT: &str = "Automated Test";
const CI_COMPONENT: &str = "Continuous Integration";
const STAGE_LABEL: &str = "CI:Stage4";

// ============================================================================
// Payload shapes
// ============================================================================

#[derive(Debug, Serialize)]
pub struct TestCaseCounts {
    pub manual: u64,
    pub automated: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabeledTestCaseCounts {
    pub manual: u64,
    pub automated: u64,
    pub total: u64,
    pub manual_label: String,
    pub automated_label: String,
}

#[derive(Debug, Serialize)]
pub struct AllTestCaseCounts {
    pub all: u64,
    pub manual: u64,
    pub automated: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthCumulative {
    pub month: String,
    pub manual: u64,
    pub automated: u64,
    pub total: u64,
    pub manual_label: String,
    pub automated_label: String,
}

#[derive(Debug, Serialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BugStats {
    pub total_bugs: u64,
    pub firmware_bugs: u64,
    pub ci_bugs: u64,
    pub script_bugs: u64,
    pub month: u8,
    pub year: i32,
    pub month_name: String,
    pub date_range: DateRange,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriagingMonth {
    pub month: u8,
    pub month_name: String,
    pub month_short: String,
    pub year: i32,
    pub total_bugs: u64,
    pub firmware_bugs: u64,
    pub ci_bugs: u64,
    pub script_bugs: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaCount {
    pub label: String,
    pub full_label: String,
    pub count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BugAreas {
    pub total_bugs: u64,
    pub label_counts: Vec<AreaCount>,
    pub version: String,
    pub last_updated: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardBatch {
    pub test_case_data: TestCaseCounts,
    pub all_test_case_data: AllTestCaseCounts,
    pub monthly_data: Vec<MonthCumulative>,
    pub bug_stats: BugStats,
    pub bug_areas: BugAreas,
    pub timestamp: String,
}

// ============================================================================
// Producers
// ============================================================================

/// Current manual vs automated test case counts.
pub async fn test_case_counts(
    search: &dyn IssueSearch,
    tracker: &TrackerSettings,
) -> Result<Value, SourceError> {
    let (manual, automated) = fetch_test_counts(search, tracker).await?;
    to_payload(&TestCaseCounts { manual, automated })
}

/// Test case counts with chart-ready labels.
pub async fn monthly_test_cases(
    search: &dyn IssueSearch,
    tracker: &TrackerSettings,
) -> Result<Value, SourceError> {
    let (manual, automated) = fetch_test_counts(search, tracker).await?;
    to_payload(&LabeledTestCaseCounts {
        manual,
        automated,
        total: manual + automated,
        manual_label: format!("Manual({manual})"),
        automated_label: format!("Automated({automated})"),
    })
}

/// All/manual/automated test case counts.
pub async fn all_test_cases(
    search: &dyn IssueSearch,
    tracker: &TrackerSettings,
) -> Result<Value, SourceError> {
    to_payload(&fetch_all_counts(search, tracker).await?)
}

/// Per-month cumulative test case counts for the current year.
pub async fn cumulative_monthly(
    search: &dyn IssueSearch,
    tracker: &TrackerSettings,
) -> Result<Value, SourceError> {
    let months = cumulative_months(search, tracker, OffsetDateTime::now_utc().date()).await?;
    to_payload(&months)
}

/// Triaging bug statistics for one month (defaults to the current one).
pub async fn bug_stats(
    search: &dyn IssueSearch,
    tracker: &TrackerSettings,
    month: Option<u8>,
) -> Result<Value, SourceError> {
    let stats = bug_stats_typed(search, tracker, OffsetDateTime::now_utc().date(), month).await?;
    to_payload(&stats)
}

/// Per-month triaging counts for the current year.
pub async fn monthly_triaging(
    search: &dyn IssueSearch,
    tracker: &TrackerSettings,
) -> Result<Value, SourceError> {
    let months = triaging_months(search, tracker, OffsetDateTime::now_utc().date()).await?;
    to_payload(&months)
}

/// Bug counts per problem-area label for the configured release.
pub async fn bug_areas(
    search: &dyn IssueSearch,
    tracker: &TrackerSettings,
) -> Result<Value, SourceError> {
    to_payload(&bug_areas_typed(search, tracker).await?)
}

/// Everything the dashboard home screen needs, in one payload.
///
/// Bug areas are tolerated to fail independently; the rest of the batch is
/// still served with an empty areas section.
pub async fn dashboard_batch(
    search: &dyn IssueSearch,
    tracker: &TrackerSettings,
) -> Result<Value, SourceError> {
    let today = OffsetDateTime::now_utc().date();

    let (all_counts, monthly_data, bug_stats) = futures::try_join!(
        fetch_all_counts(search, tracker),
        cumulative_months(search, tracker, today),
        bug_stats_typed(search, tracker, today, None),
    )?;

    let bug_areas = match bug_areas_typed(search, tracker).await {
        Ok(areas) => areas,
        Err(err) => {
            warn!(
                target = "veduta::source",
                error = %err,
                "bug areas failed in batch, serving empty section"
            );
            BugAreas {
                total_bugs: 0,
                label_counts: Vec::new(),
                version: tracker.area_version.clone(),
                last_updated: now_rfc3339(),
            }
        }
    };

    to_payload(&DashboardBatch {
        test_case_data: TestCaseCounts {
            manual: all_counts.manual,
            automated: all_counts.automated,
        },
        all_test_case_data: all_counts,
        monthly_data,
        bug_stats,
        bug_areas,
        timestamp: now_rfc3339(),
    })
}

// ============================================================================
// Query construction
// ============================================================================

fn manual_tests_query(tracker: &TrackerSettings) -> String {
    format!(
        "project = {} AND issuetype = Test AND Method IN (Manual,EMPTY)",
        tracker.project
    )
}

fn automated_tests_query(tracker: &TrackerSettings) -> String {
    format!(
        "project = {} AND issuetype IS NOT EMPTY AND Method = Automated",
        tracker.project
    )
}

fn all_tests_query(tracker: &TrackerSettings) -> String {
    format!("project = {} AND issuetype = Test", tracker.project)
}

fn stage_bugs_query(tracker: &TrackerSettings, start: &str, end: &str, topic: &str) -> String {
    format!(
        "project = {} AND issuetype = Bug AND status is not EMPTY \
         AND created >= \"{start}\" AND created <= \"{end}\" \
         AND reporter = {} AND component = \"{AUTOMATION_COMPONENT}\" \
         AND labels = {STAGE_LABEL} AND text ~ {topic} order by status ASC",
        tracker.project, tracker.reporter
    )
}

fn triaging_base_query(
    tracker: &TrackerSettings,
    start: &str,
    end: &str,
) -> Result<String, SourceError> {
    if tracker.triage_users.is_empty() {
        return Err(SourceError::Query(
            "tracker.triage_users is empty".to_string(),
        ));
    }
    let users = tracker
        .triage_users
        .iter()
        .map(|user| format!("description ~ \"Triaged by: {user}\""))
        .collect::<Vec<_>>()
        .join(" OR ");
    Ok(format!(
        "project = {} AND issuetype = Bug AND reporter = {} \
         AND createdDate >= \"{start}\" AND createdDate <= \"{end}\" AND ({users})",
        tracker.project, tracker.reporter
    ))
}

fn area_base_query(tracker: &TrackerSettings) -> Result<String, SourceError> {
    if tracker.area_labels.is_empty() {
        return Err(SourceError::Query(
            "tracker.area_labels is empty".to_string(),
        ));
    }
    Ok(format!(
        "project = \"{}\" AND issuetype = Bug AND labels in ({})",
        tracker.project,
        tracker.area_labels.join(", ")
    ))
}

// ============================================================================
// Aggregation
// ============================================================================

async fn fetch_test_counts(
    search: &dyn IssueSearch,
    tracker: &TrackerSettings,
) -> Result<(u64, u64), SourceError> {
    let manual_query = manual_tests_query(tracker);
    let automated_query = automated_tests_query(tracker);
    futures::try_join!(
        search.count(&manual_query),
        search.count(&automated_query),
    )
}

async fn fetch_all_counts(
    search: &dyn IssueSearch,
    tracker: &TrackerSettings,
) -> Result<AllTestCaseCounts, SourceError> {
    let all_query = all_tests_query(tracker);
    let manual_query = manual_tests_query(tracker);
    let automated_query = automated_tests_query(tracker);
    let (all, manual, automated) = futures::try_join!(
        search.count(&all_query),
        search.count(&manual_query),
        search.count(&automated_query),
    )?;
    Ok(AllTestCaseCounts {
        all,
        manual,
        automated,
    })
}

async fn cumulative_months(
    search: &dyn IssueSearch,
    tracker: &TrackerSettings,
    today: Date,
) -> Result<Vec<MonthCumulative>, SourceError> {
    let year = today.year();
    let current_month = today.month();
    let Some(year_end) = month_end(year, current_month) else {
        return Err(SourceError::Query("cannot resolve month end".to_string()));
    };
    let year_end = format_date(year_end);

    // Two full fetches instead of two queries per month; bucketing happens
    // locally on the created timestamps.
    let manual_query = format!(
        "{} AND created <= \"{year_end}\" ORDER BY created ASC",
        manual_tests_query(tracker)
    );
    let automated_query = format!(
        "{} AND created <= \"{year_end}\" ORDER BY created ASC",
        automated_tests_query(tracker)
    );
    let (manual_issues, automated_issues) = futures::try_join!(
        search.search_all(&manual_query, &["created"], SEARCH_PAGE_SIZE),
        search.search_all(&automated_query, &["created"], SEARCH_PAGE_SIZE),
    )?;

    let mut months = Vec::new();
    for month in months_through(u8::from(current_month)) {
        let Some(end) = month_end(year, month) else {
            continue;
        };
        let manual = created_on_or_before(&manual_issues, end);
        let automated = created_on_or_before(&automated_issues, end);
        months.push(MonthCumulative {
            month: format!("{} {year}", short_month_name(month)),
            manual,
            automated,
            total: manual + automated,
            manual_label: format!("Manual({manual})"),
            automated_label: format!("Automated({automated})"),
        });
    }
    Ok(months)
}

async fn bug_stats_typed(
    search: &dyn IssueSearch,
    tracker: &TrackerSettings,
    today: Date,
    month: Option<u8>,
) -> Result<BugStats, SourceError> {
    let year = today.year();
    let month_number = month.unwrap_or_else(|| u8::from(today.month()));
    let month = Month::try_from(month_number)
        .map_err(|_| SourceError::Query("month must be between 1 and 12".to_string()))?;

    let start = Date::from_calendar_date(year, month, 1)
        .map_err(|err| SourceError::Query(err.to_string()))?;
    let Some(end) = month_end(year, month) else {
        return Err(SourceError::Query("cannot resolve month end".to_string()));
    };
    let start = format_date(start);
    let end = format_date(end);

    let firmware_query = stage_bugs_query(tracker, &start, &end, "Firmware");
    let script_query = stage_bugs_query(tracker, &start, &end, "Script");
    let ci_query = stage_bugs_query(tracker, &start, &end, "CI");
    let (firmware_bugs, script_bugs, ci_bugs) = futures::try_join!(
        search.count(&firmware_query),
        search.count(&script_query),
        search.count(&ci_query),
    )?;

    Ok(BugStats {
        total_bugs: firmware_bugs + script_bugs + ci_bugs,
        firmware_bugs,
        ci_bugs,
        script_bugs,
        month: month_number,
        year,
        month_name: month.to_string(),
        date_range: DateRange { start, end },
    })
}

async fn triaging_months(
    search: &dyn IssueSearch,
    tracker: &TrackerSettings,
    today: Date,
) -> Result<Vec<TriagingMonth>, SourceError> {
    let year = today.year();
    let current_month = today.month();
    let Some(year_end) = month_end(year, current_month) else {
        return Err(SourceError::Query("cannot resolve month end".to_string()));
    };

    let base = triaging_base_query(tracker, &format!("{year}-01-01"), &format_date(year_end))?;
    let ci_query = format!("{base} AND component = \"{CI_COMPONENT}\"");
    let script_query = format!("{base} AND component = \"{AUTOMATION_COMPONENT}\"");

    let (all_issues, ci_issues, script_issues) = futures::try_join!(
        search.search_all(&base, &["created"], SEARCH_PAGE_SIZE),
        search.search_all(&ci_query, &["created"], SEARCH_PAGE_SIZE),
        search.search_all(&script_query, &["created"], SEARCH_PAGE_SIZE),
    )?;

    let mut months = Vec::new();
    for month in months_through(u8::from(current_month)) {
        let total_bugs = created_in_month(&all_issues, year, month);
        let ci_bugs = created_in_month(&ci_issues, year, month);
        let script_bugs = created_in_month(&script_issues, year, month);

        months.push(TriagingMonth {
            month: u8::from(month),
            month_name: month.to_string(),
            month_short: short_month_name(month).to_string(),
            year,
            total_bugs,
            firmware_bugs: total_bugs.saturating_sub(ci_bugs).saturating_sub(script_bugs),
            ci_bugs,
            script_bugs,
        });
    }
    Ok(months)
}

async fn bug_areas_typed(
    search: &dyn IssueSearch,
    tracker: &TrackerSettings,
) -> Result<BugAreas, SourceError> {
    let base = area_base_query(tracker)?;

    // Prefer the release-scoped query; older tracker versions reject the
    // fixVersion clause, so fall back to the unscoped one.
    let issues = if tracker.area_version.is_empty() {
        search.search_all(&base, &["labels"], SEARCH_PAGE_SIZE).await?
    } else {
        let scoped = format!("{base} AND fixVersion = \"{}\"", tracker.area_version);
        match search.search_all(&scoped, &["labels"], SEARCH_PAGE_SIZE).await {
            Ok(issues) => issues,
            Err(err) => {
                warn!(
                    target = "veduta::source",
                    error = %err,
                    "release-scoped bug areas query failed, retrying unscoped"
                );
                search.search_all(&base, &["labels"], SEARCH_PAGE_SIZE).await?
            }
        }
    };

    let mut counts: HashMap<&str, u64> = tracker
        .area_labels
        .iter()
        .map(|label| (label.as_str(), 0))
        .collect();
    for issue in &issues {
        for label in &issue.labels {
            if let Some(count) = counts.get_mut(label.as_str()) {
                *count += 1;
            }
        }
    }

    let prefix = common_label_prefix(&tracker.area_labels);
    let mut label_counts: Vec<AreaCount> = tracker
        .area_labels
        .iter()
        .map(|label| AreaCount {
            label: label.strip_prefix(&prefix).unwrap_or(label).to_string(),
            full_label: label.clone(),
            count: counts.get(label.as_str()).copied().unwrap_or(0),
        })
        .collect();
    label_counts.sort_by(|a, b| b.count.cmp(&a.count));

    Ok(BugAreas {
        total_bugs: issues.len() as u64,
        label_counts,
        version: tracker.area_version.clone(),
        last_updated: now_rfc3339(),
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn to_payload<T: Serialize>(value: &T) -> Result<Value, SourceError> {
    serde_json::to_value(value).map_err(|err| SourceError::Decode(err.to_string()))
}

fn months_through(month: u8) -> impl Iterator<Item = Month> {
    (1..=month).filter_map(|number| Month::try_from(number).ok())
}

fn month_end(year: i32, month: Month) -> Option<Date> {
    Date::from_calendar_date(year, month, time::util::days_in_year_month(year, month)).ok()
}

fn format_date(date: Date) -> String {
    let format = format_description!("[year]-[month]-[day]");
    date.format(&format).unwrap_or_default()
}

fn short_month_name(month: Month) -> &'static str {
    match month {
        Month::January => "Jan",
        Month::February => "Feb",
        Month::March => "Mar",
        Month::April => "Apr",
        Month::May => "May",
        Month::June => "Jun",
        Month::July => "Jul",
        Month::August => "Aug",
        Month::September => "Sep",
        Month::October => "Oct",
        Month::November => "Nov",
        Month::December => "Dec",
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

fn created_on_or_before(issues: &[Issue], end: Date) -> u64 {
    issues
        .iter()
        .filter(|issue| issue.created.is_some_and(|created| created.date() <= end))
        .count() as u64
}

fn created_in_month(issues: &[Issue], year: i32, month: Month) -> u64 {
    issues
        .iter()
        .filter(|issue| {
            issue.created.is_some_and(|created| {
                created.date().year() == year && created.date().month() == month
            })
        })
        .count() as u64
}

/// Longest common prefix of the configured labels, cut at a `:` boundary,
/// used to shorten labels for chart display.
fn common_label_prefix(labels: &[String]) -> String {
    let Some(first) = labels.first() else {
        return String::new();
    };
    let mut prefix = first.clone();
    for label in labels.iter().skip(1) {
        let shared: usize = prefix
            .chars()
            .zip(label.chars())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a.len_utf8())
            .sum();
        prefix.truncate(shared);
    }
    match prefix.rfind(':') {
        Some(index) => {
            prefix.truncate(index + 1);
            prefix
        }
        None => String::new(),
    }
}
