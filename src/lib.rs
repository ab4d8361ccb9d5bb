//! Veduta: a reporting dashboard backend for issue-tracker quality metrics.
//!
//! The backend aggregates expensive issue-tracker queries (test case counts,
//! bug statistics, triaging counts) behind a cache layer and serves the
//! aggregated data over HTTP for a charting frontend. A proactive warming
//! scheduler keeps the dashboard views fresh so that clients are served from
//! cache on virtually every request.

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod source;
pub mod telemetry;
pub mod warming;
