// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Read side: readiness check and `query_range` with pagination.
//!
//! A page is full when it holds `limit` entries. The next page then starts
//! just past the last timestamp seen in the query direction:
//!
//! ```text
//!   forward:   [start ........ newest] -> next start = newest + 1
//!   backward:  [oldest ........ end]   -> next end   = oldest - 1
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::buffer::now_ns;
use crate::config::ShipperConfig;
use crate::error::TransportError;
use crate::http::get_client;

pub const QUERY_RANGE_PATH: &str = "/loki/api/v1/query_range";
pub const READY_PATH: &str = "/ready";
pub const DEFAULT_QUERY_LIMIT: usize = 1000;
pub const DEFAULT_LOOKBACK: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a `query_range` call. Timestamps are Unix nanoseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// LogQL expression, e.g. `{job="my-app"} |= "error"`.
    pub query: String,
    pub limit: usize,
    /// Defaults to one hour before the call.
    pub start_ns: Option<i64>,
    /// Defaults to the time of the call.
    pub end_ns: Option<i64>,
    pub direction: Direction,
    pub step: Option<Duration>,
}

impl QueryRequest {
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: DEFAULT_QUERY_LIMIT,
            start_ns: None,
            end_ns: None,
            direction: Direction::default(),
            step: None,
        }
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn range(mut self, start_ns: i64, end_ns: i64) -> Self {
        self.start_ns = Some(start_ns);
        self.end_ns = Some(end_ns);
        self
    }

    #[must_use]
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    #[must_use]
    pub fn step(mut self, step: Duration) -> Self {
        self.step = Some(step);
        self
    }

    /// The request for the page after `page`, or `None` if `page` was the last.
    #[must_use]
    pub fn next_page(&self, page: &QueryPage) -> Option<Self> {
        let ts = page.next_page_ts?;
        let mut next = self.clone();
        match self.direction {
            Direction::Forward => next.start_ns = Some(ts),
            Direction::Backward => next.end_ns = Some(ts),
        }
        Some(next)
    }

    fn params(&self, now: i64) -> Vec<(&'static str, String)> {
        let end = self.end_ns.unwrap_or(now);
        let lookback = i64::try_from(DEFAULT_LOOKBACK.as_nanos()).unwrap_or(i64::MAX);
        let start = self.start_ns.unwrap_or_else(|| end.saturating_sub(lookback));

        let mut params = vec![
            ("query", self.query.clone()),
            ("limit", self.limit.to_string()),
            ("start", start.to_string()),
            ("end", end.to_string()),
            ("direction", self.direction.to_string()),
        ];
        if let Some(step) = self.step {
            params.push(("step", format!("{}ms", step.as_millis())));
        }
        params
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueriedEntry {
    pub timestamp_ns: i64,
    pub line: String,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryPage {
    /// Entries of every returned stream, ordered in the query direction.
    pub entries: Vec<QueriedEntry>,
    /// Where the next page starts (forward) or ends (backward), if the page
    /// was full.
    pub next_page_ts: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<StreamResult>,
}

#[derive(Debug, Deserialize)]
struct StreamResult {
    #[serde(default)]
    stream: BTreeMap<String, String>,
    /// `[ts, line]` or `[ts, line, metadata]`.
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

pub struct QueryClient {
    client: reqwest::Client,
    base_url: String,
}

impl QueryClient {
    #[must_use]
    pub fn new(config: &ShipperConfig) -> Self {
        Self::with_client(get_client(config), config.base_url().to_string())
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Whether Loki answers its readiness check with a 2xx.
    pub async fn ready(&self) -> bool {
        let url = format!("{}{READY_PATH}", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("LOKI | Readiness check to {} failed: {}", url, e);
                false
            }
        }
    }

    /// Runs one `query_range` call.
    ///
    /// # Errors
    ///
    /// [`TransportError::Request`] if Loki could not be reached,
    /// [`TransportError::Status`] for a non-2xx answer,
    /// [`TransportError::Payload`] for an unparsable body, and
    /// [`TransportError::Query`] when Loki reports a failed query.
    pub async fn query_range(&self, request: &QueryRequest) -> Result<QueryPage, TransportError> {
        let url = format!("{}{QUERY_RANGE_PATH}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&request.params(now_ns()))
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: url.clone(),
                source,
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|source| TransportError::Request { url, source })?;
        if !status.is_success() {
            return Err(TransportError::Status { status, body });
        }

        let response: QueryResponse = serde_json::from_str(&body)?;
        if response.status != "success" {
            return Err(TransportError::Query(
                response.error.unwrap_or(response.status),
            ));
        }

        let page = build_page(response.data.map(|d| d.result).unwrap_or_default(), request);
        debug!(
            "LOKI | Query returned {} entries, next page at {:?}",
            page.entries.len(),
            page.next_page_ts
        );
        Ok(page)
    }
}

fn build_page(streams: Vec<StreamResult>, request: &QueryRequest) -> QueryPage {
    let mut entries = Vec::new();
    for stream in streams {
        for value in stream.values {
            match parse_value(&value) {
                Some((timestamp_ns, line)) => entries.push(QueriedEntry {
                    timestamp_ns,
                    line,
                    labels: stream.stream.clone(),
                }),
                None => warn!("LOKI | Skipping malformed query value: {:?}", value),
            }
        }
    }

    match request.direction {
        Direction::Forward => entries.sort_by_key(|e| e.timestamp_ns),
        Direction::Backward => entries.sort_by_key(|e| std::cmp::Reverse(e.timestamp_ns)),
    }

    let next_page_ts = if !entries.is_empty() && entries.len() >= request.limit {
        entries.last().map(|last| match request.direction {
            Direction::Forward => last.timestamp_ns.saturating_add(1),
            Direction::Backward => last.timestamp_ns.saturating_sub(1),
        })
    } else {
        None
    };

    QueryPage {
        entries,
        next_page_ts,
    }
}

fn parse_value(value: &[serde_json::Value]) -> Option<(i64, String)> {
    let ts = value.first()?.as_str()?.parse().ok()?;
    let line = value.get(1)?.as_str()?.to_string();
    Some((ts, line))
}
