//! Query model and data URL construction.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use url::form_urlencoded::byte_serialize;

use crate::error::{Result, SdsError};
use crate::frame::ResultTable;
use crate::profile::ConnectionProfile;

/// Event count requested from interpolated and summary reads when the host
/// does not say how many points it can display.
pub const DEFAULT_COUNT: u32 = 100;

/// A stream selected for a query target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamReference {
    /// Stream id, or the full stream URL in community mode.
    #[serde(rename = "Id", alias = "id", default)]
    pub id: String,
    #[serde(rename = "Name", alias = "name", default)]
    pub name: String,
}

/// How events are read from a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMethod {
    /// Stored events within the range.
    #[default]
    Values,
    First,
    Last,
    /// The event at one end of the range, located by a search mode.
    Distinct,
    Interpolated,
    Summaries,
}

/// Which end of the range a distinct read is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    #[default]
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchMode {
    #[default]
    Exact,
    ExactOrNext,
    Next,
    ExactOrPrevious,
    Previous,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchMode::Exact => "Exact",
            SearchMode::ExactOrNext => "ExactOrNext",
            SearchMode::Next => "Next",
            SearchMode::ExactOrPrevious => "ExactOrPrevious",
            SearchMode::Previous => "Previous",
        };
        f.write_str(s)
    }
}

/// A selectable catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOption {
    pub value: String,
    pub label: String,
}

/// One requested series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredTarget")]
pub struct QueryTarget {
    pub ref_id: String,
    #[serde(default)]
    pub stream: StreamReference,
    #[serde(default, rename = "method")]
    pub retrieval_method: RetrievalMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_mode: Option<SearchMode>,
}

/// A target as dashboards store it. Older dashboards keep the stream in flat
/// `streamId`/`streamName` keys instead of a `stream` object.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTarget {
    #[serde(default)]
    ref_id: String,
    #[serde(default)]
    stream: Option<StreamReference>,
    #[serde(default)]
    stream_id: Option<String>,
    #[serde(default)]
    stream_name: Option<String>,
    #[serde(default)]
    method: RetrievalMethod,
    #[serde(default)]
    filter: Option<String>,
    #[serde(default)]
    position: Option<Position>,
    #[serde(default)]
    search_mode: Option<SearchMode>,
}

impl From<StoredTarget> for QueryTarget {
    fn from(stored: StoredTarget) -> Self {
        let stream = stored.stream.unwrap_or_else(|| StreamReference {
            id: stored.stream_id.unwrap_or_default(),
            name: stored.stream_name.unwrap_or_default(),
        });
        Self {
            ref_id: stored.ref_id,
            stream,
            retrieval_method: stored.method,
            filter: stored.filter,
            position: stored.position,
            search_mode: stored.search_mode,
        }
    }
}

impl QueryTarget {
    pub fn new(ref_id: impl Into<String>, stream: StreamReference) -> Self {
        Self {
            ref_id: ref_id.into(),
            stream,
            ..Default::default()
        }
    }

    pub fn with_method(mut self, method: RetrievalMethod) -> Self {
        self.retrieval_method = method;
        self
    }

    /// Points the target at a stream picked from the catalog.
    pub fn select_stream(&mut self, option: Option<&StreamOption>) {
        self.stream = StreamReference {
            id: option.map(|o| o.value.clone()).unwrap_or_default(),
            name: option.map(|o| o.label.clone()).unwrap_or_default(),
        };
    }

    /// Targets without a stream issue no request.
    pub fn is_runnable(&self) -> bool {
        !self.stream.id.is_empty()
    }

    pub(crate) fn empty_table(&self) -> ResultTable {
        ResultTable::empty(Some(self.ref_id.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    pub fn from_index(&self) -> String {
        format_index(&self.from)
    }

    pub fn to_index(&self) -> String {
        format_index(&self.to)
    }
}

/// SDS index of a timestamp: UTC, second precision, `Z` suffix.
pub fn format_index(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub range: TimeRange,
    pub targets: Vec<QueryTarget>,
    /// Upper bound of points the host can display.
    pub max_data_points: Option<u32>,
}

impl QueryRequest {
    pub fn new(range: TimeRange, targets: Vec<QueryTarget>) -> Self {
        Self {
            range,
            targets,
            max_data_points: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResponse {
    /// One table per target, in target order.
    pub data: Vec<ResultTable>,
}

/// Builds the data URL of a runnable target.
pub fn data_url(
    profile: &ConnectionProfile,
    target: &QueryTarget,
    range: &TimeRange,
    max_data_points: Option<u32>,
) -> Result<String> {
    let stream_url = if profile.uses_community() {
        // Community streams are addressed by their own URL; only the path is
        // kept so the request goes through the instance URL.
        let url = Url::parse(&target.stream.id)
            .map_err(|e| SdsError::InvalidStreamPath(target.stream.id.clone(), e.to_string()))?;
        format!("{}/ocs{}", profile.base_url, url.path())
    } else {
        format!("{}/{}", profile.listing_url(), target.stream.id)
    };

    let (from, to) = (range.from_index(), range.to_index());
    let count = max_data_points.unwrap_or(DEFAULT_COUNT);

    let url = match target.retrieval_method {
        RetrievalMethod::Values => {
            let mut url = format!("{}/data?startIndex={}&endIndex={}", stream_url, from, to);
            if let Some(filter) = target.filter.as_deref().filter(|f| !f.is_empty()) {
                url.push_str("&filter=");
                url.extend(byte_serialize(filter.as_bytes()));
            }
            url
        }
        RetrievalMethod::First => format!("{}/data/first", stream_url),
        RetrievalMethod::Last => format!("{}/data/last", stream_url),
        RetrievalMethod::Distinct => {
            let index = match target.position.unwrap_or_default() {
                Position::Start => from,
                Position::End => to,
            };
            format!(
                "{}/data?index={}&searchMode={}",
                stream_url,
                index,
                target.search_mode.unwrap_or_default()
            )
        }
        RetrievalMethod::Interpolated => format!(
            "{}/data/interpolated?startIndex={}&endIndex={}&count={}",
            stream_url, from, to, count
        ),
        RetrievalMethod::Summaries => format!(
            "{}/data/summaries?startIndex={}&endIndex={}&count={}",
            stream_url, from, to, count
        ),
    };
    Ok(url)
}
