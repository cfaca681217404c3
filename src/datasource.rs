use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{ConfigStore, InstanceSettings};
use crate::error::{Result, SdsError};
use crate::frame::ResultTable;
use crate::http::{HttpClient, HttpRequest};
use crate::profile::ConnectionProfile;
use crate::query::{data_url, QueryRequest, QueryResponse, QueryTarget, StreamOption, TimeRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Success,
    Error,
}

/// Outcome of a connectivity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub status: TestStatus,
    pub message: String,
}

impl TestResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: TestStatus::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: TestStatus::Error,
            message: message.into(),
        }
    }
}

/// Entry points the host calls on a data source.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Runs every target of the request; one table per target, in order.
    async fn query(&self, request: &QueryRequest) -> QueryResponse;

    /// Streams matching `text`, for typeahead selection.
    async fn search_streams(&self, text: &str) -> Result<Vec<StreamOption>>;

    /// Checks the configuration against the live backend.
    async fn test_connection(&self) -> Result<TestResult>;
}

pub struct SdsDataSource {
    profile: ConnectionProfile,
    client: Arc<dyn HttpClient>,
}

impl SdsDataSource {
    pub fn new(settings: &InstanceSettings, client: Arc<dyn HttpClient>) -> Self {
        Self::with_profile(ConnectionProfile::from_settings(settings), client)
    }

    pub fn with_profile(profile: ConnectionProfile, client: Arc<dyn HttpClient>) -> Self {
        Self { profile, client }
    }

    /// Instantiates from the settings currently held by the host store.
    pub fn from_store(store: &dyn ConfigStore, client: Arc<dyn HttpClient>) -> Self {
        Self::new(&store.get(), client)
    }

    pub fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    async fn run_target(
        &self,
        target: &QueryTarget,
        range: &TimeRange,
        max_data_points: Option<u32>,
    ) -> ResultTable {
        if !target.is_runnable() {
            return target.empty_table();
        }

        let ref_id = Some(target.ref_id.clone());
        let url = match data_url(&self.profile, target, range, max_data_points) {
            Ok(url) => url,
            Err(e) => {
                warn!(ref_id = %target.ref_id, error = %e, "cannot build data url");
                return ResultTable::failed(ref_id, e.to_string());
            }
        };

        debug!(ref_id = %target.ref_id, %url, "querying stream");
        match self.client.request(HttpRequest::get(url)).await {
            Ok(response) if response.is_success() => {
                let name = Some(target.stream.name.clone()).filter(|n| !n.is_empty());
                ResultTable::from_body(ref_id, name, response.body.as_ref())
            }
            Ok(response) => {
                let e = SdsError::HttpStatus {
                    status: response.status,
                    status_text: response.status_text,
                };
                warn!(ref_id = %target.ref_id, error = %e, "stream query failed");
                ResultTable::failed(ref_id, e.to_string())
            }
            Err(e) => {
                warn!(ref_id = %target.ref_id, error = %e, "stream query failed");
                ResultTable::failed(ref_id, e.to_string())
            }
        }
    }
}

#[async_trait]
impl DataSource for SdsDataSource {
    async fn query(&self, request: &QueryRequest) -> QueryResponse {
        let tables = request
            .targets
            .iter()
            .map(|target| self.run_target(target, &request.range, request.max_data_points));

        QueryResponse {
            data: join_all(tables).await,
        }
    }

    async fn search_streams(&self, text: &str) -> Result<Vec<StreamOption>> {
        if !self.profile.has_scope() {
            return Ok(Vec::new());
        }

        let listing = self.profile.listing_url();
        let url = if text.is_empty() {
            listing
        } else {
            format!("{}?query=*{}*", listing, text)
        };

        let response = self.client.request(HttpRequest::get(url)).await?;
        if !response.is_success() {
            return Err(SdsError::HttpStatus {
                status: response.status,
                status_text: response.status_text,
            });
        }

        let entries = match response.body {
            Some(Value::Array(entries)) => entries,
            _ => return Ok(Vec::new()),
        };

        let community = self.profile.uses_community();
        Ok(entries
            .iter()
            .filter_map(|entry| {
                let id = entry.get("Id")?.as_str()?;
                let value = if community {
                    entry.get("Self")?.as_str()?
                } else {
                    id
                };
                Some(StreamOption {
                    value: value.to_string(),
                    label: id.to_string(),
                })
            })
            .collect())
    }

    async fn test_connection(&self) -> Result<TestResult> {
        let response = self
            .client
            .request(HttpRequest::get(self.profile.listing_url()))
            .await?;

        if response.status == 200 {
            info!(datasource = %self.profile.name, "data source is working");
            Ok(TestResult::success("Data source is working"))
        } else {
            warn!(datasource = %self.profile.name, status = response.status, "connectivity check failed");
            Ok(TestResult::error(format!("{}: {}", response.status, response.status_text)))
        }
    }
}
