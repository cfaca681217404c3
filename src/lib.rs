//! SDS data source: time-series queries against the Sequential Data Store
//!
//! This library lets a monitoring host read streams from OSIsoft Cloud
//! Services (OCS) or an Edge Data Store (EDS) and renders the events as typed
//! tables. Requests go through an injected [`HttpClient`]; configuration comes
//! from the host's persisted [`InstanceSettings`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chrono::{Duration, Utc};
//! use sds_datasource::{
//!     DataSource, InstanceSettings, QueryRequest, QueryTarget, ReqwestClient, SdsDataSource,
//!     StreamReference, TimeRange,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings: InstanceSettings = serde_json::from_str(
//!         r#"{ "name": "eds", "jsonData": { "type": "EDS", "namespace": "default" } }"#,
//!     )?;
//!     let datasource = SdsDataSource::new(&settings, Arc::new(ReqwestClient::new()));
//!
//!     // Check the configuration
//!     let result = datasource.test_connection().await?;
//!     println!("{}", result.message);
//!
//!     // Pick a stream
//!     let streams = datasource.search_streams("Temperature").await?;
//!     let stream = streams.first().ok_or("no stream found")?;
//!
//!     // Read the last hour
//!     let now = Utc::now();
//!     let target = QueryTarget::new(
//!         "A",
//!         StreamReference { id: stream.value.clone(), name: stream.label.clone() },
//!     );
//!     let request = QueryRequest::new(TimeRange::new(now - Duration::hours(1), now), vec![target]);
//!     let response = datasource.query(&request).await;
//!     println!("{} rows", response.data[0].row_count());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod datasource;
pub mod error;
pub mod frame;
pub mod http;
pub mod profile;
pub mod query;
pub mod tests;

pub use config::{
    BackendKind, CliArgs, ConfigStore, DataSourceOptions, EdsNamespace, InMemoryConfigStore,
    InstanceSettings, SecureOptions, Settings,
};
pub use datasource::{DataSource, SdsDataSource, TestResult, TestStatus};
pub use error::{Result, SdsError};
pub use frame::{Column, ColumnValues, FieldType, ResultTable};
pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestClient};
pub use profile::ConnectionProfile;
pub use query::{
    Position, QueryRequest, QueryResponse, QueryTarget, RetrievalMethod, SearchMode,
    StreamOption, StreamReference, TimeRange,
};
