//! Command-line front end for the SDS data source.
//!
//! Runs the connectivity check, stream search and queries against a
//! configured OCS or EDS instance and prints the results as JSON.
//!
//! # Configuration
//!
//! Configuration can be provided through multiple sources, in order of precedence:
//!
//! 1. Command-line arguments (highest precedence)
//! 2. Environment variables (prefixed with `SDS_`, also read from `.env`)
//! 3. User-specified configuration file (via `--config`)
//! 4. Local overrides (`config/local.toml`)
//! 5. System-wide configuration (`/etc/sds-datasource/config.toml`)
//! 6. Default configuration (embedded in binary)
//!
//! ## Configuration File Format (TOML)
//!
//! ```toml
//! name = "ocs"
//! url = ""                 # instance (proxy) URL; empty routes /ocs to ocs_url
//!
//! [options]
//! type = "OCS"             # Options: "OCS", "EDS"
//! ocs_url = "https://dat-b.osisoft.com"
//! ocs_version = "v1"
//! ocs_tenant = "00000000-0000-0000-0000-000000000000"
//! namespace = "default"
//! ocs_use_community = false
//! ocs_community = ""
//! oauth_pass_thru = false
//! eds_port = "5590"
//! ```
//!
//! # Examples
//!
//! ```bash
//! # Check the configuration
//! sds-datasource --tenant $TENANT --namespace default test
//!
//! # Search streams on a local Edge Data Store
//! sds-datasource --type eds streams Temperature
//!
//! # Interpolated values of the last day
//! sds-datasource --type eds query Temperature --method interpolated --from 2024-01-01T00:00:00Z
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use sds_datasource::{
    config::DEFAULT_OCS_URL, CliArgs, ConfigStore, DataSource, QueryRequest, QueryTarget,
    ReqwestClient, RetrievalMethod, SdsDataSource, Settings, StreamReference, TimeRange,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    connection: CliArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the configured backend answers
    Test,
    /// Search the stream catalog
    Streams {
        /// Text to search for; lists all streams when omitted
        query: Option<String>,
    },
    /// Read a stream over a time range
    Query {
        /// Stream id, or stream URL in community mode
        stream: String,
        /// Range start (RFC 3339); defaults to one day before the end
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        /// Range end (RFC 3339); defaults to now
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        /// values, first, last, distinct, interpolated or summaries
        #[arg(long, default_value = "values")]
        method: String,
        /// SDS filter expression
        #[arg(long)]
        filter: Option<String>,
        /// Event count of interpolated and summary reads
        #[arg(long)]
        count: Option<u32>,
    },
    /// Print the effective settings, secrets redacted
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Load settings from config files, environment and CLI args
    let settings = Settings::new(&cli.connection)?;
    settings.options.validate()?;
    let access_token = settings.access_token.clone();
    let store = settings.into_store();

    let instance = store.get();
    let mut client = ReqwestClient::new();
    if instance.url.as_deref().map(str::trim).unwrap_or_default().is_empty() {
        // Without an instance URL, serve the /ocs route the way the host proxy does.
        let ocs_url = instance
            .json_data
            .ocs_url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_OCS_URL.to_string());
        client = client.with_route("/ocs", ocs_url);
    }
    if instance.json_data.oauth_pass_thru.unwrap_or(false) {
        if let Some(token) = access_token {
            client = client.with_bearer_token(token);
        }
    }

    let datasource = SdsDataSource::from_store(&store, Arc::new(client));
    info!(
        backend = %datasource.profile().kind,
        listing = %datasource.profile().listing_url(),
        "data source ready"
    );

    let output = match cli.command {
        Command::Test => {
            let result = datasource.test_connection().await.map_err(|e| store.redact(&e.to_string()))?;
            serde_json::to_string_pretty(&result)?
        }
        Command::Streams { query } => {
            let streams = datasource
                .search_streams(query.as_deref().unwrap_or_default())
                .await
                .map_err(|e| store.redact(&e.to_string()))?;
            serde_json::to_string_pretty(&streams)?
        }
        Command::Query {
            stream,
            from,
            to,
            method,
            filter,
            count,
        } => {
            let to = to.unwrap_or_else(Utc::now);
            let from = from.unwrap_or(to - Duration::days(1));
            let method: RetrievalMethod = serde_json::from_value(serde_json::Value::String(method))?;

            let mut target = QueryTarget::new(
                "A",
                StreamReference {
                    id: stream.clone(),
                    name: stream,
                },
            )
            .with_method(method);
            target.filter = filter;

            let mut request = QueryRequest::new(TimeRange::new(from, to), vec![target]);
            request.max_data_points = count;

            let response = datasource.query(&request).await;
            serde_json::to_string_pretty(&response)?
        }
        Command::Config => serde_json::to_string_pretty(&instance)?,
    };

    println!("{}", output);
    Ok(())
}
