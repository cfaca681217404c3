//! HTTP capability the data source issues its requests through.
//!
//! The host normally supplies the transport (connection handling, auth
//! headers, proxy routes). [`ReqwestClient`] is the stand-alone implementation
//! used by the command-line front end.

use async_trait::async_trait;
use reqwest::{header, Client, Method};
use serde_json::Value;
use tracing::debug;

use crate::error::Result;

/// A request as the data source issues it: a URL with all parameters inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub method: Method,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
        }
    }
}

/// A settled response. `body` is `None` when the response carried no content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub body: Option<Value>,
}

impl HttpResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            body: Some(body),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues HTTP requests on behalf of the data source.
///
/// An `Err` means the request never produced a response (transport failure);
/// any HTTP status, including errors, is returned as a response.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// [`HttpClient`] on top of `reqwest`.
pub struct ReqwestClient {
    client: Client,
    bearer_token: Option<String>,
    routes: Vec<(String, String)>,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            bearer_token: None,
            routes: Vec::new(),
        }
    }

    /// Forwards an already issued token with every request.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Rewrites URLs starting with `prefix` to start with `target` instead,
    /// the way the host proxies plugin routes.
    pub fn with_route(mut self, prefix: impl Into<String>, target: impl Into<String>) -> Self {
        self.routes.push((prefix.into(), target.into()));
        self
    }

    fn resolve(&self, url: &str) -> String {
        self.routes
            .iter()
            .find_map(|(prefix, target)| {
                url.strip_prefix(prefix.as_str())
                    .map(|rest| format!("{}{}", target.trim_end_matches('/'), rest))
            })
            .unwrap_or_else(|| url.to_string())
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = self.resolve(&request.url);
        debug!(method = %request.method, %url, "sending request");

        let mut builder = self
            .client
            .request(request.method, &url)
            .header(header::ACCEPT, "application/json");
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        // Error pages are frequently not JSON; keep the status and drop the body.
        let body = if bytes.is_empty() {
            None
        } else {
            serde_json::from_slice(&bytes).ok()
        };

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}
