//! Request descriptors and the HTTP transport.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::client::HttpClient;
use super::headers;
use crate::envelope::RawResponse;
use crate::error::{Error, Result};

/// One outbound call: method, path relative to the base URL, query and body.
///
/// Descriptors are immutable once built. Retries reuse the same descriptor;
/// the access token is supplied separately at send time.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Append one query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Sends one request and reports what came back.
///
/// Implementations never fail: anything that prevents a response from
/// arriving is reported as [`RawResponse::Failed`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &RequestDescriptor, access_token: Option<&str>) -> RawResponse;
}

/// reqwest-backed [`Transport`] rooted at a base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: HttpClient,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for `base_url` (e.g. `http://localhost:8080/api`).
    pub fn new(client: HttpClient, base_url: &str) -> Result<Self> {
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Validate a base URL and strip its trailing slash.
pub fn normalize_base_url(base_url: &str) -> Result<String> {
    let parsed = Url::parse(base_url)
        .map_err(|e| Error::Config(format!("Invalid base URL '{}': {}", base_url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "Base URL must be http or https, got '{}'",
            parsed.scheme()
        )));
    }
    Ok(base_url.trim_end_matches('/').to_string())
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &RequestDescriptor, access_token: Option<&str>) -> RawResponse {
        let url = self.url_for(&request.path);
        let hdrs = headers::api_headers(access_token, request.body.is_some());

        let mut builder = self
            .client
            .inner()
            .request(request.method.clone(), &url)
            .headers(hdrs);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let message = if e.is_timeout() {
                    warn!(method = %request.method, path = %request.path, "Request timed out");
                    "Request timed out".to_string()
                } else {
                    warn!(method = %request.method, path = %request.path, error = %e, "Request failed");
                    format!("Network error: {}", e)
                };
                return RawResponse::Failed {
                    message: Some(message),
                };
            }
        };

        let status = response.status().as_u16();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(status, error = %e, "Failed to read response body");
                return RawResponse::Failed { message: None };
            }
        };

        let body = if bytes.is_empty() {
            None
        } else {
            serde_json::from_slice::<Value>(&bytes).ok()
        };
        debug!(
            method = %request.method,
            path = %request.path,
            status,
            json = body.is_some(),
            "Response received"
        );

        RawResponse::Received { status, body }
    }
}
