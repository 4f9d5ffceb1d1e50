//! HTTP capability used by [`WorkItemClient`](super::WorkItemClient).
//!
//! The client only needs `request(method, path, body?) -> JSON`. Timeouts,
//! authentication headers and status mapping live here.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unauthorized: personal access token missing or invalid")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Remote returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl TransportError {
    /// HTTP status, when the remote answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Unauthorized => Some(401),
            Self::NotFound(_) => Some(404),
            Self::Status { status, .. } => Some(*status),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Send one request relative to the configured base URL and return the
/// decoded JSON body (`Value::Null` for an empty body).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError>;
}

/// `reqwest` transport authenticating with a personal access token.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, TransportError> {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a request with the Basic auth header PATs use (empty user name).
    fn build(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method.into(), &url);
        if let Some(ref token) = self.token {
            req = req.basic_auth("", Some(token));
        }
        req
    }

    /// Convert HTTP errors to `TransportError`.
    async fn handle_response(&self, response: reqwest::Response) -> Result<Value, TransportError> {
        let status = response.status();
        if status.is_success() {
            let bytes = response.bytes().await?;
            if bytes.is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            }));
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(TransportError::NotFound(body)),
            StatusCode::UNAUTHORIZED => Err(TransportError::Unauthorized),
            _ => Err(TransportError::Status {
                status: status.as_u16(),
                body,
            }),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        tracing::debug!(%method, path, "sending request");
        let mut req = self.build(method, path);
        if let Some(ref body) = body {
            req = req.json(body);
        }
        let response = req.send().await?;
        self.handle_response(response).await
    }
}
