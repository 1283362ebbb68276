//! HTTP transport collaborator.
//!
//! Backends never talk to `reqwest` directly; they build an [`HttpRequest`] and hand it to an
//! [`HttpTransport`]. This keeps every protocol step mockable and gives one place where
//! non-2xx statuses are turned into [`TransportError::Status`].

use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use reqwest::Method;
use serde::Serialize;
use tracing::{debug, error};

use crate::error::TransportError;

/// A fully described request: url, method, headers and raw body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// A `POST` with a JSON body and the matching `Content-Type`.
    pub fn post_json<T: Serialize + ?Sized>(
        url: impl Into<String>,
        payload: &T,
    ) -> Result<Self, TransportError> {
        let url = url.into();
        let body = serde_json::to_vec(payload).map_err(|e| TransportError::Network {
            url: url.clone(),
            message: format!("failed to encode JSON body: {e}"),
        })?;
        Ok(Self::new(Method::POST, url)
            .header("Content-Type", "application/json")
            .body(body))
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Value of the first header matching `name`, ignoring ASCII case.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Sends a request and returns the UTF-8 response body.
///
/// Implementations fail on network errors and on any non-success status code.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<String, TransportError>;
}

/// Production transport backed by a shared `reqwest::Client`.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[tracing::instrument(
        skip(self, request),
        fields(method = %request.method, url = %request.url)
    )]
    async fn send(&self, request: HttpRequest) -> Result<String, TransportError> {
        let HttpRequest {
            url,
            method,
            headers,
            body,
        } = request;

        let mut builder = self.client.request(method, &url);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !body.is_empty() {
            debug!(body_len = body.len(), "Attaching request body");
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            error!(error = %e, url = %url, "HTTP request failed");
            TransportError::Network {
                url: url.clone(),
                message: e.to_string(),
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            error!(error = %e, url = %url, "Failed to read response body");
            TransportError::Network {
                url: url.clone(),
                message: format!("failed to read response body: {e}"),
            }
        })?;

        if !status.is_success() {
            error!(
                status = %status,
                url = %url,
                "Backend returned error status. Response body: {text}"
            );
            return Err(TransportError::Status {
                url,
                status: status.as_u16(),
                body: text,
            });
        }

        debug!(status = %status, response_len = text.len(), "HTTP request completed");
        Ok(text)
    }
}
