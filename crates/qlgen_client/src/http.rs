//! Request transport.

use crate::error::{ClientError, ErrorCode};
use crate::operation::{Request, Response};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::time::Duration;

/// Sends a request and returns the undecoded response.
///
/// Implemented by [`HttpClient`]; implement it to route requests through
/// another transport, or to answer them in tests.
#[async_trait]
pub trait Client: Send + Sync {
    async fn post(&self, request: &Request) -> Result<Response<Value>, ClientError>;
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// URL of the GraphQL endpoint.
    pub endpoint: String,
    pub timeout: Duration,
    /// Retries after a network error or timeout.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further one.
    pub retry_delay: Duration,
    pub headers: HeaderMap,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_delay: Duration::from_millis(100),
            headers: HeaderMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Adds a header sent with every request.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, ClientError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|error| ClientError::new(ErrorCode::Network, format!("header `{name}`: {error}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|error| ClientError::new(ErrorCode::Network, format!("header `{name}`: {error}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }
}

/// GraphQL over HTTP POST.
#[derive(Debug, Clone)]
pub struct HttpClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl HttpClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_config(ClientConfig::new(endpoint))
    }

    pub fn with_config(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(config.headers.clone())
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn send_once(&self, request: &Request) -> Result<Response<Value>, ClientError> {
        let response = self
            .http
            .post(&self.config.endpoint)
            .json(request)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;

        match serde_json::from_slice::<Response<Value>>(&body) {
            Ok(parsed) => Ok(parsed),
            // Servers may report GraphQL errors with a non-2xx status; only
            // bodies that are not a GraphQL response fail on status.
            Err(_) if !status.is_success() => Err(ClientError::new(
                ErrorCode::HttpStatus,
                format!(
                    "{} returned {status}: {}",
                    self.config.endpoint,
                    truncate(&String::from_utf8_lossy(&body), 200)
                ),
            )),
            Err(error) => Err(ClientError::new(
                ErrorCode::InvalidResponse,
                format!("invalid GraphQL response: {error}"),
            )),
        }
    }
}

#[async_trait]
impl Client for HttpClient {
    async fn post(&self, request: &Request) -> Result<Response<Value>, ClientError> {
        let mut attempt = 0;
        loop {
            match self.send_once(request).await {
                Err(error) if error.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_delay * 2_u32.saturating_pow(attempt);
                    attempt += 1;
                    tracing::warn!(
                        operation = %request.operation_name,
                        attempt,
                        error = %error,
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
