//! HTTP client for the chat history REST API.
//!
//! Handles bearer authentication, custom headers, timeout management, SSL
//! certificate handling, exponential backoff retry, and request/response lifecycle.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use sc_core::config::{AppConfig, ServerConfig};
use sc_core::constants;
use sc_core::error::{ScError, ScResult};
use sc_core::platform::Platform;

use crate::response::ServerResponse;

/// Retry configuration for HTTP requests.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay between retries (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// HTTP status codes that trigger a retry.
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            retryable_statuses: vec![502, 503, 504],
        }
    }
}

/// HTTP client for the chat server's REST API.
#[derive(Clone)]
pub struct ApiClient {
    inner: Client,
    /// Base URL for the API (e.g. "https://shop.example.com/api/v1").
    api_root: String,
    /// Bearer token; empty sends no Authorization header.
    token: String,
    timeout: Duration,
    custom_headers: Vec<(String, String)>,
    retry_config: RetryConfig,
}

impl ApiClient {
    /// Create a new ApiClient from server configuration.
    pub fn new(config: &ServerConfig, token: impl Into<String>) -> ScResult<Self> {
        if config.address.is_empty() {
            return Err(ScError::MissingConfig("server.address".into()));
        }
        let sanitized_address = AppConfig::sanitize_server_address(&config.address);
        let timeout = config.api_timeout();

        let mut builder = Client::builder()
            .user_agent(Platform::user_agent())
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(15))
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(90));

        // Handle self-signed certificates
        if config.accept_self_signed_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let inner = builder
            .build()
            .map_err(|e| ScError::Http(format!("failed to build HTTP client: {e}")))?;

        let origin = derive_origin(&sanitized_address);
        let api_root = format!("{origin}/api/{}", constants::API_VERSION);

        let mut custom_headers: Vec<(String, String)> = config
            .custom_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        custom_headers.sort();

        Ok(Self {
            inner,
            api_root,
            token: token.into(),
            timeout,
            custom_headers,
            retry_config: RetryConfig::default(),
        })
    }

    /// Set custom retry configuration.
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Get the current API root URL.
    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_root)
    }

    /// Apply auth and custom headers to a request builder.
    fn apply_headers(&self, mut builder: RequestBuilder) -> RequestBuilder {
        if !self.token.is_empty() {
            builder = builder.bearer_auth(&self.token);
        }
        for (key, value) in &self.custom_headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        builder
    }

    fn build_request(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> RequestBuilder {
        let mut builder = self.inner.request(method, url).timeout(self.timeout);
        if let Some(b) = body {
            builder = builder.json(b);
        }
        self.apply_headers(builder)
    }

    /// Execute a request with exponential backoff retry.
    async fn request_with_retry(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> ScResult<Response> {
        let url = self.url(path);
        debug!("{} {}", method, path);

        let mut last_error: Option<ScError> = None;

        for attempt in 0..=self.retry_config.max_retries {
            if attempt > 0 {
                let delay = self.calculate_retry_delay(attempt - 1);
                warn!(
                    "retrying {} {} (attempt {}/{}) after {:.1}s",
                    method,
                    path,
                    attempt + 1,
                    self.retry_config.max_retries + 1,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
            }

            let builder = self.build_request(method.clone(), &url, body);

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();

                    if self
                        .retry_config
                        .retryable_statuses
                        .contains(&status.as_u16())
                        && attempt < self.retry_config.max_retries
                    {
                        warn!("retryable status {} from {}", status.as_u16(), path);
                        last_error = Some(ScError::ServerError {
                            status: status.as_u16(),
                            message: format!("retryable status {status}"),
                        });
                        continue;
                    }

                    return Self::check_status(response).await;
                }
                Err(e) => {
                    let is_retryable = e.is_timeout() || e.is_connect();
                    let err = Self::classify_error(e);

                    if is_retryable && attempt < self.retry_config.max_retries {
                        warn!("retryable error on {}: {}", path, err);
                        last_error = Some(err);
                        continue;
                    }

                    return Err(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ScError::Http("max retries exceeded".into())))
    }

    /// Calculate retry delay with exponential backoff.
    fn calculate_retry_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.retry_config.base_delay.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(1u64 << attempt.min(32));
        let max_ms = self.retry_config.max_delay.as_millis() as u64;
        Duration::from_millis(delay_ms.min(max_ms))
    }

    // --- Public HTTP methods ---

    /// Execute a GET request with automatic retry.
    pub async fn get(&self, path: &str) -> ScResult<Response> {
        self.request_with_retry(Method::GET, path, None).await
    }

    /// Execute a POST request with a JSON body.
    pub async fn post(&self, path: &str, body: &serde_json::Value) -> ScResult<Response> {
        self.request_with_retry(Method::POST, path, Some(body)).await
    }

    // --- Response helpers ---

    /// Deserialize a response body into a ServerResponse<T>.
    pub async fn parse_response<T: DeserializeOwned>(
        response: Response,
    ) -> ScResult<ServerResponse<T>> {
        response
            .json::<ServerResponse<T>>()
            .await
            .map_err(|e| ScError::Serialization(format!("failed to parse response: {e}")))
    }

    /// Convenience: GET + parse into ServerResponse<T>.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ScResult<ServerResponse<T>> {
        let resp = self.get(path).await?;
        Self::parse_response(resp).await
    }

    /// Convenience: POST + parse into ServerResponse<T>.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> ScResult<ServerResponse<T>> {
        let resp = self.post(path, body).await?;
        Self::parse_response(resp).await
    }

    /// Check the HTTP status code and convert to ScError if needed.
    async fn check_status(response: Response) -> ScResult<Response> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ScError::AuthFailed(format!("server returned {status}")));
        }

        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ServerResponse>(&body)
                .ok()
                .and_then(|r| r.error_message())
                .unwrap_or(body);
            return Err(ScError::ServerError {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    /// Classify a reqwest error into a ScError variant.
    fn classify_error(e: reqwest::Error) -> ScError {
        if e.is_timeout() {
            ScError::Timeout(e.to_string())
        } else if e.is_connect() {
            ScError::Http(format!("connection failed: {e}"))
        } else {
            ScError::Http(e.to_string())
        }
    }
}

/// Derive the origin (scheme + host + optional port) from a server address.
fn derive_origin(address: &str) -> String {
    if let Ok(url) = reqwest::Url::parse(address) {
        let host = url.host_str().unwrap_or("localhost");
        match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        }
    } else {
        address.to_string()
    }
}
