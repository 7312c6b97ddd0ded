use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::models::{RateLimitResponse, SinkError};
use super::ratelimit::OutboundLimiter;
use super::retry::RetryPolicy;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const IDEMPOTENCY_KEY: &str = "idempotency-key";

/// HTTP client for one external sink. A sink without a base URL is disabled.
pub struct SinkClient {
    service: &'static str,
    http_client: HttpClient,
    base_url: Option<String>,
    api_token: Option<String>,
    retry: RetryPolicy,
    limiter: OutboundLimiter,
}

impl SinkClient {
    pub fn new(
        service: &'static str,
        base_url: Option<String>,
        api_token: Option<String>,
        retry: RetryPolicy,
    ) -> Self {
        let http_client = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| HttpClient::new());

        Self {
            service,
            http_client,
            base_url,
            api_token,
            retry,
            limiter: OutboundLimiter::new(service),
        }
    }

    /// A client that never sends anything
    pub fn disabled(service: &'static str) -> Self {
        Self::new(service, None, None, RetryPolicy::default())
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn is_enabled(&self) -> bool {
        self.base_url.is_some()
    }

    /// Create default headers, with the bearer token when one is configured
    /// and the idempotency key when the call has one
    fn create_headers(&self, idempotency_key: Option<&str>) -> Result<HeaderMap, SinkError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(key) = idempotency_key {
            let key_value = HeaderValue::from_str(key)
                .map_err(|e| SinkError::Request(format!("Failed to create idempotency header: {}", e)))?;
            headers.insert(IDEMPOTENCY_KEY, key_value);
        }

        if let Some(token) = &self.api_token {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| SinkError::Request(format!("Failed to create auth header: {}", e)))?;
            headers.insert(AUTHORIZATION, auth_value);
        }

        Ok(headers)
    }

    /// Map a non-success response to a `SinkError`
    async fn handle_error_response(&self, status: reqwest::StatusCode, response: reqwest::Response) -> SinkError {
        let status_code = status.as_u16();
        let body_text = response.text().await.unwrap_or_default();

        match status_code {
            429 => {
                let retry_after_ms = serde_json::from_str::<RateLimitResponse>(&body_text)
                    .ok()
                    .and_then(|r| r.retry_after)
                    .unwrap_or(1000);
                warn!("{} rate limited, retry after {} ms", self.service, retry_after_ms);
                SinkError::RateLimited { retry_after_ms }
            }
            500..=599 => {
                warn!("{} server error {}: {}", self.service, status_code, body_text);
                SinkError::ServerError(status_code, body_text)
            }
            _ => {
                let message = serde_json::from_str::<serde_json::Value>(&body_text)
                    .ok()
                    .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                    .unwrap_or(body_text);
                SinkError::Rejected(status_code, message)
            }
        }
    }

    async fn post_once<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        idempotency_key: Option<&str>,
    ) -> Result<String, SinkError> {
        self.limiter.acquire().await;
        let headers = self.create_headers(idempotency_key)?;

        let response = self
            .http_client
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| SinkError::Request(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.handle_error_response(status, response).await);
        }

        response
            .text()
            .await
            .map_err(|e| SinkError::Request(format!("Failed to read response: {}", e)))
    }

    /// POST `body` to `{base}{path}` under the retry policy and return the raw body.
    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<String, SinkError> {
        self.send(path, body, None).await
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        idempotency_key: Option<&str>,
    ) -> Result<String, SinkError> {
        let base_url = self.base_url.as_deref().ok_or(SinkError::Disabled(self.service))?;
        let url = format!("{}{}", base_url, path);
        let url = url.as_str();

        let text = self
            .retry
            .run(path, move || self.post_once(url, body, idempotency_key))
            .await?;
        debug!("{} POST {} succeeded", self.service, path);
        Ok(text)
    }

    /// POST and decode a JSON response
    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, SinkError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let text = self.send(path, body, None).await?;
        decode(path, &text)
    }

    /// POST that creates something on the remote side. Every attempt carries
    /// the same `Idempotency-Key`, so a retry after a lost response cannot
    /// create it twice.
    pub async fn post_json_once<B, R>(&self, path: &str, body: &B, idempotency_key: &str) -> Result<R, SinkError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let text = self.send(path, body, Some(idempotency_key)).await?;
        decode(path, &text)
    }
}

fn decode<R: DeserializeOwned>(path: &str, text: &str) -> Result<R, SinkError> {
    serde_json::from_str(text).map_err(|e| SinkError::Decode(format!("{}: {}", path, e)))
}
