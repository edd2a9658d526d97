//! API client for communicating with the devtrack REST API.
//!
//! This module provides the `ApiClient` struct for making requests to the
//! collection, batch sync, activity and health endpoints.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::{
    ActivityStats, ActivitySummary, ApiEnvelope, BatchRequest, BatchResult, CacheHealth,
    Dashboard, HeatmapDay, LogActivityRequest, ResourceKind,
};
use crate::sync::BatchSink;
use crate::tracker::CollectionSource;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Header carrying the caller's user id, set by the gateway in production.
pub const USER_ID_HEADER: &str = "x-user-id";

/// API client for the devtrack server.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    user_id: Option<String>,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client for the server at `base_url`
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id: None,
            token: None,
        })
    }

    /// Client for the configured server, acting as the configured user if any.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Self::new(config.api_base_url())?;
        Ok(match config.user() {
            Some(user) => client.with_user(user),
            None => client,
        })
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Set the bearer token forwarded to the gateway
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Create a new ApiClient acting as `user_id`, sharing the connection pool.
    pub fn with_user(&self, user_id: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            user_id: Some(user_id.into()),
            token: self.token.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref user_id) = self.user_id {
            headers.insert(USER_ID_HEADER, header::HeaderValue::from_str(user_id)?);
        }
        if let Some(ref token) = self.token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    /// Unwrap the `{ success, data }` envelope every endpoint responds with.
    fn unwrap_envelope<T>(envelope: ApiEnvelope<T>, url: &str) -> Result<T> {
        match envelope {
            ApiEnvelope {
                success: true,
                data: Some(data),
                ..
            } => Ok(data),
            ApiEnvelope { error, .. } => Err(ApiError::InvalidResponse(format!(
                "{}: {}",
                url,
                error.unwrap_or_else(|| "missing data".to_string())
            ))
            .into()),
        }
    }

    /// Send a request, retrying with exponential backoff while rate limited.
    async fn send_with_retry<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let url = self.url(path);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .headers(self.auth_headers()?);
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request
                .send()
                .await
                .with_context(|| format!("Failed to send {} request to {}", method, url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    let envelope: ApiEnvelope<T> = response
                        .json()
                        .await
                        .with_context(|| format!("Failed to parse JSON response from {}", url))?;
                    return Self::unwrap_envelope(envelope, &url);
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_with_retry::<T, ()>(Method::GET, path, None).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.send_with_retry(Method::POST, path, Some(body)).await
    }

    // ===== Collections =====

    /// Fetch a whole collection as raw JSON documents
    pub async fn fetch_collection(&self, kind: ResourceKind) -> Result<Vec<Value>> {
        self.get(&format!("/resources/{}", kind)).await
    }

    /// Fetch a whole collection and parse it into `T`
    pub async fn fetch_typed<T: DeserializeOwned>(&self, kind: ResourceKind) -> Result<Vec<T>> {
        self.get(&format!("/resources/{}", kind)).await
    }

    /// Create a record, returning it with its server-assigned id
    pub async fn create<T: DeserializeOwned, B: Serialize>(
        &self,
        kind: ResourceKind,
        record: &B,
    ) -> Result<T> {
        self.post(&format!("/resources/{}", kind), record).await
    }

    pub async fn delete(&self, kind: ResourceKind, id: &str) -> Result<()> {
        let _: Value = self
            .send_with_retry::<Value, ()>(
                Method::DELETE,
                &format!("/resources/{}/{}", kind, id),
                None,
            )
            .await?;
        Ok(())
    }

    // ===== Write-behind Sync =====

    /// Send one batch of updates. Not retried: the flush scheduler owns the
    /// retry policy.
    pub async fn batch_update(
        &self,
        kind: ResourceKind,
        request: &BatchRequest,
    ) -> Result<BatchResult> {
        let url = self.url(&format!("/resources/{}/batch", kind));
        debug!(url = %url, updates = request.len(), "Sending batch update");

        let response = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to send batch update to {}", url))?;

        let response = Self::check_response(response).await?;
        let envelope: ApiEnvelope<BatchResult> = response
            .json()
            .await
            .context("Failed to parse batch update response")?;
        Self::unwrap_envelope(envelope, &url)
    }

    // ===== Activity & Analytics =====

    pub async fn log_activity(&self, request: &LogActivityRequest) -> Result<ActivitySummary> {
        self.post("/activity", request).await
    }

    pub async fn fetch_heatmap(&self, days: u32) -> Result<Vec<HeatmapDay>> {
        self.get(&format!("/activity/heatmap?days={}", days)).await
    }

    pub async fn fetch_stats(&self) -> Result<ActivityStats> {
        self.get("/activity/stats").await
    }

    pub async fn fetch_dashboard(&self) -> Result<Dashboard> {
        self.get("/dashboard").await
    }

    pub async fn cache_health(&self) -> Result<CacheHealth> {
        self.get("/cache-health").await
    }
}

#[async_trait]
impl BatchSink for ApiClient {
    async fn send_batch(&self, kind: ResourceKind, request: BatchRequest) -> Result<BatchResult> {
        self.batch_update(kind, &request).await
    }
}

#[async_trait]
impl CollectionSource for ApiClient {
    async fn fetch_collection(&self, kind: ResourceKind) -> Result<Vec<Value>> {
        ApiClient::fetch_collection(self, kind).await
    }
}
