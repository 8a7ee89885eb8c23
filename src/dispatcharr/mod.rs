//! Dispatcharr client
//!
//! HTTP adapter for the downstream channel manager. Every operation returns
//! an `OperationResult` — transient failures are retried here with
//! exponential backoff and jitter, and nothing ever raises into the core.
//! JWT auth with automatic re-login on 401.

use crate::models::settings::DispatcharrSettings;
use crate::models::SourceStream;
use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Retryable HTTP status codes (server-side transient errors).
const RETRYABLE_STATUS: [u16; 3] = [502, 503, 504];
const MAX_RETRIES: u32 = 5;

/// Uniform result shape for all downstream operations.
#[derive(Debug, Clone, Serialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> OperationResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownstreamChannel {
    pub id: i64,
    #[serde(default)]
    pub uuid: Option<String>,
    pub name: String,
    #[serde(default)]
    pub channel_number: Option<i64>,
    #[serde(default)]
    pub tvg_id: Option<String>,
    #[serde(default)]
    pub streams: Vec<i64>,
    #[serde(default)]
    pub channel_group_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct M3uAccount {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

struct Inner {
    base_url: String,
    username: String,
    password: String,
    client: reqwest::Client,
    access_token: Mutex<Option<String>>,
}

/// Client handle; cheap to clone. A disabled configuration produces a client
/// whose operations all fail softly with "disabled".
#[derive(Clone)]
pub struct DispatcharrClient {
    inner: Option<Arc<Inner>>,
}

impl DispatcharrClient {
    pub fn from_settings(settings: &DispatcharrSettings, timeout_secs: u64) -> Result<Self> {
        if !settings.enabled || settings.url.is_empty() {
            return Ok(Self { inner: None });
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            inner: Some(Arc::new(Inner {
                base_url: settings.url.trim_end_matches('/').to_string(),
                username: settings.username.clone(),
                password: settings.password.clone(),
                client,
                access_token: Mutex::new(None),
            })),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub async fn list_channels(&self) -> OperationResult<Vec<DownstreamChannel>> {
        self.get_json("/api/channels/channels/").await
    }

    pub async fn create_channel(
        &self,
        name: &str,
        channel_number: Option<i64>,
        stream_ids: &[i64],
        tvg_id: &str,
        channel_group_id: Option<i64>,
        profile_ids: &[i64],
    ) -> OperationResult<DownstreamChannel> {
        let body = json!({
            "name": name,
            "channel_number": channel_number,
            "streams": stream_ids,
            "tvg_id": tvg_id,
            "channel_group_id": channel_group_id,
            "channel_profile_ids": profile_ids,
        });
        self.send_json(reqwest::Method::POST, "/api/channels/channels/", Some(body))
            .await
    }

    pub async fn update_channel(
        &self,
        id: i64,
        fields: serde_json::Value,
    ) -> OperationResult<DownstreamChannel> {
        self.send_json(
            reqwest::Method::PATCH,
            &format!("/api/channels/channels/{id}/"),
            Some(fields),
        )
        .await
    }

    pub async fn delete_channel(&self, id: i64) -> OperationResult<()> {
        match self
            .request_with_retry(
                reqwest::Method::DELETE,
                &format!("/api/channels/channels/{id}/"),
                None,
            )
            .await
        {
            Ok(_) => OperationResult::ok(()),
            Err(e) => OperationResult::err(e.to_string()),
        }
    }

    /// Streams visible in one M3U group of one account.
    pub async fn list_streams(
        &self,
        group_id: Option<i64>,
        m3u_account_id: Option<i64>,
    ) -> OperationResult<Vec<SourceStream>> {
        let mut path = "/api/channels/streams/?page_size=10000".to_string();
        if let Some(group_id) = group_id {
            path.push_str(&format!("&channel_group={group_id}"));
        }
        if let Some(account_id) = m3u_account_id {
            path.push_str(&format!("&m3u_account={account_id}"));
        }

        #[derive(Deserialize)]
        struct StreamRow {
            id: i64,
            name: String,
            #[serde(default)]
            url: Option<String>,
            #[serde(default)]
            m3u_account: Option<i64>,
            #[serde(default)]
            m3u_account_name: Option<String>,
            #[serde(default)]
            channel_group_name: Option<String>,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StreamsPayload {
            Paginated { results: Vec<StreamRow> },
            Flat(Vec<StreamRow>),
        }

        let result: OperationResult<StreamsPayload> = self.get_json(&path).await;
        match result {
            OperationResult {
                success: true,
                data: Some(payload),
                ..
            } => {
                let rows = match payload {
                    StreamsPayload::Paginated { results } => results,
                    StreamsPayload::Flat(rows) => rows,
                };
                OperationResult::ok(
                    rows.into_iter()
                        .map(|row| SourceStream {
                            id: row.id,
                            name: row.name,
                            url: row.url,
                            m3u_account_id: row.m3u_account,
                            m3u_account_name: row.m3u_account_name,
                            group_title: row.channel_group_name,
                        })
                        .collect(),
                )
            }
            OperationResult { error, .. } => {
                OperationResult::err(error.unwrap_or_else(|| "unknown error".to_string()))
            }
        }
    }

    pub async fn list_m3u_accounts(&self) -> OperationResult<Vec<M3uAccount>> {
        self.get_json("/api/m3u/accounts/").await
    }

    pub async fn refresh_m3u_account(&self, id: i64) -> OperationResult<()> {
        match self
            .request_with_retry(
                reqwest::Method::POST,
                &format!("/api/m3u/refresh/{id}/"),
                None,
            )
            .await
        {
            Ok(_) => OperationResult::ok(()),
            Err(e) => OperationResult::err(e.to_string()),
        }
    }

    pub async fn trigger_epg_refresh(&self, epg_source_id: i64) -> OperationResult<()> {
        match self
            .request_with_retry(
                reqwest::Method::POST,
                &format!("/api/epg/import/{epg_source_id}/"),
                None,
            )
            .await
        {
            Ok(_) => OperationResult::ok(()),
            Err(e) => OperationResult::err(e.to_string()),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> OperationResult<T> {
        match self.request_with_retry(reqwest::Method::GET, path, None).await {
            Ok(response) => match response.json::<T>().await {
                Ok(data) => OperationResult::ok(data),
                Err(e) => OperationResult::err(format!("decode failed: {e}")),
            },
            Err(e) => OperationResult::err(e.to_string()),
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> OperationResult<T> {
        match self.request_with_retry(method, path, body).await {
            Ok(response) => match response.json::<T>().await {
                Ok(data) => OperationResult::ok(data),
                Err(e) => OperationResult::err(format!("decode failed: {e}")),
            },
            Err(e) => OperationResult::err(e.to_string()),
        }
    }

    /// Authenticated request with exponential backoff + jitter on transient
    /// failures, and one re-login on 401.
    async fn request_with_retry(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let Some(inner) = &self.inner else {
            anyhow::bail!("Dispatcharr is disabled");
        };
        let url = format!("{}{}", inner.base_url, path);

        let mut attempt: u32 = 0;
        loop {
            let token = self.ensure_token(inner).await?;
            let mut request = inner
                .client
                .request(method.clone(), &url)
                .header("Authorization", format!("Bearer {token}"));
            if let Some(body) = &body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if status == 401 {
                        debug!("Dispatcharr 401, re-authenticating");
                        *inner.access_token.lock().await = None;
                        if attempt >= MAX_RETRIES {
                            anyhow::bail!("authentication failed after retries");
                        }
                    } else if RETRYABLE_STATUS.contains(&status) {
                        if attempt >= MAX_RETRIES {
                            anyhow::bail!("HTTP {status} after {MAX_RETRIES} retries");
                        }
                        warn!("Dispatcharr HTTP {} on {}, retrying", status, path);
                    } else if response.status().is_client_error()
                        || response.status().is_server_error()
                    {
                        anyhow::bail!("HTTP {status} on {path}");
                    } else {
                        return Ok(response);
                    }
                }
                Err(e) => {
                    if attempt >= MAX_RETRIES {
                        return Err(e.into());
                    }
                    warn!("Dispatcharr request error on {}: {}, retrying", path, e);
                }
            }

            tokio::time::sleep(backoff_delay(attempt)).await;
            attempt += 1;
        }
    }

    async fn ensure_token(&self, inner: &Inner) -> Result<String> {
        let mut guard = inner.access_token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access: String,
        }

        let response = inner
            .client
            .post(format!("{}/api/accounts/token/", inner.base_url))
            .json(&json!({
                "username": inner.username,
                "password": inner.password,
            }))
            .send()
            .await?
            .error_for_status()?;

        let token: TokenResponse = response.json().await?;
        *guard = Some(token.access.clone());
        Ok(token.access)
    }
}

/// Exponential backoff with ±50% jitter, capped at 32 seconds:
/// min(32, 1 × 2^attempt) × random(0.5, 1.5).
fn backoff_delay(attempt: u32) -> Duration {
    let base = (1u64 << attempt.min(5)) as f64;
    let capped = base.min(32.0);
    let jitter = 0.5 + fastrand::f64();
    Duration::from_millis((capped * jitter * 1000.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_bounds() {
        for attempt in 0..8 {
            let delay = backoff_delay(attempt);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_secs(48));
        }
    }

    #[test]
    fn test_disabled_client() {
        let client =
            DispatcharrClient::from_settings(&DispatcharrSettings::default(), 30).unwrap();
        assert!(!client.is_enabled());
    }

    #[tokio::test]
    async fn test_disabled_client_fails_softly() {
        let client =
            DispatcharrClient::from_settings(&DispatcharrSettings::default(), 30).unwrap();
        let result = client.list_channels().await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("disabled"));
    }
}
