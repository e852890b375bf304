/// 批处理会话状态客户端
///
/// 封装 `GET /batch-status/{sessionId}`
use crate::error::{AppError, AppResult, StatusFetchError};
use crate::models::BatchStatus;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

/// 会话状态来源
#[async_trait]
pub trait BatchStatusSource: Send + Sync {
    async fn fetch_status(&self, session_id: &str) -> Result<BatchStatus, StatusFetchError>;
}

/// 基于 reqwest 的会话状态客户端
pub struct HttpBatchStatusClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBatchStatusClient {
    /// `request_timeout` 只约束单次查询，不是轮询总时长
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AppError::api_request_failed("client-builder", e))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl BatchStatusSource for HttpBatchStatusClient {
    async fn fetch_status(&self, session_id: &str) -> Result<BatchStatus, StatusFetchError> {
        let endpoint = format!("{}/batch-status/{}", self.base_url, session_id);
        debug!("[会话 {}] GET {}", session_id, endpoint);

        let response = self
            .http
            .get(&endpoint)
            .send()
            .await
            .map_err(|e| StatusFetchError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StatusFetchError::NotFound),
            status if !status.is_success() => Err(StatusFetchError::BadStatus(status.as_u16())),
            _ => response
                .json::<BatchStatus>()
                .await
                .map_err(|e| StatusFetchError::Malformed(e.to_string())),
        }
    }
}
