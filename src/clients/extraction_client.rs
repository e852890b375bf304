/// 提取服务客户端
///
/// 封装 `POST /process-page` 调用，任何失败都归一为 `ExtractionOutcome::Failure`
use crate::error::{ApiError, AppError, AppResult};
use crate::models::{ExtractionContext, ExtractionOutcome, PageDescriptor};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, warn};

/// 单页提取能力
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    /// 提交一页并等待结果；实现不得 panic 或挂起不返回
    async fn submit(&self, page: &PageDescriptor, ctx: &ExtractionContext) -> ExtractionOutcome;
}

/// 带硬超时地提交一页，超时结果为 `Failure("timeout")`
pub async fn submit_with_timeout(
    client: &dyn ExtractionClient,
    page: &PageDescriptor,
    ctx: &ExtractionContext,
    timeout: Duration,
) -> ExtractionOutcome {
    match tokio::time::timeout(timeout, client.submit(page, ctx)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!("[页 {}] ⏱️ 提取超时 ({:?})", page.page_number, timeout);
            ExtractionOutcome::timeout()
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessPageRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    page_buffer: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<&'a str>,
    file_name: &'a str,
    mime_type: &'a str,
    document_type: String,
    original_file_name: &'a str,
    page_number: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessPageResponse {
    success: bool,
    #[serde(default)]
    extracted_data: Option<JsonValue>,
    #[serde(default)]
    error: Option<String>,
}

/// 基于 reqwest 的提取客户端
pub struct HttpExtractionClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpExtractionClient {
    /// 创建新的提取客户端；`timeout` 同时作为 HTTP 层超时
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::api_request_failed("client-builder", e))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/process-page", self.base_url)
    }

    async fn post_page(
        &self,
        page: &PageDescriptor,
        ctx: &ExtractionContext,
    ) -> AppResult<ProcessPageResponse> {
        let endpoint = self.endpoint();
        let inline = page.image_ref.starts_with("data:");
        let body = ProcessPageRequest {
            page_buffer: inline.then_some(page.image_ref.as_str()),
            image_url: (!inline).then_some(page.image_ref.as_str()),
            file_name: &page.file_name,
            mime_type: &page.mime_type,
            document_type: ctx.document_type.to_string(),
            original_file_name: &ctx.original_file_name,
            page_number: page.page_number,
        };

        debug!("[页 {}] POST {}", page.page_number, endpoint);

        let response = self
            .http
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(&endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::BadStatus {
                endpoint,
                status: status.as_u16(),
            }
            .into());
        }

        response.json::<ProcessPageResponse>().await.map_err(|e| {
            ApiError::MalformedBody {
                endpoint,
                message: e.to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl ExtractionClient for HttpExtractionClient {
    async fn submit(&self, page: &PageDescriptor, ctx: &ExtractionContext) -> ExtractionOutcome {
        match self.post_page(page, ctx).await {
            Ok(ProcessPageResponse {
                success: true,
                extracted_data: Some(data),
                ..
            }) => ExtractionOutcome::Success(data),
            Ok(ProcessPageResponse { success: true, .. }) => {
                ExtractionOutcome::Failure("提取成功但未返回数据".to_string())
            }
            Ok(ProcessPageResponse { error, .. }) => {
                ExtractionOutcome::Failure(error.unwrap_or_else(|| "提取失败".to_string()))
            }
            Err(AppError::Api(ApiError::RequestFailed { source, .. })) if source.is_timeout() => {
                ExtractionOutcome::timeout()
            }
            Err(e) => ExtractionOutcome::Failure(e.to_string()),
        }
    }
}
