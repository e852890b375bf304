//! 结果归一化 - 业务能力层
//!
//! 直连模式和会话模式返回的载荷形状不同，这里统一成 `NormalizedPageData`

use crate::models::{DocumentType, NormalizedPageData, PageDescriptor, RemotePageInfo, SessionDocument};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{json, Map, Value as JsonValue};
use std::sync::OnceLock;

/// 归一化所需的批次上下文
#[derive(Debug, Clone)]
pub struct NormalizeCtx {
    pub document_type: DocumentType,
    pub original_file_name: String,
    pub api_base_url: String,
}

/// 结果来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSource {
    Direct,
    Session,
}

impl ResultSource {
    fn as_str(self) -> &'static str {
        match self {
            ResultSource::Direct => "direct",
            ResultSource::Session => "session",
        }
    }
}

fn has_scheme(url: &str) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?i:[a-z][a-z0-9+.\-]*:)").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(url))
}

/// 相对路径拼到后端地址上，已带 scheme 的地址（含 `data:`）原样返回
pub fn resolve_image_url(api_base_url: &str, url: &str) -> String {
    let url = url.trim();
    if url.is_empty() || has_scheme(url) {
        return url.to_string();
    }
    format!(
        "{}/{}",
        api_base_url.trim_end_matches('/'),
        url.trim_start_matches('/')
    )
}

fn id_from_value(value: Option<&JsonValue>) -> Option<String> {
    match value? {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn file_stem(name: &str) -> &str {
    name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
}

fn document_urls(ctx: &NormalizeCtx, id: &str) -> (String, String) {
    let base = ctx.api_base_url.trim_end_matches('/');
    (
        format!("{}/documents/{}/json", base, id),
        format!("{}/documents/{}/export", base, id),
    )
}

/// 后端给的元数据优先，缺失字段补齐
fn synthesize_metadata(
    existing: Option<&JsonValue>,
    page_number: u32,
    ctx: &NormalizeCtx,
    source: ResultSource,
    now: DateTime<Utc>,
) -> JsonValue {
    let mut metadata = Map::new();
    metadata.insert("page_number".into(), json!(page_number));
    metadata.insert("original_file_name".into(), json!(ctx.original_file_name));
    metadata.insert("document_type".into(), json!(ctx.document_type));
    metadata.insert("source".into(), json!(source.as_str()));
    metadata.insert("processed_at".into(), json!(now));
    if let Some(JsonValue::Object(existing)) = existing {
        for (key, value) in existing {
            metadata.insert(key.clone(), value.clone());
        }
    }
    JsonValue::Object(metadata)
}

/// 直连模式：`/process-page` 的 `extractedData`
pub fn normalize_direct(
    page: &PageDescriptor,
    raw: &JsonValue,
    ctx: &NormalizeCtx,
    now: DateTime<Utc>,
) -> NormalizedPageData {
    let id = id_from_value(raw.get("id"))
        .or_else(|| id_from_value(raw.get("document_id")))
        .unwrap_or_else(|| format!("{}-p{}", file_stem(&ctx.original_file_name), page.page_number));

    // 有的后端把提取内容包在 data 里，有的直接平铺
    let data = match raw.get("data") {
        Some(inner) if !inner.is_null() => inner.clone(),
        _ => raw.clone(),
    };
    let (json_url, export_url) = document_urls(ctx, &id);
    let image_url = page
        .has_image()
        .then(|| resolve_image_url(&ctx.api_base_url, &page.image_ref));

    NormalizedPageData {
        metadata: synthesize_metadata(raw.get("metadata"), page.page_number, ctx, ResultSource::Direct, now),
        id,
        page_number: page.page_number,
        data,
        filename: page.file_name.clone(),
        document_type: ctx.document_type,
        image_url,
        remark: raw.get("remark").and_then(JsonValue::as_str).map(str::to_string),
        created_at: now,
        updated_at: now,
        json_url,
        export_url,
    }
}

/// 会话模式：合并 `pages_info` 与 `documents`；拿不到文档 ID 时返回 None
pub fn normalize_session(
    page_number: u32,
    document: Option<&SessionDocument>,
    info: Option<&RemotePageInfo>,
    ctx: &NormalizeCtx,
    now: DateTime<Utc>,
) -> Option<NormalizedPageData> {
    let id = info
        .and_then(|i| i.document_id.clone())
        .or_else(|| document.and_then(|d| d.id.clone()))?;

    let (default_json_url, default_export_url) = document_urls(ctx, &id);
    let image_url = document
        .and_then(|d| d.image_url.as_deref())
        .or_else(|| info.and_then(|i| i.image_url.as_deref()))
        .map(|url| resolve_image_url(&ctx.api_base_url, url));

    Some(NormalizedPageData {
        page_number,
        data: document.map(|d| d.data.clone()).unwrap_or(JsonValue::Null),
        metadata: synthesize_metadata(
            document.and_then(|d| d.metadata.as_ref()),
            page_number,
            ctx,
            ResultSource::Session,
            now,
        ),
        filename: document
            .and_then(|d| d.filename.clone())
            .unwrap_or_else(|| ctx.original_file_name.clone()),
        document_type: ctx.document_type,
        image_url,
        remark: document.and_then(|d| d.remark.clone()),
        created_at: now,
        updated_at: now,
        json_url: document
            .and_then(|d| d.json_url.as_deref())
            .map(|u| resolve_image_url(&ctx.api_base_url, u))
            .unwrap_or(default_json_url),
        export_url: document
            .and_then(|d| d.excel_url.as_deref())
            .map(|u| resolve_image_url(&ctx.api_base_url, u))
            .unwrap_or(default_export_url),
        id,
    })
}
