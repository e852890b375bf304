use crate::error::{AppResult, ManifestError};
use crate::models::document::DocumentType;
use crate::models::page::PageDescriptor;
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

/// 一次上传拆页后的清单
#[derive(Debug, Clone)]
pub struct PageManifest {
    pub document_type: DocumentType,
    pub original_file_name: String,
    /// 上传时后端已创建的会话
    pub session_id: Option<String>,
    pub pages: Vec<PageDescriptor>,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    document_type: String,
    original_file_name: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    pages: Vec<PageDescriptor>,
}

/// 解析 TOML 清单文本
pub fn parse_manifest(content: &str, origin: &str) -> AppResult<PageManifest> {
    let raw: RawManifest = toml::from_str(content).map_err(|source| ManifestError::ParseFailed {
        path: origin.to_string(),
        source,
    })?;

    let document_type = DocumentType::find(&raw.document_type)
        .ok_or_else(|| ManifestError::UnknownDocumentType(raw.document_type.clone()))?;

    let mut pages = raw.pages;
    pages.sort_by_key(|p| p.page_number);

    Ok(PageManifest {
        document_type,
        original_file_name: raw.original_file_name,
        session_id: raw.session_id.filter(|s| !s.trim().is_empty()),
        pages,
    })
}

/// 从 TOML 文件加载清单
pub async fn load_manifest(path: &Path) -> AppResult<PageManifest> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| ManifestError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;

    let manifest = parse_manifest(&content, &path.display().to_string())?;
    tracing::info!(
        "成功加载清单 {}: {} 页 ({})",
        path.display(),
        manifest.pages.len(),
        manifest.document_type
    );
    Ok(manifest)
}
