//! `GET /batch-status/{sessionId}` 的响应结构
//!
//! 后端字段时有缺失，全部按可选处理

use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};

/// 会话整体状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Processing,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

/// 远端报告的单页状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemotePageStatus {
    #[serde(alias = "queued", alias = "waiting")]
    Pending,
    Processing,
    #[serde(alias = "success", alias = "done")]
    Completed,
    #[serde(alias = "failed", alias = "error")]
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemotePageInfo {
    pub status: Option<RemotePageStatus>,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub document_id: Option<String>,
    pub error: Option<String>,
    pub image_url: Option<String>,
}

/// 已落库的提取记录
#[derive(Debug, Clone, Deserialize)]
pub struct SessionDocument {
    pub page: u32,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub data: JsonValue,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
    #[serde(default, rename = "imageUrl", alias = "image_url")]
    pub image_url: Option<String>,
    pub filename: Option<String>,
    pub remark: Option<String>,
    pub json_url: Option<String>,
    pub excel_url: Option<String>,
}

/// 批处理会话快照
#[derive(Debug, Clone, Deserialize)]
pub struct BatchStatus {
    pub status: SessionStatus,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub completed_pages: u32,
    #[serde(default)]
    pub failed_pages: u32,
    #[serde(default)]
    pub processing_pages: Vec<u32>,
    /// 旧版后端只报告一个正在处理的页
    #[serde(default)]
    pub processing_page: Option<u32>,
    #[serde(default)]
    pub pages_info: BTreeMap<u32, RemotePageInfo>,
    #[serde(default)]
    pub documents: Vec<SessionDocument>,
}

impl BatchStatus {
    /// 当前在途页集合（合并新旧两种字段）
    pub fn in_flight_pages(&self) -> BTreeSet<u32> {
        let mut pages: BTreeSet<u32> = self.processing_pages.iter().copied().collect();
        if let Some(page) = self.processing_page {
            pages.insert(page);
        }
        pages
    }

    pub fn finished_pages(&self) -> u32 {
        self.completed_pages.saturating_add(self.failed_pages)
    }

    /// 会话是否已到终态（状态为终态，或完成数加失败数达到总数）
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal() || (self.total_pages > 0 && self.finished_pages() >= self.total_pages)
    }

    pub fn document_for_page(&self, page_number: u32) -> Option<&SessionDocument> {
        self.documents.iter().find(|doc| doc.page == page_number)
    }
}

// 文档 ID 可能是字符串也可能是数字
fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        Some(JsonValue::String(s)) if !s.is_empty() => Some(s),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_full_status_payload() {
        let raw = json!({
            "status": "processing",
            "total_pages": 3,
            "completed_pages": 1,
            "failed_pages": 0,
            "processing_pages": [2],
            "pages_info": {
                "1": {"status": "completed", "document_id": 42, "image_url": "/uploads/p1.png"},
                "3": {"status": "queued"}
            },
            "documents": [
                {"page": 1, "id": 42, "data": {"rows": []}, "imageUrl": "/uploads/p1.png", "filename": "scan.pdf"}
            ]
        });

        let status: BatchStatus = serde_json::from_value(raw).unwrap();
        assert_eq!(status.status, SessionStatus::Processing);
        assert_eq!(status.pages_info[&1].document_id.as_deref(), Some("42"));
        assert_eq!(status.pages_info[&3].status, Some(RemotePageStatus::Pending));
        assert_eq!(status.document_for_page(1).and_then(|d| d.id.as_deref()), Some("42"));
        assert!(!status.is_finished());
    }

    #[test]
    fn legacy_single_processing_page_is_merged() {
        let status: BatchStatus = serde_json::from_value(json!({
            "status": "processing",
            "total_pages": 4,
            "processing_page": 3
        }))
        .unwrap();
        assert_eq!(status.in_flight_pages().into_iter().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn counts_reaching_total_finish_the_session() {
        let status: BatchStatus = serde_json::from_value(json!({
            "status": "processing",
            "total_pages": 2,
            "completed_pages": 1,
            "failed_pages": 1
        }))
        .unwrap();
        assert!(status.is_finished());

        let unknown: BatchStatus = serde_json::from_value(json!({"status": "paused"})).unwrap();
        assert_eq!(unknown.status, SessionStatus::Unknown);
        assert!(!unknown.is_finished());
    }
}
