use chrono::{DateTime, Utc};
use phf::phf_map;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 工厂单据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    /// 生产报废单
    Rebut,
    /// 停机时间单
    #[serde(rename = "NPT")]
    Npt,
    /// 班组效率单
    Kosu,
}

static DOCUMENT_TYPE_ALIASES: phf::Map<&'static str, DocumentType> = phf_map! {
    "rebut" => DocumentType::Rebut,
    "rebuts" => DocumentType::Rebut,
    "reject" => DocumentType::Rebut,
    "npt" => DocumentType::Npt,
    "downtime" => DocumentType::Npt,
    "kosu" => DocumentType::Kosu,
    "productivity" => DocumentType::Kosu,
};

impl DocumentType {
    /// 后端约定的名称
    pub fn name(self) -> &'static str {
        match self {
            DocumentType::Rebut => "Rebut",
            DocumentType::Npt => "NPT",
            DocumentType::Kosu => "Kosu",
        }
    }

    /// 不区分大小写地解析，支持常见别名
    pub fn find(s: &str) -> Option<Self> {
        DOCUMENT_TYPE_ALIASES
            .get(s.trim().to_lowercase().as_str())
            .copied()
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 提取请求携带的文档上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionContext {
    pub document_type: DocumentType,
    pub original_file_name: String,
}

/// 单页提取结果；客户端从不向外抛错
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Success(JsonValue),
    Failure(String),
}

impl ExtractionOutcome {
    pub const TIMEOUT: &'static str = "timeout";

    pub fn timeout() -> Self {
        ExtractionOutcome::Failure(Self::TIMEOUT.to_string())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionOutcome::Success(_))
    }
}

/// 交给宿主的单页结果，两种模式下字段形状一致
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPageData {
    pub id: String,
    pub page_number: u32,
    pub data: JsonValue,
    pub metadata: JsonValue,
    pub filename: String,
    pub document_type: DocumentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub json_url: String,
    pub export_url: String,
}
