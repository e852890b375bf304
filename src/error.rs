use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// API 调用错误
    #[error("API错误: {0}")]
    Api(#[from] ApiError),
    /// 批处理会话错误
    #[error("会话错误: {0}")]
    Session(#[from] SessionError),
    /// 页面清单错误
    #[error("清单错误: {0}")]
    Manifest(#[from] ManifestError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 结果文件写入失败
    #[error("写入结果失败 ({path}): {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// API 调用错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 网络请求失败
    #[error("API请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// API 返回非 2xx 状态码
    #[error("API返回错误状态 ({endpoint}): HTTP {status}")]
    BadStatus { endpoint: String, status: u16 },
    /// 响应体无法解析
    #[error("响应解析失败 ({endpoint}): {message}")]
    MalformedBody { endpoint: String, message: String },
}

/// 批处理会话错误
#[derive(Debug, Error)]
pub enum SessionError {
    /// 会话引用持久化失败
    #[error("会话持久化失败 ({path}): {source}")]
    PersistFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 会话引用序列化失败
    #[error("会话序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 页面清单错误
#[derive(Debug, Error)]
pub enum ManifestError {
    /// 读取文件失败
    #[error("读取清单失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("清单解析失败 ({path}): {source}")]
    ParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 文档类型无法识别
    #[error("无法识别的文档类型: {0}")]
    UnknownDocumentType(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

/// 单次批处理状态查询失败的原因
///
/// 轮询器根据不同原因决定终止还是继续
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusFetchError {
    /// HTTP 404：会话在服务端已不存在
    #[error("会话不存在 (HTTP 404)")]
    NotFound,
    /// 网络层失败（连接被拒、DNS 等）
    #[error("后端不可达: {0}")]
    Unavailable(String),
    /// 其他非 2xx 状态码
    #[error("状态查询返回 HTTP {0}")]
    BadStatus(u16),
    /// 响应体不是合法的批处理状态
    #[error("状态响应解析失败: {0}")]
    Malformed(String),
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建API请求失败错误
    pub fn api_request_failed(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        AppError::Api(ApiError::RequestFailed {
            endpoint: endpoint.into(),
            source,
        })
    }

    /// 创建会话持久化错误
    pub fn session_persist_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::Session(SessionError::PersistFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建结果写入错误
    pub fn output_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::Output {
            path: path.into(),
            source,
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
