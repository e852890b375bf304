use crate::error::ConfigError;
use std::time::Duration;
use tracing::warn;

/// 程序配置
///
/// 所有阈值都是针对当前后端经验调出来的，保持可配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 提取后端地址
    pub api_base_url: String,
    /// 单页提取请求的硬超时
    pub extraction_timeout: Duration,
    /// 按总页数决定每批并发数
    pub batch_size_policy: BatchSizePolicy,
    /// 批次之间的停顿
    pub inter_batch_delay: Duration,
    /// 批次级异常后的退避
    pub batch_error_backoff: Duration,
    // --- 会话轮询 ---
    pub poll_interval: Duration,
    /// 零完成零失败的最长等待
    pub no_progress_timeout: Duration,
    /// 没有任何页面在处理中的最长等待
    pub idle_timeout: Duration,
    /// 轮询总时长上限
    pub global_poll_timeout: Duration,
    /// 终止后触发完成回调前的宽限
    pub completion_grace: Duration,
    /// 持久化会话引用的有效期
    pub session_max_age: Duration,
    // --- 命令行宿主 ---
    pub session_file: String,
    pub manifest_path: String,
    pub output_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            extraction_timeout: Duration::from_secs(15 * 60),
            batch_size_policy: BatchSizePolicy::default(),
            inter_batch_delay: Duration::from_millis(500),
            batch_error_backoff: Duration::from_millis(2000),
            poll_interval: Duration::from_millis(3000),
            no_progress_timeout: Duration::from_secs(120),
            idle_timeout: Duration::from_secs(60),
            global_poll_timeout: Duration::from_secs(600),
            completion_grace: Duration::from_millis(1000),
            session_max_age: Duration::from_secs(60 * 60),
            session_file: ".batch_session.json".to_string(),
            manifest_path: "pages.toml".to_string(),
            output_file: "extracted_pages.jsonl".to_string(),
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        let batch_size_policy = match std::env::var("BATCH_SIZE_TIERS") {
            Ok(raw) => {
                let fallback = env_parse("BATCH_SIZE_FALLBACK", default.batch_size_policy.fallback);
                BatchSizePolicy::parse(&raw, fallback).unwrap_or_else(|e| {
                    warn!("⚠️ {}，使用默认分批策略", e);
                    default.batch_size_policy.clone()
                })
            }
            Err(_) => default.batch_size_policy.clone(),
        };

        Self {
            api_base_url: std::env::var("EXTRACT_API_BASE_URL").unwrap_or(default.api_base_url),
            extraction_timeout: env_secs("EXTRACTION_TIMEOUT_SECS", default.extraction_timeout),
            batch_size_policy,
            inter_batch_delay: env_millis("INTER_BATCH_DELAY_MS", default.inter_batch_delay),
            batch_error_backoff: env_millis("BATCH_ERROR_BACKOFF_MS", default.batch_error_backoff),
            poll_interval: env_millis("POLL_INTERVAL_MS", default.poll_interval),
            no_progress_timeout: env_secs("NO_PROGRESS_TIMEOUT_SECS", default.no_progress_timeout),
            idle_timeout: env_secs("IDLE_TIMEOUT_SECS", default.idle_timeout),
            global_poll_timeout: env_secs("GLOBAL_POLL_TIMEOUT_SECS", default.global_poll_timeout),
            completion_grace: env_millis("COMPLETION_GRACE_MS", default.completion_grace),
            session_max_age: env_secs("SESSION_MAX_AGE_SECS", default.session_max_age),
            session_file: std::env::var("SESSION_FILE").unwrap_or(default.session_file),
            manifest_path: std::env::var("PAGE_MANIFEST").unwrap_or(default.manifest_path),
            output_file: std::env::var("OUTPUT_FILE").unwrap_or(default.output_file),
            verbose_logging: env_parse("VERBOSE_LOGGING", default.verbose_logging),
        }
    }
}

fn env_parse<T: std::str::FromStr>(var_name: &str, default: T) -> T {
    std::env::var(var_name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_secs(var_name: &str, default: Duration) -> Duration {
    std::env::var(var_name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_millis(var_name: &str, default: Duration) -> Duration {
    std::env::var(var_name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

/// 分批档位：总页数不超过 `max_pages` 时每批 `batch_size` 页
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchSizeTier {
    pub max_pages: usize,
    pub batch_size: usize,
}

/// 按总页数收缩的分批策略（页数越多，每批越小）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchSizePolicy {
    /// 按 `max_pages` 升序排列
    pub tiers: Vec<BatchSizeTier>,
    pub fallback: usize,
}

impl Default for BatchSizePolicy {
    fn default() -> Self {
        Self {
            tiers: vec![
                BatchSizeTier { max_pages: 10, batch_size: 12 },
                BatchSizeTier { max_pages: 20, batch_size: 10 },
                BatchSizeTier { max_pages: 30, batch_size: 8 },
            ],
            fallback: 6,
        }
    }
}

impl BatchSizePolicy {
    /// 返回本次批处理每批同时在途的页数，至少为 1
    pub fn batch_size_for(&self, total_pages: usize) -> usize {
        self.tiers
            .iter()
            .find(|tier| total_pages <= tier.max_pages)
            .map(|tier| tier.batch_size)
            .unwrap_or(self.fallback)
            .max(1)
    }

    /// 解析 `10:12,20:10,30:8` 形式的档位表
    pub fn parse(raw: &str, fallback: usize) -> Result<Self, ConfigError> {
        let mut tiers = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let parsed = part.split_once(':').and_then(|(max, size)| {
                Some(BatchSizeTier {
                    max_pages: max.trim().parse().ok()?,
                    batch_size: size.trim().parse().ok()?,
                })
            });
            match parsed {
                Some(tier) => tiers.push(tier),
                None => {
                    return Err(ConfigError::EnvVarParseFailed {
                        var_name: "BATCH_SIZE_TIERS".to_string(),
                        value: raw.to_string(),
                        expected_type: "max_pages:batch_size 列表".to_string(),
                    })
                }
            }
        }
        tiers.sort_by_key(|tier| tier.max_pages);
        Ok(Self { tiers, fallback })
    }
}
