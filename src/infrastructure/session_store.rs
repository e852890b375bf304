//! 会话引用持久化 - 基础设施层
//!
//! 只保存 `{sessionId, timestamp}`，协调器据此决定是否恢复轮询

use crate::error::{AppError, AppResult, SessionError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// 持久化的会话引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

impl PersistedSession {
    pub fn now(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp: Utc::now(),
        }
    }

    /// 超过 `max_age` 的引用不可信
    pub fn is_expired(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.timestamp);
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => age >= max_age,
            Err(_) => false,
        }
    }
}

/// 会话引用存储
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Option<PersistedSession>;
    fn save(&self, session: &PersistedSession) -> AppResult<()>;
    fn clear(&self);
}

/// 内存存储，用于嵌入宿主和测试
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    slot: Mutex<Option<PersistedSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: PersistedSession) -> Self {
        Self {
            slot: Mutex::new(Some(session)),
        }
    }
}

impl SessionStore for InMemorySessionStore {
    fn load(&self) -> Option<PersistedSession> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn save(&self, session: &PersistedSession) -> AppResult<()> {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(session.clone());
        Ok(())
    }

    fn clear(&self) {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

/// JSON 文件存储，命令行宿主使用
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Option<PersistedSession> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("⚠️ 会话文件损坏，忽略 ({}): {}", self.path.display(), e);
                None
            }
        }
    }

    fn save(&self, session: &PersistedSession) -> AppResult<()> {
        let json = serde_json::to_string_pretty(session).map_err(SessionError::from)?;
        std::fs::write(&self.path, json)
            .map_err(|e| AppError::session_persist_failed(self.path.display().to_string(), e))?;
        debug!("会话引用已保存: {}", session.session_id);
        Ok(())
    }

    fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("会话引用已清除"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("⚠️ 无法删除会话文件 {}: {}", self.path.display(), e),
        }
    }
}
