//! 结果写入服务 - 业务能力层
//!
//! 只负责"把一页的结果追加到 JSON Lines 文件"能力，不关心流程

use crate::error::{AppError, AppResult};
use crate::models::NormalizedPageData;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

/// 结果写入服务
///
/// 每页一行 JSON，追加写入；回调是同步的，所以这里用阻塞 IO
pub struct ResultWriter {
    output_path: PathBuf,
}

impl ResultWriter {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: path.into(),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.output_path
    }

    /// 清空输出文件，开始新的一批
    pub fn truncate(&self) -> AppResult<()> {
        std::fs::write(&self.output_path, b"")
            .map_err(|e| AppError::output_failed(self.output_path.display().to_string(), e))
    }

    /// 追加一页结果
    pub fn append(&self, data: &NormalizedPageData) -> AppResult<()> {
        debug!("[页 {}] 写入结果 {}", data.page_number, self.output_path.display());

        let mut line = serde_json::to_string(data)
            .map_err(|e| AppError::output_failed(self.output_path.display().to_string(), e.into()))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output_path)
            .map_err(|e| AppError::output_failed(self.output_path.display().to_string(), e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| AppError::output_failed(self.output_path.display().to_string(), e))?;

        Ok(())
    }
}
