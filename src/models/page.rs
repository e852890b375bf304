use serde::{Deserialize, Serialize};

use crate::models::document::NormalizedPageData;

/// 上传后拆出的一页（输入，只读）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDescriptor {
    /// 页码，从 1 开始，同一批内唯一
    pub page_number: u32,
    pub file_name: String,
    pub mime_type: String,
    /// 页面图片引用：URL 或 `data:` URI
    #[serde(default)]
    pub image_ref: String,
    #[serde(default)]
    pub byte_size: u64,
}

impl PageDescriptor {
    /// 远端只知道页码时使用的占位描述
    pub fn placeholder(page_number: u32) -> Self {
        Self {
            page_number,
            file_name: format!("page_{}", page_number),
            mime_type: String::new(),
            image_ref: String::new(),
            byte_size: 0,
        }
    }

    pub fn has_image(&self) -> bool {
        !self.image_ref.trim().is_empty()
    }
}

/// 页面状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl PageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PageStatus::Completed | PageStatus::Error)
    }
}

/// 单页的可变状态，只由协调器持有
///
/// `extracted_data` 仅在 Completed 时存在，`error_message` 仅在 Error 时存在
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageState {
    descriptor: PageDescriptor,
    status: PageStatus,
    extracted_data: Option<NormalizedPageData>,
    error_message: Option<String>,
    retry_count: u32,
}

impl PageState {
    pub fn new(descriptor: PageDescriptor) -> Self {
        Self {
            descriptor,
            status: PageStatus::Pending,
            extracted_data: None,
            error_message: None,
            retry_count: 0,
        }
    }

    pub fn page_number(&self) -> u32 {
        self.descriptor.page_number
    }

    pub fn descriptor(&self) -> &PageDescriptor {
        &self.descriptor
    }

    pub fn status(&self) -> PageStatus {
        self.status
    }

    pub fn extracted_data(&self) -> Option<&NormalizedPageData> {
        self.extracted_data.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn image_ref(&self) -> &str {
        &self.descriptor.image_ref
    }

    pub fn mark_pending(&mut self) {
        self.status = PageStatus::Pending;
        self.extracted_data = None;
        self.error_message = None;
    }

    pub fn mark_processing(&mut self) {
        self.status = PageStatus::Processing;
        self.extracted_data = None;
        self.error_message = None;
    }

    pub fn mark_completed(&mut self, data: NormalizedPageData) {
        self.status = PageStatus::Completed;
        self.extracted_data = Some(data);
        self.error_message = None;
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = PageStatus::Error;
        self.extracted_data = None;
        self.error_message = Some(message.into());
    }

    /// Error → Pending，重试次数加一；其他状态不变，返回是否发生了重置
    pub fn reset_for_retry(&mut self) -> bool {
        if self.status != PageStatus::Error {
            return false;
        }
        self.status = PageStatus::Pending;
        self.error_message = None;
        self.retry_count += 1;
        true
    }

    /// 远端给出了解析后的图片地址时就地更新
    pub fn set_image_ref(&mut self, image_ref: impl Into<String>) {
        self.descriptor.image_ref = image_ref.into();
    }
}
