//! 页面状态表 - 业务能力层
//!
//! 页码集合在批处理开始时确定，之后不再增删

use crate::models::{PageDescriptor, PageState, PageStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

/// 各状态页数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageCounts {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub error: usize,
}

impl PageCounts {
    pub fn terminal(&self) -> usize {
        self.completed + self.error
    }
}

/// 页码 → 页面状态
#[derive(Debug, Default)]
pub struct PageStore {
    pages: BTreeMap<u32, PageState>,
}

impl PageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按描述列表建表，全部为 Pending；重复页码只保留第一个
    pub fn seed(descriptors: impl IntoIterator<Item = PageDescriptor>) -> Self {
        let mut pages = BTreeMap::new();
        for descriptor in descriptors {
            let page_number = descriptor.page_number;
            if pages.contains_key(&page_number) {
                warn!("⚠️ 重复的页码 {}，忽略后出现的 {}", page_number, descriptor.file_name);
                continue;
            }
            pages.insert(page_number, PageState::new(descriptor));
        }
        Self { pages }
    }

    /// 补齐 `1..=total` 中缺失的页，仅在建表阶段调用
    pub fn fill_to(&mut self, total: u32) -> usize {
        let mut added = 0;
        for page_number in 1..=total {
            self.pages.entry(page_number).or_insert_with(|| {
                added += 1;
                PageState::new(PageDescriptor::placeholder(page_number))
            });
        }
        added
    }

    pub fn get(&self, page_number: u32) -> Option<&PageState> {
        self.pages.get(&page_number)
    }

    pub fn get_mut(&mut self, page_number: u32) -> Option<&mut PageState> {
        self.pages.get_mut(&page_number)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageState> {
        self.pages.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PageState> {
        self.pages.values_mut()
    }

    /// 处于指定状态的页码，升序
    pub fn page_numbers_with(&self, status: PageStatus) -> Vec<u32> {
        self.pages
            .values()
            .filter(|p| p.status() == status)
            .map(PageState::page_number)
            .collect()
    }

    /// 空表也视为全部终态
    pub fn all_terminal(&self) -> bool {
        self.pages.values().all(|p| p.status().is_terminal())
    }

    pub fn counts(&self) -> PageCounts {
        let mut counts = PageCounts {
            total: self.pages.len(),
            ..Default::default()
        };
        for page in self.pages.values() {
            match page.status() {
                PageStatus::Pending => counts.pending += 1,
                PageStatus::Processing => counts.processing += 1,
                PageStatus::Completed => counts.completed += 1,
                PageStatus::Error => counts.error += 1,
            }
        }
        counts
    }

    pub fn snapshot(&self) -> Vec<PageState> {
        self.pages.values().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }
}
