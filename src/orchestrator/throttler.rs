//! 直连模式的并发节流 - 编排层
//!
//! ## 核心流程
//!
//! 1. 按总页数选定每批大小（页数越多每批越小）
//! 2. 每批内全部并发提交，等待全部落定后再开始下一批
//! 3. 批次之间短暂停顿；批次级异常后退避更久，但始终继续下一批
//! 4. 只提交 Pending 页，缺图的页直接判错

use crate::clients::submit_with_timeout;
use crate::models::{ExtractionOutcome, PageStatus};
use crate::orchestrator::coordinator::{reject_missing_image, Coordinator};
use crate::services::normalize_direct;
use crate::utils::logging;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// 单页处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PageRun {
    Completed,
    Failed,
    /// 不是 Pending、批次已重置等情况
    Skipped,
}

/// 批次处理结果
#[derive(Debug, Default)]
pub(super) struct BatchResult {
    pub(super) success: usize,
    pub(super) failed: usize,
    pub(super) skipped: usize,
    /// 任务本身崩溃（panic）的页数
    pub(super) crashed: usize,
}

impl Coordinator {
    /// 按批处理给定页码，结束后检查是否全部落定
    pub(super) async fn run_direct(self, generation: u64, page_numbers: Vec<u32>) {
        let config = &self.inner.config;
        let (total_pages, batch_size, semaphore) = {
            let state = self.state();
            if state.generation != generation {
                return;
            }
            let Some(permits) = state.permits.clone() else {
                return;
            };
            (state.pages.len(), state.batch_size.max(1), permits)
        };
        let total_batches = page_numbers.len().div_ceil(batch_size);

        logging::log_direct_plan(page_numbers.len(), total_pages, batch_size, total_batches);

        for (batch_index, batch) in page_numbers.chunks(batch_size).enumerate() {
            if !self.is_current(generation) {
                return;
            }
            let batch_num = batch_index + 1;
            logging::log_batch_start(batch_num, total_batches, batch);

            let result = self.process_batch(generation, batch, semaphore.clone()).await;
            logging::log_batch_complete(batch_num, result.success, result.failed, batch.len());
            if result.skipped > 0 {
                debug!("第 {} 批跳过 {} 页（已不是待提交状态）", batch_num, result.skipped);
            }

            if result.crashed > 0 {
                error!(
                    "❌ 第 {} 批有 {} 个任务异常退出，退避 {:?} 后继续",
                    batch_num, result.crashed, config.batch_error_backoff
                );
                sleep(config.batch_error_backoff).await;
            } else if batch_num < total_batches {
                sleep(config.inter_batch_delay).await;
            }
        }

        self.complete_if_settled(generation);
    }

    /// 处理单个批次：全部并发，全部等待
    ///
    /// 配额在整个批次生命周期内共享，重试与正在进行的批次加起来也不会超过每批页数
    async fn process_batch(
        &self,
        generation: u64,
        batch: &[u32],
        semaphore: Arc<Semaphore>,
    ) -> BatchResult {
        let mut batch_handles = Vec::new();

        for &page_number in batch {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let coordinator = self.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                coordinator.process_page(generation, page_number).await
            });
            self.track(generation, handle.abort_handle());
            batch_handles.push((page_number, handle));
        }

        let mut result = BatchResult::default();
        for (page_number, handle) in batch_handles {
            match handle.await {
                Ok(PageRun::Completed) => result.success += 1,
                Ok(PageRun::Failed) => result.failed += 1,
                Ok(PageRun::Skipped) => result.skipped += 1,
                Err(e) if e.is_cancelled() => result.skipped += 1,
                Err(e) => {
                    error!("[页 {}] 任务执行失败: {}", page_number, e);
                    self.mark_crashed(generation, page_number, &e.to_string());
                    result.crashed += 1;
                }
            }
        }
        result
    }

    /// 提交一页：认领 → 调用 → 写回
    pub(super) async fn process_page(&self, generation: u64, page_number: u32) -> PageRun {
        let claimed = {
            let mut state = self.state();
            if state.generation != generation {
                return PageRun::Skipped;
            }
            let Some(ctx) = state.extraction_ctx.clone() else {
                return PageRun::Skipped;
            };
            let Some(page) = state.pages.get_mut(page_number) else {
                return PageRun::Skipped;
            };
            if page.status() != PageStatus::Pending {
                debug!("[页 {}] 状态为 {:?}，跳过重复提交", page_number, page.status());
                return PageRun::Skipped;
            }
            if reject_missing_image(page) {
                return PageRun::Failed;
            }
            page.mark_processing();
            (page.descriptor().clone(), ctx)
        };
        let (descriptor, ctx) = claimed;

        debug!("[页 {}] 📤 提交提取请求", page_number);
        let outcome = submit_with_timeout(
            self.inner.extractor.as_ref(),
            &descriptor,
            &ctx,
            self.inner.config.extraction_timeout,
        )
        .await;

        self.apply_outcome(generation, page_number, outcome)
    }

    fn apply_outcome(&self, generation: u64, page_number: u32, outcome: ExtractionOutcome) -> PageRun {
        let (run, completed) = {
            let mut guard = self.state();
            let state = &mut *guard;
            if state.generation != generation {
                debug!("[页 {}] 批次已重置，丢弃迟到的结果", page_number);
                return PageRun::Skipped;
            }
            let (Some(ctx), Some(page)) = (state.normalize_ctx.as_ref(), state.pages.get_mut(page_number))
            else {
                return PageRun::Skipped;
            };

            match outcome {
                ExtractionOutcome::Success(raw) => {
                    let data = normalize_direct(page.descriptor(), &raw, ctx, Utc::now());
                    page.mark_completed(data.clone());
                    let first = state.reported.insert(page_number);
                    (PageRun::Completed, first.then_some(data))
                }
                ExtractionOutcome::Failure(message) => {
                    warn!(
                        "[页 {}] ⚠️ 提取失败: {}",
                        page_number,
                        logging::truncate_text(&message, 200)
                    );
                    page.mark_error(message);
                    (PageRun::Failed, None)
                }
            }
        };

        if let Some(data) = completed {
            self.emit_page_complete(generation, vec![data]);
        }
        run
    }

    /// 任务 panic 时页面还停在 Processing，补记为 Error 以便重试
    fn mark_crashed(&self, generation: u64, page_number: u32, reason: &str) {
        let mut state = self.state();
        if state.generation != generation {
            return;
        }
        if let Some(page) = state.pages.get_mut(page_number) {
            if page.status() == PageStatus::Processing {
                page.mark_error(format!("处理任务异常退出: {}", reason));
            }
        }
    }
}
