//! 会话轮询 - 编排层
//!
//! 固定间隔查询后端会话状态并合并进本地页面状态表，直到会话结束、
//! 会话不存在、后端不可达或判定为停滞。

use crate::error::StatusFetchError;
use crate::models::{BatchStatus, SessionStatus};
use crate::orchestrator::coordinator::{Coordinator, TerminationReason};
use crate::services::{reconcile, StalenessPolicy, StalenessTracker};
use chrono::Utc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// 轮询循环的下一步
enum Step {
    Continue,
    /// 结束；`grace` 为真时先等一个宽限期，让最后的结果落到 UI
    Stop { reason: TerminationReason, grace: bool },
}

impl Coordinator {
    /// `initial` 是模式选择时确认会话拿到的快照，直接作为第一次轮询结果
    pub(super) async fn run_poller(self, generation: u64, session_id: String, initial: BatchStatus) {
        let config = &self.inner.config;
        let mut tracker = StalenessTracker::new(StalenessPolicy::from(config), Instant::now());
        let mut fetched = Ok(initial);
        let mut polls: u32 = 0;

        let (reason, grace) = loop {
            polls += 1;
            let step = match fetched {
                Ok(status) => self.apply_snapshot(generation, &session_id, &status, &mut tracker),
                Err(e) => self.on_fetch_error(&session_id, e, &tracker),
            };

            match step {
                None => return,
                Some(Step::Stop { reason, grace }) => break (reason, grace),
                Some(Step::Continue) => {}
            }

            sleep(config.poll_interval).await;
            if !self.is_current(generation) {
                return;
            }
            fetched = self.inner.status_source.fetch_status(&session_id).await;
            if !self.is_current(generation) {
                return;
            }
        };

        info!(
            "[会话 {}] 轮询结束（共 {} 次，用时 {:?}）: {}",
            session_id,
            polls,
            tracker.elapsed(Instant::now()),
            reason
        );
        self.inner.sessions.clear();

        if grace {
            sleep(config.completion_grace).await;
        }
        self.fire_all_complete(generation, reason);
    }

    /// 合并一次快照；批次已被重置时返回 `None`
    fn apply_snapshot(
        &self,
        generation: u64,
        session_id: &str,
        status: &BatchStatus,
        tracker: &mut StalenessTracker,
    ) -> Option<Step> {
        let completed = {
            let mut guard = self.state();
            let state = &mut *guard;
            if state.generation != generation {
                return None;
            }
            let ctx = state.normalize_ctx.as_ref()?;
            let report = reconcile(&mut state.pages, status, ctx, Utc::now());
            if report.changed > 0 {
                debug!(
                    "[会话 {}] 快照合并: {} 处变化, 新完成 {} 页, 新失败 {} 页",
                    session_id,
                    report.changed,
                    report.newly_completed.len(),
                    report.newly_failed.len()
                );
            }
            report
                .newly_completed
                .into_iter()
                .filter(|data| state.reported.insert(data.page_number))
                .collect::<Vec<_>>()
        };
        self.emit_page_complete(generation, completed);

        if status.is_finished() {
            let reason = if status.status == SessionStatus::Failed {
                TerminationReason::SessionFailed
            } else {
                TerminationReason::SessionCompleted
            };
            return Some(Step::Stop { reason, grace: true });
        }

        if let Some(stall) = tracker.observe(status, Instant::now()) {
            warn!("[会话 {}] ⚠️ {}，强制结束", session_id, stall);
            return Some(Step::Stop {
                reason: TerminationReason::Stalled(stall),
                grace: true,
            });
        }

        debug!(
            "[会话 {}] 进度 {}/{}，在途 {:?}",
            session_id,
            status.finished_pages(),
            status.total_pages,
            status.in_flight_pages()
        );
        Some(Step::Continue)
    }

    fn on_fetch_error(
        &self,
        session_id: &str,
        error: StatusFetchError,
        tracker: &StalenessTracker,
    ) -> Option<Step> {
        match error {
            StatusFetchError::NotFound => {
                warn!("[会话 {}] ❌ 会话在服务端已不存在", session_id);
                Some(Step::Stop {
                    reason: TerminationReason::SessionNotFound,
                    grace: false,
                })
            }
            StatusFetchError::Unavailable(message) => {
                warn!("[会话 {}] ❌ 后端不可达: {}", session_id, message);
                Some(Step::Stop {
                    reason: TerminationReason::BackendUnavailable,
                    grace: true,
                })
            }
            other => {
                warn!("[会话 {}] ⚠️ 查询状态失败，继续轮询: {}", session_id, other);
                match tracker.check_deadline(Instant::now()) {
                    Some(stall) => Some(Step::Stop {
                        reason: TerminationReason::Stalled(stall),
                        grace: true,
                    }),
                    None => Some(Step::Continue),
                }
            }
        }
    }
}
