//! 批处理协调器 - 编排层
//!
//! ## 职责
//!
//! 一批页面从开始到唯一一次"全部完成"信号的整个生命周期。
//!
//! 1. **模式选择**：持久化的会话引用未过期且服务端确认存在 → 会话轮询模式，否则直连模式
//! 2. **状态持有**：页面状态表只在这里被修改
//! 3. **回调**：每页最多一次 `on_page_complete`，每个生命周期恰好一次 `on_all_complete`
//! 4. **重试 / 重置**：重试只在直连模式生效；重置取消所有后台任务
//!
//! ## 代际令牌
//!
//! 每次 `reset()` 代际加一。所有异步延续在修改状态或触发回调前都要比对代际，
//! 旧批次迟到的响应因此被丢弃。

use crate::clients::{BatchStatusSource, ExtractionClient};
use crate::config::Config;
use crate::infrastructure::{PersistedSession, SessionStore};
use crate::models::{
    BatchStatus, DocumentType, ExtractionContext, NormalizedPageData, PageDescriptor, PageState,
    PageStatus,
};
use crate::services::{NormalizeCtx, PageCounts, PageStore, StallReason};
use crate::utils::logging;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// 宿主 UI 的回调边界
///
/// 回调在不持有任何内部锁的情况下调用
pub trait BatchObserver: Send + Sync {
    /// 某页首次成功完成
    fn on_page_complete(&self, page_number: u32, data: &NormalizedPageData);
    /// 本批次结束（正常或异常），每个生命周期恰好一次
    fn on_all_complete(&self, summary: &BatchSummary);
}

/// 协调模式，批次开始时选定一次
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 逐页直接调用提取服务
    Direct,
    /// 轮询后端批处理会话
    Polled,
}

/// 批次生命周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    #[default]
    Idle,
    /// 正在选择模式（可能在确认会话）
    Initializing,
    Running,
    Finished,
}

/// 批次结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// 所有页都到达终态
    AllPagesTerminal,
    SessionCompleted,
    SessionFailed,
    /// 会话在服务端已不存在 (404)
    SessionNotFound,
    /// 后端网络不可达
    BackendUnavailable,
    Stalled(StallReason),
}

impl TerminationReason {
    pub fn is_abnormal(self) -> bool {
        matches!(
            self,
            TerminationReason::SessionNotFound
                | TerminationReason::BackendUnavailable
                | TerminationReason::Stalled(_)
        )
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::AllPagesTerminal => write!(f, "所有页面已处理完毕"),
            TerminationReason::SessionCompleted => write!(f, "会话已完成"),
            TerminationReason::SessionFailed => write!(f, "会话失败"),
            TerminationReason::SessionNotFound => write!(f, "会话不存在"),
            TerminationReason::BackendUnavailable => write!(f, "后端不可用"),
            TerminationReason::Stalled(reason) => write!(f, "会话停滞: {}", reason),
        }
    }
}

/// `on_all_complete` 携带的汇总
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub mode: Option<Mode>,
    pub session_id: Option<String>,
    pub counts: PageCounts,
    pub reason: TerminationReason,
    pub elapsed: Duration,
}

/// `start` 的结果；宿主重复调用不会报错
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started(Mode),
    /// 已有批次在运行，本次调用被忽略
    AlreadyStarted,
    /// 初始化期间被 `reset()` 取消
    Cancelled,
}

/// 一个批次生命周期内的运行状态
#[derive(Default)]
pub(super) struct RunState {
    pub(super) generation: u64,
    pub(super) phase: RunPhase,
    pub(super) mode: Option<Mode>,
    pub(super) session_id: Option<String>,
    pub(super) normalize_ctx: Option<NormalizeCtx>,
    pub(super) extraction_ctx: Option<ExtractionContext>,
    pub(super) started_at: Option<Instant>,
    pub(super) completion_fired: bool,
    pub(super) pages: PageStore,
    /// 直连模式每批页数，按批次总页数选定
    pub(super) batch_size: usize,
    /// 直连模式的在途配额，本批次所有提交（含重试）共用
    pub(super) permits: Option<Arc<Semaphore>>,
    /// 已触发过 `on_page_complete` 的页
    pub(super) reported: HashSet<u32>,
    pub(super) tasks: Vec<AbortHandle>,
}

impl RunState {
    fn summary(&self, reason: TerminationReason) -> BatchSummary {
        BatchSummary {
            mode: self.mode,
            session_id: self.session_id.clone(),
            counts: self.pages.counts(),
            reason,
            elapsed: self
                .started_at
                .map(|t| t.elapsed())
                .unwrap_or_default(),
        }
    }
}

pub(super) struct Inner {
    pub(super) config: Config,
    pub(super) extractor: Arc<dyn ExtractionClient>,
    pub(super) status_source: Arc<dyn BatchStatusSource>,
    pub(super) sessions: Arc<dyn SessionStore>,
    pub(super) observer: Arc<dyn BatchObserver>,
    state: Mutex<RunState>,
}

/// 页面批量提取协调器
///
/// 克隆代价很低，所有克隆共享同一份状态
#[derive(Clone)]
pub struct Coordinator {
    pub(super) inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(
        config: Config,
        extractor: Arc<dyn ExtractionClient>,
        status_source: Arc<dyn BatchStatusSource>,
        sessions: Arc<dyn SessionStore>,
        observer: Arc<dyn BatchObserver>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                extractor,
                status_source,
                sessions,
                observer,
                state: Mutex::new(RunState::default()),
            }),
        }
    }

    pub(super) fn state(&self) -> MutexGuard<'_, RunState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(super) fn is_current(&self, generation: u64) -> bool {
        self.state().generation == generation
    }

    /// 登记后台任务，`reset()` 时统一取消
    pub(super) fn track(&self, generation: u64, handle: AbortHandle) {
        let mut state = self.state();
        if state.generation != generation {
            handle.abort();
            return;
        }
        state.tasks.retain(|h| !h.is_finished());
        state.tasks.push(handle);
    }

    // ========== 宿主接口 ==========

    /// 开始一个批次
    ///
    /// 已经在运行时直接返回 `AlreadyStarted`，容忍宿主重复触发
    pub async fn start(
        &self,
        pages: Vec<PageDescriptor>,
        document_type: DocumentType,
        original_file_name: impl Into<String>,
    ) -> StartOutcome {
        self.begin(pages, document_type, original_file_name.into(), None)
            .await
    }

    /// 持久化刚由上传创建的后端会话，然后开始
    ///
    /// 只有真正开始了新批次才会写入会话引用
    pub async fn start_with_session(
        &self,
        pages: Vec<PageDescriptor>,
        document_type: DocumentType,
        original_file_name: impl Into<String>,
        session_id: impl Into<String>,
    ) -> StartOutcome {
        let session = PersistedSession::now(session_id);
        self.begin(pages, document_type, original_file_name.into(), Some(session))
            .await
    }

    async fn begin(
        &self,
        pages: Vec<PageDescriptor>,
        document_type: DocumentType,
        original_file_name: String,
        session: Option<PersistedSession>,
    ) -> StartOutcome {
        let generation = {
            let mut state = self.state();
            if state.phase != RunPhase::Idle {
                debug!("批次已在运行，忽略重复的 start 调用");
                return StartOutcome::AlreadyStarted;
            }
            state.phase = RunPhase::Initializing;
            state.pages = PageStore::seed(pages);
            state.normalize_ctx = Some(NormalizeCtx {
                document_type,
                original_file_name: original_file_name.clone(),
                api_base_url: self.inner.config.api_base_url.clone(),
            });
            state.extraction_ctx = Some(ExtractionContext {
                document_type,
                original_file_name: original_file_name.clone(),
            });
            state.started_at = Some(Instant::now());
            state.generation
        };

        // 阶段已被占用，之后并发的 start 都会返回 AlreadyStarted
        if let Some(session) = session {
            if let Err(e) = self.inner.sessions.save(&session) {
                warn!("⚠️ 无法保存会话引用 {}: {}", session.session_id, e);
            }
        }

        logging::log_batch_created(&original_file_name, document_type, self.state().pages.len());

        let verified = self.verify_persisted_session().await;

        let mut state = self.state();
        if state.generation != generation {
            info!("初始化期间批次已被重置");
            return StartOutcome::Cancelled;
        }
        state.phase = RunPhase::Running;

        match verified {
            Some((session_id, initial)) => {
                state.mode = Some(Mode::Polled);
                state.session_id = Some(session_id.clone());
                let added = state.pages.fill_to(initial.total_pages);
                if added > 0 {
                    debug!("[会话 {}] 按会话总页数补齐 {} 页", session_id, added);
                }
                drop(state);

                info!("[会话 {}] 🔗 会话有效，进入轮询模式", session_id);
                let handle = tokio::spawn(self.clone().run_poller(generation, session_id, initial));
                self.track(generation, handle.abort_handle());
                StartOutcome::Started(Mode::Polled)
            }
            None => {
                state.mode = Some(Mode::Direct);
                state.batch_size = self
                    .inner
                    .config
                    .batch_size_policy
                    .batch_size_for(state.pages.len());
                state.permits = Some(Arc::new(Semaphore::new(state.batch_size)));
                for page in state.pages.iter_mut() {
                    reject_missing_image(page);
                }
                let pending = state.pages.page_numbers_with(PageStatus::Pending);
                let settled = state.pages.all_terminal();
                drop(state);

                info!("📤 进入直连模式，待提交 {} 页", pending.len());
                if settled {
                    // 空批次或全部页面在提交前就已判错
                    self.complete_if_settled(generation);
                } else {
                    let handle = tokio::spawn(self.clone().run_direct(generation, pending));
                    self.track(generation, handle.abort_handle());
                }
                StartOutcome::Started(Mode::Direct)
            }
        }
    }

    /// 把所有 Error 页重置为 Pending 并重新提交，返回被重试的页码
    ///
    /// 会话模式下重试由服务端负责，这里不做任何事
    pub fn retry_failed(&self) -> Vec<u32> {
        let (generation, failed) = {
            let mut state = self.state();
            match state.mode {
                Some(Mode::Direct) => {}
                Some(Mode::Polled) => {
                    info!("会话模式下重试由服务端负责，忽略");
                    return Vec::new();
                }
                None => return Vec::new(),
            }
            let failed = state.pages.page_numbers_with(PageStatus::Error);
            for page_number in &failed {
                if let Some(page) = state.pages.get_mut(*page_number) {
                    page.reset_for_retry();
                }
            }
            (state.generation, failed)
        };

        if failed.is_empty() {
            return failed;
        }
        info!("🔁 重试 {} 个失败页面: {:?}", failed.len(), failed);
        let handle = tokio::spawn(self.clone().run_direct(generation, failed.clone()));
        self.track(generation, handle.abort_handle());
        failed
    }

    /// 取消所有后台任务，清空会话引用和页面状态，任何时刻都可以调用
    pub fn reset(&self) {
        let tasks = {
            let mut state = self.state();
            let generation = state.generation + 1;
            let previous = std::mem::take(&mut *state);
            state.generation = generation;
            if let Some(permits) = &previous.permits {
                permits.close();
            }
            previous.tasks
        };
        for task in tasks {
            task.abort();
        }
        self.inner.sessions.clear();
        info!("🧹 批处理已重置");
    }

    // ========== 只读快照 ==========

    pub fn pages(&self) -> Vec<PageState> {
        self.state().pages.snapshot()
    }

    pub fn page(&self, page_number: u32) -> Option<PageState> {
        self.state().pages.get(page_number).cloned()
    }

    /// 各状态页数汇总
    pub fn summary(&self) -> PageCounts {
        self.state().pages.counts()
    }

    pub fn mode(&self) -> Option<Mode> {
        self.state().mode
    }

    pub fn phase(&self) -> RunPhase {
        self.state().phase
    }

    pub fn session_id(&self) -> Option<String> {
        self.state().session_id.clone()
    }

    /// `on_all_complete` 是否已经触发
    pub fn is_finished(&self) -> bool {
        self.state().completion_fired
    }

    // ========== 内部 ==========

    async fn verify_persisted_session(&self) -> Option<(String, BatchStatus)> {
        let persisted = self.inner.sessions.load()?;
        if persisted.is_expired(self.inner.config.session_max_age, Utc::now()) {
            info!("[会话 {}] 会话引用已过期，丢弃", persisted.session_id);
            self.inner.sessions.clear();
            return None;
        }

        match self.inner.status_source.fetch_status(&persisted.session_id).await {
            Ok(status) => Some((persisted.session_id, status)),
            Err(e) => {
                warn!("[会话 {}] ⚠️ 无法确认会话: {}，改用直连模式", persisted.session_id, e);
                self.inner.sessions.clear();
                None
            }
        }
    }

    pub(super) fn emit_page_complete(&self, generation: u64, completed: Vec<NormalizedPageData>) {
        for data in completed {
            if !self.is_current(generation) {
                return;
            }
            info!("[页 {}] ✅ 提取完成 (文档 {})", data.page_number, data.id);
            self.inner.observer.on_page_complete(data.page_number, &data);
        }
    }

    /// 所有页都到终态时触发完成信号
    pub(super) fn complete_if_settled(&self, generation: u64) {
        let settled = {
            let state = self.state();
            state.generation == generation && state.pages.all_terminal()
        };
        if settled {
            self.fire_all_complete(generation, TerminationReason::AllPagesTerminal);
        }
    }

    /// 单次触发；代际不符或已触发过则什么也不做
    pub(super) fn fire_all_complete(&self, generation: u64, reason: TerminationReason) -> bool {
        let summary = {
            let mut state = self.state();
            if state.generation != generation || state.completion_fired {
                return false;
            }
            state.completion_fired = true;
            state.phase = RunPhase::Finished;
            state.tasks.retain(|h| !h.is_finished());
            state.summary(reason)
        };

        logging::print_final_stats(&summary);
        self.inner.observer.on_all_complete(&summary);
        true
    }
}

pub(super) const MISSING_IMAGE: &str = "页面图片引用为空，无法提交（上游拆页顺序异常）";

/// 缺图的页直接判错，不发请求
pub(super) fn reject_missing_image(page: &mut PageState) -> bool {
    if page.status() == PageStatus::Pending && !page.descriptor().has_image() {
        warn!("[页 {}] ❌ {}", page.page_number(), MISSING_IMAGE);
        page.mark_error(MISSING_IMAGE);
        return true;
    }
    false
}
