#![allow(dead_code)]

use async_trait::async_trait;
use page_batch_extract::clients::{BatchStatusSource, ExtractionClient};
use page_batch_extract::infrastructure::{InMemorySessionStore, PersistedSession};
use page_batch_extract::models::{BatchStatus, ExtractionContext, ExtractionOutcome};
use page_batch_extract::{
    BatchObserver, BatchSummary, Config, Coordinator, NormalizedPageData, PageDescriptor,
    StatusFetchError,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

pub fn test_config() -> Config {
    Config {
        api_base_url: "http://api.test".to_string(),
        ..Config::default()
    }
}

pub fn descriptor(page_number: u32) -> PageDescriptor {
    PageDescriptor {
        page_number,
        file_name: format!("scan_p{}.png", page_number),
        mime_type: "image/png".to_string(),
        image_ref: format!("https://cdn.test/scan_p{}.png", page_number),
        byte_size: 1024,
    }
}

pub fn descriptors(n: u32) -> Vec<PageDescriptor> {
    (1..=n).map(descriptor).collect()
}

pub fn status(value: serde_json::Value) -> BatchStatus {
    serde_json::from_value(value).unwrap()
}

// ========== 提取服务 ==========

#[derive(Debug, Clone)]
pub enum Behaviour {
    Succeed,
    Fail(String),
    /// 第一次失败，之后成功
    FailOnce(String),
    /// 永不返回
    Hang,
    /// 任务直接 panic
    Panic,
}

pub struct ScriptedExtractor {
    delay: Duration,
    behaviour: Mutex<HashMap<u32, Behaviour>>,
    calls: Mutex<Vec<(u32, Instant)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedExtractor {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            behaviour: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with(self, page_number: u32, behaviour: Behaviour) -> Self {
        self.behaviour.lock().unwrap().insert(page_number, behaviour);
        self
    }

    pub fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().iter().map(|(n, _)| *n).collect()
    }

    /// 某页第一次被提交的时刻
    pub fn first_call_at(&self, page_number: u32) -> Option<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(n, _)| *n == page_number)
            .map(|(_, at)| *at)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionClient for ScriptedExtractor {
    async fn submit(&self, page: &PageDescriptor, _ctx: &ExtractionContext) -> ExtractionOutcome {
        let page_number = page.page_number;
        self.calls.lock().unwrap().push((page_number, Instant::now()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let behaviour = {
            let mut table = self.behaviour.lock().unwrap();
            let current = table.get(&page_number).cloned().unwrap_or(Behaviour::Succeed);
            if let Behaviour::FailOnce(_) = current {
                table.insert(page_number, Behaviour::Succeed);
            }
            current
        };

        match behaviour {
            Behaviour::Hang => std::future::pending().await,
            Behaviour::Panic => panic!("extractor crashed on page {}", page_number),
            Behaviour::Fail(message) | Behaviour::FailOnce(message) => {
                tokio::time::sleep(self.delay).await;
                ExtractionOutcome::Failure(message)
            }
            Behaviour::Succeed => {
                tokio::time::sleep(self.delay).await;
                ExtractionOutcome::Success(json!({
                    "id": format!("doc-{}", page_number),
                    "data": {"page": page_number, "rows": []}
                }))
            }
        }
    }
}

// ========== 会话状态 ==========

type Script = Box<dyn Fn(usize) -> Result<BatchStatus, StatusFetchError> + Send + Sync>;

/// 第 n 次查询返回 `script(n)`
pub struct ScriptedStatus {
    script: Script,
    fetches: AtomicUsize,
}

impl ScriptedStatus {
    pub fn new(
        script: impl Fn(usize) -> Result<BatchStatus, StatusFetchError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            fetches: AtomicUsize::new(0),
        }
    }

    /// 从未被调用的状态源
    pub fn unused() -> Self {
        Self::new(|_| Err(StatusFetchError::NotFound))
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchStatusSource for ScriptedStatus {
    async fn fetch_status(&self, _session_id: &str) -> Result<BatchStatus, StatusFetchError> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst);
        (self.script)(n)
    }
}

// ========== 回调 ==========

#[derive(Default)]
pub struct RecordingObserver {
    pages: Mutex<Vec<(u32, NormalizedPageData)>>,
    /// 完成汇总，以及触发时已收到的单页回调数
    completions: Mutex<Vec<(BatchSummary, usize)>>,
    notify: Notify,
}

impl RecordingObserver {
    pub fn page_calls(&self) -> Vec<u32> {
        self.pages.lock().unwrap().iter().map(|(n, _)| *n).collect()
    }

    pub fn page_data(&self, page_number: u32) -> Option<NormalizedPageData> {
        self.pages
            .lock()
            .unwrap()
            .iter()
            .find(|(n, _)| *n == page_number)
            .map(|(_, d)| d.clone())
    }

    pub fn completion_count(&self) -> usize {
        self.completions.lock().unwrap().len()
    }

    /// 完成回调触发时已经收到的单页回调数
    pub fn pages_before_completion(&self) -> Option<usize> {
        self.completions.lock().unwrap().first().map(|(_, n)| *n)
    }

    pub async fn wait_for_completion(&self) -> BatchSummary {
        loop {
            if let Some((summary, _)) = self.completions.lock().unwrap().first().cloned() {
                return summary;
            }
            self.notify.notified().await;
        }
    }

    pub async fn wait_for_page_calls(&self, count: usize) {
        loop {
            if self.pages.lock().unwrap().len() >= count {
                return;
            }
            self.notify.notified().await;
        }
    }
}

impl BatchObserver for RecordingObserver {
    fn on_page_complete(&self, page_number: u32, data: &NormalizedPageData) {
        self.pages.lock().unwrap().push((page_number, data.clone()));
        self.notify.notify_one();
    }

    fn on_all_complete(&self, summary: &BatchSummary) {
        let seen = self.pages.lock().unwrap().len();
        self.completions.lock().unwrap().push((summary.clone(), seen));
        self.notify.notify_one();
    }
}

// ========== 装配 ==========

pub struct Harness {
    pub coordinator: Coordinator,
    pub extractor: Arc<ScriptedExtractor>,
    pub status: Arc<ScriptedStatus>,
    pub sessions: Arc<InMemorySessionStore>,
    pub observer: Arc<RecordingObserver>,
}

impl Harness {
    pub fn new(
        config: Config,
        extractor: ScriptedExtractor,
        status: ScriptedStatus,
        sessions: InMemorySessionStore,
    ) -> Self {
        let extractor = Arc::new(extractor);
        let status = Arc::new(status);
        let sessions = Arc::new(sessions);
        let observer = Arc::new(RecordingObserver::default());
        let coordinator = Coordinator::new(
            config,
            extractor.clone(),
            status.clone(),
            sessions.clone(),
            observer.clone(),
        );
        Self {
            coordinator,
            extractor,
            status,
            sessions,
            observer,
        }
    }

    /// 直连模式：没有持久化会话
    pub fn direct(extractor: ScriptedExtractor) -> Self {
        Self::new(
            test_config(),
            extractor,
            ScriptedStatus::unused(),
            InMemorySessionStore::new(),
        )
    }

    /// 会话模式：持久化了一个刚创建的会话
    pub fn polled(status: ScriptedStatus) -> Self {
        Self::new(
            test_config(),
            ScriptedExtractor::new(Duration::from_secs(1)),
            status,
            InMemorySessionStore::with_session(PersistedSession::now("sess-42")),
        )
    }

    /// 等待完成信号，虚拟时间下最多一小时
    pub async fn finish(&self) -> BatchSummary {
        tokio::time::timeout(Duration::from_secs(3600), self.observer.wait_for_completion())
            .await
            .expect("batch never signalled completion")
    }
}
