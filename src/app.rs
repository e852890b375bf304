use crate::clients::{HttpBatchStatusClient, HttpExtractionClient};
use crate::config::Config;
use crate::infrastructure::FileSessionStore;
use crate::models::{load_manifest, NormalizedPageData, PageManifest, PageStatus};
use crate::orchestrator::{BatchObserver, BatchSummary, Coordinator, StartOutcome};
use crate::services::ResultWriter;
use anyhow::{bail, Context, Result};
use futures::channel::oneshot;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

/// 单次状态查询的请求超时
const STATUS_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// 命令行宿主的回调：结果落盘，完成信号转成 oneshot
struct CliObserver {
    writer: ResultWriter,
    done: Mutex<Option<oneshot::Sender<BatchSummary>>>,
}

impl BatchObserver for CliObserver {
    fn on_page_complete(&self, page_number: u32, data: &NormalizedPageData) {
        if let Err(e) = self.writer.append(data) {
            error!("[页 {}] ❌ 结果写入失败: {}", page_number, e);
        }
    }

    fn on_all_complete(&self, summary: &BatchSummary) {
        let sender = self.done.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(sender) = sender {
            let _ = sender.send(summary.clone());
        }
    }
}

/// 应用主结构
pub struct App {
    config: Config,
    coordinator: Coordinator,
    done: oneshot::Receiver<BatchSummary>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let extractor = HttpExtractionClient::new(&config.api_base_url, config.extraction_timeout)
            .context("创建提取客户端失败")?;
        let status_source = HttpBatchStatusClient::new(&config.api_base_url, STATUS_REQUEST_TIMEOUT)
            .context("创建会话状态客户端失败")?;
        let sessions = FileSessionStore::new(&config.session_file);

        let writer = ResultWriter::with_path(&config.output_file);
        writer.truncate().context("无法初始化结果文件")?;

        let (sender, done) = oneshot::channel();
        let observer = CliObserver {
            writer,
            done: Mutex::new(Some(sender)),
        };

        let coordinator = Coordinator::new(
            config.clone(),
            Arc::new(extractor),
            Arc::new(status_source),
            Arc::new(sessions),
            Arc::new(observer),
        );

        Ok(Self {
            config,
            coordinator,
            done,
        })
    }

    /// 运行应用主逻辑：加载清单，跑完一批，输出统计
    pub async fn run(self) -> Result<BatchSummary> {
        let manifest = load_pages(&self.config).await?;
        if manifest.pages.is_empty() {
            warn!("⚠️ 清单中没有任何页面");
        }

        let outcome = match manifest.session_id {
            Some(session_id) => {
                self.coordinator
                    .start_with_session(
                        manifest.pages,
                        manifest.document_type,
                        manifest.original_file_name,
                        session_id,
                    )
                    .await
            }
            None => {
                self.coordinator
                    .start(manifest.pages, manifest.document_type, manifest.original_file_name)
                    .await
            }
        };

        match outcome {
            StartOutcome::Started(mode) => info!("▶️ 批次已启动 ({:?} 模式)", mode),
            other => bail!("批次未能启动: {:?}", other),
        }

        let mut done = self.done;
        let summary = tokio::select! {
            summary = &mut done => summary.context("协调器在完成前被释放")?,
            _ = tokio::signal::ctrl_c() => {
                warn!("⚠️ 收到中断信号，取消批次");
                self.coordinator.reset();
                bail!("批次被用户中断");
            }
        };

        report_failed_pages(&self.coordinator);
        info!("📁 结果已保存至: {}", self.config.output_file);
        Ok(summary)
    }
}

/// 加载页面清单
async fn load_pages(config: &Config) -> Result<PageManifest> {
    info!("\n📁 正在加载页面清单...");
    load_manifest(Path::new(&config.manifest_path))
        .await
        .with_context(|| format!("加载清单 {} 失败", config.manifest_path))
}

fn report_failed_pages(coordinator: &Coordinator) {
    for page in coordinator.pages() {
        if page.status() == PageStatus::Error {
            warn!(
                "[页 {}] ❌ {}",
                page.page_number(),
                page.error_message().unwrap_or("未知错误")
            );
        }
    }
}

// ========== 日志辅助函数 ==========

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 页面批量提取");
    info!("🌐 后端地址: {}", config.api_base_url);
    info!("⏱️ 单页超时: {:?}", config.extraction_timeout);
    info!("{}", "=".repeat(60));
}
