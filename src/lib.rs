//! # Page Batch Extract
//!
//! 扫描单据的逐页批量提取协调器
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 数据层（Models）
//! - `models/` - 页面描述、页面状态、单据类型、会话状态的线上格式
//! - `models/loaders` - TOML 页面清单加载
//!
//! ### ② 外部接口与基础设施（Clients / Infrastructure）
//! - `ExtractionClient` - 单页提取（`POST /process-page`）
//! - `BatchStatusSource` - 会话状态查询（`GET /batch-status/{id}`）
//! - `SessionStore` - 会话引用的持久化
//!
//! ### ③ 业务能力层（Services）
//! - `PageStore` - 页面状态表
//! - `normalizer` / `reconciler` - 结果整形与快照合并
//! - `StalenessTracker` - 停滞检测
//! - `ResultWriter` - 结果落盘
//!
//! ### ④ 编排层（Orchestration）
//! - `Coordinator` - 一批页面的生命周期、回调、重试与重置
//! - `throttler` / `poller` - 直连模式与会话轮询模式的执行循环
//!
//! ## 模块结构

pub mod app;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;

// 重新导出常用类型
pub use app::App;
pub use config::{BatchSizePolicy, BatchSizeTier, Config};
pub use error::{AppError, AppResult, StatusFetchError};
pub use models::{DocumentType, NormalizedPageData, PageDescriptor, PageState, PageStatus};
pub use orchestrator::{
    BatchObserver, BatchSummary, Coordinator, Mode, RunPhase, StartOutcome, TerminationReason,
};
