//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责一批页面的调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `coordinator` - 批处理协调器
//! - 选择模式（直连 / 会话轮询）
//! - 持有页面状态表，唯一的修改入口
//! - 触发宿主回调，保证完成信号只发一次
//! - 重试与重置
//!
//! ### `throttler` - 直连模式节流
//! - 按页数选定每批大小
//! - 批内并发，批间停顿，异常退避
//!
//! ### `poller` - 会话轮询
//! - 固定间隔查询会话状态并合并
//! - 会话结束、不存在、不可达、停滞时终止
//!
//! ## 层次关系
//!
//! ```text
//! coordinator (一批页面的生命周期)
//!     ↓
//! throttler / poller (两种模式的执行循环)
//!     ↓
//! services (能力层：page_store / normalizer / reconciler / staleness)
//!     ↓
//! clients / infrastructure (提取服务、会话状态、会话引用存储)
//! ```

pub mod coordinator;
mod poller;
mod throttler;

// 重新导出主要类型
pub use coordinator::{
    BatchObserver, BatchSummary, Coordinator, Mode, RunPhase, StartOutcome, TerminationReason,
};
