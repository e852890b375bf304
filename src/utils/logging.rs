/// 日志工具模块
///
/// 提供批处理各阶段的日志格式化和输出
use crate::models::DocumentType;
use crate::orchestrator::BatchSummary;
use tracing::{info, warn};

/// 记录批次创建信息
///
/// # 参数
/// - `file_name`: 上传的原始文件名
/// - `document_type`: 文档类型
/// - `total_pages`: 页数
pub fn log_batch_created(file_name: &str, document_type: DocumentType, total_pages: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 新建提取批次: {}", file_name);
    info!("📄 文档类型: {} | 共 {} 页", document_type, total_pages);
    info!("{}", "=".repeat(60));
}

/// 记录直连模式的分批计划
pub fn log_direct_plan(to_submit: usize, total_pages: usize, batch_size: usize, total_batches: usize) {
    info!("✓ 本轮提交 {} 页（批次共 {} 页）", to_submit, total_pages);
    info!("📋 将以每批 {} 页的方式处理，共 {} 批", batch_size, total_batches);
    info!("💡 每批完成后再开始下一批\n");
}

/// 记录批次开始信息
///
/// # 参数
/// - `batch_num`: 批次编号
/// - `total_batches`: 批次总数
/// - `pages`: 本批页码
pub fn log_batch_start(batch_num: usize, total_batches: usize, pages: &[u32]) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理第 {}/{} 批", batch_num, total_batches);
    match (pages.first(), pages.last()) {
        (Some(first), Some(last)) => info!("📄 本批页码: {}-{}（{} 页）", first, last, pages.len()),
        _ => info!("📄 本批为空"),
    }
    info!("{}", "=".repeat(60));
}

/// 记录批次完成信息
pub fn log_batch_complete(batch_num: usize, success: usize, failed: usize, total: usize) {
    info!("\n{}", "─".repeat(60));
    info!(
        "✓ 第 {} 批完成: 成功 {}/{}，失败 {}",
        batch_num, success, total, failed
    );
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(summary: &BatchSummary) {
    info!("\n{}", "=".repeat(60));
    info!("📊 批次处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    if let Some(session_id) = &summary.session_id {
        info!("🔗 会话: {}", session_id);
    }
    info!("⏱️ 用时: {:.1}s", summary.elapsed.as_secs_f64());
    info!("✅ 成功: {}/{}", summary.counts.completed, summary.counts.total);
    info!("❌ 失败: {}", summary.counts.error);
    let unfinished = summary.counts.pending + summary.counts.processing;
    if unfinished > 0 {
        info!("⏳ 未完成: {}", unfinished);
    }
    if summary.reason.is_abnormal() {
        warn!("⚠️ 结束原因: {}", summary.reason);
    } else {
        info!("结束原因: {}", summary.reason);
    }
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（按字符计）
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
