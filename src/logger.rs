use tracing_subscriber::EnvFilter;

/// 初始化日志
///
/// 默认 info 级别，可通过 `RUST_LOG` 覆盖；`verbose` 为真时默认 debug
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // 重复初始化（如测试中）忽略即可
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
