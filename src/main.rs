use anyhow::Result;
use page_batch_extract::{logger, App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    logger::init(config.verbose_logging);

    // 初始化并运行应用
    let summary = App::initialize(config).await?.run().await?;

    if summary.reason.is_abnormal() {
        std::process::exit(2);
    }
    Ok(())
}
