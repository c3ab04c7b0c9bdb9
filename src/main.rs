use anyhow::Result;

use accrual_automation::orchestrator::App;
use accrual_automation::utils::logging;
use accrual_automation::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env();

    // 运行主菜单
    App::new(config).run().await?;

    Ok(())
}
