//! 日志工具模块
//!
//! 提供 tracing 初始化和批处理汇总输出的辅助函数

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::orchestrator::batch_runner::BatchReport;

/// 初始化日志（RUST_LOG 可覆盖级别，默认 info；重复调用是无害的）
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .ok();
}

/// 打印阶段标题
pub fn print_header(title: &str) {
    info!("{}", "=".repeat(60));
    info!("{}", title);
    info!("{}", "=".repeat(60));
}

/// 打印批处理汇总
///
/// # 参数
/// - `found`: 候选条目总数
/// - `skipped`: 增量判断跳过的数量
/// - `report`: 批处理报告
pub fn print_batch_summary<T>(found: usize, skipped: usize, report: &BatchReport<T>) {
    let total_secs = report.wall_clock.as_secs();

    info!("\n{}", "=".repeat(60));
    info!("📊 处理汇总");
    info!("{}", "=".repeat(60));
    info!("  候选条目总数: {}", found);
    info!("  已处理跳过: {}", skipped);
    info!("  本次处理: {}", report.attempted);
    info!("  ✅ 成功: {}", report.succeeded);
    info!("  ❌ 失败: {}", report.failed);
    info!("  ");
    info!("  Token 总消耗: {}", report.tokens_total);
    info!("    - 输入: {}", report.tokens_input);
    info!("    - 输出: {}", report.tokens_output);
    info!("  平均每条 token: {}", report.avg_tokens());
    info!("  ");
    info!("  总耗时: {}m {}s", total_secs / 60, total_secs % 60);
    info!("  平均每条耗时: {:.1}s", report.avg_item_secs());
    info!("{}", "=".repeat(60));

    let failed_ids = report.failed_ids();
    if !failed_ids.is_empty() {
        warn!("⚠️ 失败条目（可直接重跑，已成功的会自动跳过）:");
        for id in failed_ids {
            warn!("  - {}", id);
        }
    }
}
