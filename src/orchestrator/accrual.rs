//! 计提分析任务 - 编排层
//!
//! ## 流程
//!
//! 1. 从数仓取待分析的 PO 行和全部关联账单（各查一次，之后只用内存）
//! 2. 查当月已分析记录，算出增量
//! 3. 批处理器并发调用模型逐行判断
//! 4. 成功结果写入 CSV 供人工审核，上传是单独的一步

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, Months, NaiveDate};
use tracing::{info, warn};

use crate::clients::WarehouseClient;
use crate::config::Config;
use crate::models::DecisionRow;
use crate::orchestrator::batch_runner::{compute_delta, BatchRunner, ItemOutcome};
use crate::prompts::PromptLibrary;
use crate::services::CsvSink;
use crate::utils::logging;
use crate::workflow::AccrualFlow;

/// 结果文件名
pub const RESULTS_FILE: &str = "accrual_analysis_results.csv";

/// 运行计提分析
pub async fn run_accrual_analysis(
    config: &Config,
    analysis_month: &str,
    max_workers: usize,
) -> Result<()> {
    logging::print_header("📊 计提分析");
    info!("📅 分析月份: {}", analysis_month);
    info!("🔧 并发数: {}", max_workers);

    // 取数仓数据（这一步失败没法继续，直接报错）
    info!("\n📥 正在从数仓读取 PO 行...");
    let warehouse = WarehouseClient::new(config).context("数仓客户端初始化失败")?;
    let po_lines = warehouse.list_po_lines().await?;

    if po_lines.is_empty() {
        warn!("⚠️ 分析视图中没有 PO 行");
        return Ok(());
    }

    info!("📥 正在读取关联账单...");
    let bills_by_po = warehouse.list_related_bills().await?;

    info!("🔍 检查 {} 已分析的 PO 行...", analysis_month);
    let analyzed = warehouse.list_analyzed_keys(analysis_month).await?;

    let candidates: Vec<String> = po_lines.iter().map(|l| l.lookup_key.clone()).collect();
    let delta = compute_delta(&candidates, &analyzed);
    let skipped = candidates.len() - delta.len();
    if skipped > 0 {
        info!("⏭️  跳过 {} 个已分析的 PO 行", skipped);
    }

    if delta.is_empty() {
        info!(
            "✅ 全部 {} 个 PO 行在 {} 都已分析过，无需处理",
            candidates.len(),
            analysis_month
        );
        return Ok(());
    }
    info!("✓ {} 个 PO 行待分析", delta.len());

    // 构建流程和批处理器
    let prompts = Arc::new(
        PromptLibrary::load(&config.prompts_dir).context("加载提示词模板失败")?,
    );
    let flow = Arc::new(AccrualFlow::new(
        config,
        prompts,
        analysis_month.to_string(),
        po_lines,
        bills_by_po,
    ));
    flow.preflight().context("提示词模板预检失败")?;
    let runner = BatchRunner::new(max_workers)
        .context("批处理器配置非法")?
        .with_item_timeout(config.item_timeout_secs.map(Duration::from_secs));

    let report = runner.run(delta, flow).await?;

    // 写结果 CSV
    let csv_path = Path::new(&config.results_dir).join(RESULTS_FILE);
    let sink = CsvSink::create(&csv_path, &DecisionRow::HEADERS)?;

    let mut written = 0;
    let mut accruals_needed = 0;
    for outcome in &report.outcomes {
        if let ItemOutcome::Success { payload, .. } = outcome {
            sink.append(&payload.to_fields())?;
            written += 1;
            if payload.verdict.needs_accrual {
                accruals_needed += 1;
            }
        }
    }

    logging::print_batch_summary(candidates.len(), skipped, &report);
    info!("  需要计提: {}", accruals_needed);
    info!("  无需计提: {}", written - accruals_needed);
    info!("\n✓ {} 行结果已写入: {}", written, csv_path.display());
    info!("💡 下一步: 人工审核 CSV 后，在菜单中执行上传");

    Ok(())
}

/// 生成月份选项：当前月前后各 3 个月
pub fn month_options() -> Vec<String> {
    let today = Local::now().date_naive();
    (0..7u32)
        .filter_map(|i| {
            let shifted = if i < 3 {
                today.checked_sub_months(Months::new(3 - i))
            } else {
                today.checked_add_months(Months::new(i - 3))
            };
            shifted.map(|d| d.format("%B %Y").to_string())
        })
        .collect()
}

/// 校验自定义月份格式（如 "October 2025"），返回规范化的月份标签
pub fn parse_month_label(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let with_day = format!("1 {}", trimmed);
    NaiveDate::parse_from_str(&with_day, "%d %B %Y")
        .ok()
        .map(|d| d.format("%B %Y").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_options_count_and_shape() {
        let options = month_options();
        assert_eq!(options.len(), 7);
        // 形如 "February 2025"
        for option in &options {
            assert!(parse_month_label(option).is_some(), "非法月份: {}", option);
        }
        // 第 4 项（索引 3）是当前月
        let current = Local::now().date_naive().format("%B %Y").to_string();
        assert_eq!(options[3], current);
    }

    #[test]
    fn test_parse_month_label() {
        assert_eq!(
            parse_month_label("October 2025"),
            Some("October 2025".to_string())
        );
        // 大小写和首尾空白都会被规范化
        assert_eq!(
            parse_month_label("  february 2025  "),
            Some("February 2025".to_string())
        );
        assert_eq!(parse_month_label("2025-10"), None);
        assert_eq!(parse_month_label("Smarch 2025"), None);
    }
}
