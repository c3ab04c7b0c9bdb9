//! 发票抽取任务 - 编排层
//!
//! ## 流程
//!
//! 1. 扫描发票目录，收集候选文件列表
//! 2. 查数仓已抽取记录，算出增量（查不到就全量处理，只警告不中断）
//! 3. 批处理器并发调用视觉模型抽取
//! 4. 成功结果写入 CSV 供人工审核，上传是单独的一步

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::clients::WarehouseClient;
use crate::config::Config;
use crate::models::InvoiceRow;
use crate::orchestrator::batch_runner::{compute_delta, BatchRunner, ItemOutcome};
use crate::prompts::PromptLibrary;
use crate::services::CsvSink;
use crate::utils::logging;
use crate::workflow::{scan_invoice_files, InvoiceFlow};

/// 结果文件名
pub const RESULTS_FILE: &str = "invoice_extraction_results.csv";

/// 运行发票抽取
pub async fn run_invoice_extraction(config: &Config, max_workers: usize) -> Result<()> {
    logging::print_header("🤖 发票抽取");
    info!("🔧 并发数: {}", max_workers);

    // 扫描候选文件
    info!("\n📁 正在扫描发票目录: {}", config.invoices_dir);
    let sources = scan_invoice_files(Path::new(&config.invoices_dir))
        .with_context(|| format!("扫描发票目录失败: {}", config.invoices_dir))?;

    if sources.is_empty() {
        warn!("⚠️ 发票目录中没有文件，先运行下载");
        return Ok(());
    }
    info!("✓ 找到 {} 个文件", sources.len());

    // 查已抽取记录（数仓不可用时退化为全量处理）
    info!("🔍 检查数仓中已抽取的发票...");
    let processed = load_processed_invoices(config).await;

    let candidates: Vec<String> = sources.iter().map(|s| s.id()).collect();
    let delta = compute_delta(&candidates, &processed);
    let skipped = candidates.len() - delta.len();
    if skipped > 0 {
        info!("⏭️  跳过 {} 个已抽取的文件", skipped);
    }

    if delta.is_empty() {
        info!("✅ 全部 {} 个文件都已抽取过，无需处理", candidates.len());
        return Ok(());
    }
    info!("✓ {} 个文件待抽取", delta.len());

    // 构建流程和批处理器
    let prompts = Arc::new(
        PromptLibrary::load(&config.prompts_dir).context("加载提示词模板失败")?,
    );
    let flow = Arc::new(InvoiceFlow::new(config, prompts, sources));
    flow.preflight().context("提示词模板预检失败")?;
    let runner = BatchRunner::new(max_workers)
        .context("批处理器配置非法")?
        .with_item_timeout(config.item_timeout_secs.map(Duration::from_secs));

    let report = runner.run(delta, flow).await?;

    // 写结果 CSV（只写成功且确认是发票的行）
    let csv_path = Path::new(&config.results_dir).join(RESULTS_FILE);
    let sink = CsvSink::create(&csv_path, &InvoiceRow::HEADERS)?;

    let mut written = 0;
    let mut non_invoices = 0;
    for outcome in &report.outcomes {
        if let ItemOutcome::Success { payload, .. } = outcome {
            if payload.extraction.is_invoice {
                sink.append(&payload.to_fields())?;
                written += 1;
            } else {
                non_invoices += 1;
            }
        }
    }

    logging::print_batch_summary(candidates.len(), skipped, &report);
    if non_invoices > 0 {
        info!("🗑️ 非发票文档: {} 个（文件已删除）", non_invoices);
    }
    info!("\n✓ {} 行结果已写入: {}", written, csv_path.display());
    info!("💡 下一步: 人工审核 CSV 后，在菜单中执行上传");

    Ok(())
}

/// 读取已抽取集合；数仓不可用时退化为空集（只做全量，不中断）
async fn load_processed_invoices(config: &Config) -> HashSet<String> {
    let warehouse = match WarehouseClient::new(config) {
        Ok(w) => w,
        Err(e) => {
            warn!("⚠️ 数仓客户端初始化失败: {}", e);
            warn!("   退化为全量处理（不做增量跳过）");
            return HashSet::new();
        }
    };

    match warehouse.list_processed_invoices().await {
        Ok(processed) => processed,
        Err(e) => {
            warn!("⚠️ 查询已抽取记录失败: {}", e);
            warn!("   退化为全量处理（不做增量跳过）");
            HashSet::new()
        }
    }
}
