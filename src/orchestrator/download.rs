//! 发票下载任务 - 编排层
//!
//! 从数仓取待下载的 bill 列表，逐个在已登录的 NetSuite 浏览器
//! 会话里抓取附件。下载是顺序执行的（单个浏览器会话），
//! 已有本地文件的 bill 直接跳过。

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::browser::connect_to_browser_and_page;
use crate::clients::WarehouseClient;
use crate::config::Config;
use crate::infrastructure::JsExecutor;
use crate::services::downloader::has_local_files;
use crate::services::{FailureLog, InvoiceDownloader};
use crate::utils::logging;

/// 运行发票下载
pub async fn run_invoice_download(config: &Config) -> Result<()> {
    logging::print_header("📥 发票下载");

    let warehouse = WarehouseClient::new(config).context("数仓客户端初始化失败")?;
    let bill_ids = warehouse.list_bills_to_download().await?;

    if bill_ids.is_empty() {
        warn!("⚠️ 数仓视图中没有待下载的 bill");
        return Ok(());
    }

    // 增量判断：已有本地文件的 bill 跳过
    let invoices_dir = Path::new(&config.invoices_dir);
    let pending: Vec<String> = bill_ids
        .iter()
        .filter(|bill_id| !has_local_files(invoices_dir, bill_id))
        .cloned()
        .collect();
    let skipped = bill_ids.len() - pending.len();
    if skipped > 0 {
        info!("⏭️  跳过 {} 个已下载的 bill", skipped);
    }

    if pending.is_empty() {
        info!("✅ 全部 {} 个 bill 都已下载过，无需处理", bill_ids.len());
        return Ok(());
    }
    info!("✓ {} 个 bill 待下载", pending.len());

    // 连接浏览器（需要用户提前在该会话里完成 Okta 登录）
    let (_browser, page) =
        connect_to_browser_and_page(config.browser_debug_port, &config.netsuite_base_url).await?;
    let downloader = InvoiceDownloader::new(JsExecutor::new(page), config);
    let failure_log = FailureLog::new(&config.failed_downloads_file);

    let total = pending.len();
    let mut succeeded = 0;
    let mut failed = 0;
    let mut files_saved = 0;

    for (index, bill_id) in pending.iter().enumerate() {
        info!("\n[{}/{}] 下载 bill {}", index + 1, total, bill_id);

        match downloader.download_bill(bill_id).await {
            Ok(files) => {
                succeeded += 1;
                files_saved += files.len();
            }
            Err(e) => {
                failed += 1;
                error!("[{}/{}] ❌ bill {} 下载失败: {}", index + 1, total, bill_id, e);
                if let Err(log_err) = failure_log.record(bill_id, &e.to_string()) {
                    warn!("写入失败记录文件出错: {}", log_err);
                }
            }
        }
    }

    info!("\n{}", "=".repeat(60));
    info!("📊 下载汇总");
    info!("{}", "=".repeat(60));
    info!("  待下载 bill: {}", total);
    info!("  ✅ 成功: {} (共 {} 个文件)", succeeded, files_saved);
    info!("  ❌ 失败: {}", failed);
    if failed > 0 {
        info!("  失败记录见: {}", config.failed_downloads_file);
    }
    info!("{}", "=".repeat(60));

    Ok(())
}
