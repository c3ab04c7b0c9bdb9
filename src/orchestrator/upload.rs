//! 结果上传任务 - 编排层
//!
//! 把人工审核过的 CSV 追加到数仓结果表。这一步永远由用户显式触发，
//! 批处理结束时不会自动上传（先算、再审、最后落库）。

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::clients::WarehouseClient;
use crate::config::Config;
use crate::models::{DecisionRow, InvoiceRow};
use crate::orchestrator::{accrual, extraction};
use crate::services::csv_sink;

/// 发票抽取结果的目标表
const INVOICES_TABLE: &str = "ACCRUALS_AUTOMATION_EXTRACTED_INVOICES";
/// 计提分析结果的目标表
const ANALYSIS_TABLE: &str = "ACCRUALS_AUTOMATION_ANALYSIS_RESULTS";

/// 读取待上传的发票抽取结果，返回 (表头, 行)
pub fn load_invoice_results(config: &Config) -> Result<Option<Vec<Vec<String>>>> {
    load_rows(
        Path::new(&config.results_dir).join(extraction::RESULTS_FILE),
        &InvoiceRow::HEADERS,
        &["service_period"],
    )
}

/// 读取待上传的计提分析结果
pub fn load_analysis_results(config: &Config) -> Result<Option<Vec<Vec<String>>>> {
    load_rows(
        Path::new(&config.results_dir).join(accrual::RESULTS_FILE),
        &DecisionRow::HEADERS,
        &["analysis_month"],
    )
}

/// 上传发票抽取结果
pub async fn upload_invoice_results(config: &Config, rows: Vec<Vec<String>>) -> Result<usize> {
    upload(config, INVOICES_TABLE, &InvoiceRow::HEADERS, rows).await
}

/// 上传计提分析结果
pub async fn upload_analysis_results(config: &Config, rows: Vec<Vec<String>>) -> Result<usize> {
    upload(config, ANALYSIS_TABLE, &DecisionRow::HEADERS, rows).await
}

async fn upload(
    config: &Config,
    table: &str,
    headers: &[&str],
    rows: Vec<Vec<String>>,
) -> Result<usize> {
    let warehouse = WarehouseClient::new(config).context("数仓客户端初始化失败")?;

    info!("📤 正在上传 {} 行到 {} ...", rows.len(), table);
    let count = warehouse.append_rows(table, headers, &rows).await?;

    info!("✅ 上传完成: {} 行", count);
    Ok(count)
}

/// 读 CSV 并按表头顺序整理成行
///
/// `unquote_columns` 里的列要去掉写出时加的 Excel 文本前缀（单引号）
fn load_rows(
    path: impl AsRef<Path>,
    headers: &[&str],
    unquote_columns: &[&str],
) -> Result<Option<Vec<Vec<String>>>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }

    let records = csv_sink::read_rows(path)
        .with_context(|| format!("读取结果文件失败: {}", path.display()))?;

    let rows = records
        .iter()
        .map(|record| to_ordered_fields(record, headers, unquote_columns))
        .collect();

    Ok(Some(rows))
}

fn to_ordered_fields(
    record: &HashMap<String, String>,
    headers: &[&str],
    unquote_columns: &[&str],
) -> Vec<String> {
    headers
        .iter()
        .map(|header| {
            let value = record.get(*header).cloned().unwrap_or_default();
            if unquote_columns.contains(header) {
                value.strip_prefix('\'').map(|v| v.to_string()).unwrap_or(value)
            } else {
                value
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_fields_strip_excel_prefix() {
        let mut record = HashMap::new();
        record.insert("a".to_string(), "1".to_string());
        record.insert("service_period".to_string(), "'2025-01".to_string());

        let fields = to_ordered_fields(&record, &["a", "service_period", "missing"], &["service_period"]);
        assert_eq!(fields, vec!["1", "2025-01", ""]);
    }
}
