//! Snowflake 数仓客户端
//!
//! 通过 Snowflake SQL REST API 读写数仓。读取走预建视图
//! （业务规则已在视图里过滤好），写入只做追加，不修改存量数据。
//!
//! ## 涉及的视图 / 表
//! - `ACCRUALS_AUTOMATION_BILLS_TO_DOWNLOAD`：待下载发票的 bill 列表
//! - `ACCRUALS_AUTOMATION_PO_ANALYSIS_INPUT`：待分析的 PO 行
//! - `ACCRUALS_AUTOMATION_RELATED_BILLS`：PO 关联账单（含已抽取发票信息）
//! - `ACCRUALS_AUTOMATION_EXTRACTED_INVOICES`：发票抽取结果（追加）
//! - `ACCRUALS_AUTOMATION_ANALYSIS_RESULTS`：计提分析结果（追加）

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{PoLine, RelatedBill};

/// Snowflake 数仓客户端
pub struct WarehouseClient {
    http: reqwest::Client,
    statements_url: String,
    token: String,
    database: String,
    schema: String,
    warehouse: String,
    role: Option<String>,
}

/// SQL API 的响应体（只取用到的字段）
#[derive(Debug, Deserialize)]
struct StatementResponse {
    #[serde(rename = "resultSetMetaData")]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Option<Vec<Vec<JsonValue>>>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultSetMetaData {
    #[serde(rename = "rowType")]
    row_type: Vec<ColumnMeta>,
}

#[derive(Debug, Deserialize)]
struct ColumnMeta {
    name: String,
}

impl WarehouseClient {
    /// 创建数仓客户端
    ///
    /// 账号或 token 缺失属于配置错误，启动时直接失败
    pub fn new(config: &Config) -> Result<Self> {
        if config.snowflake_account.is_empty() || config.snowflake_token.is_empty() {
            return Err(AppError::Config(
                "Snowflake 配置不完整 (SNOWFLAKE_ACCOUNT / SNOWFLAKE_TOKEN)".to_string(),
            ));
        }

        Ok(Self {
            http: reqwest::Client::new(),
            statements_url: format!(
                "https://{}.snowflakecomputing.com/api/v2/statements",
                config.snowflake_account
            ),
            token: config.snowflake_token.clone(),
            database: config.snowflake_database.clone(),
            schema: config.snowflake_schema.clone(),
            warehouse: config.snowflake_warehouse.clone(),
            role: if config.snowflake_role.is_empty() {
                None
            } else {
                Some(config.snowflake_role.clone())
            },
        })
    }

    /// 执行一条 SQL，把结果整理成"列名 → 值"的对象列表
    async fn execute(&self, operation: &str, statement: &str) -> Result<Vec<JsonValue>> {
        debug!("执行数仓查询 ({}): {}", operation, statement);

        let mut body = json!({
            "statement": statement,
            "database": self.database,
            "schema": self.schema,
            "warehouse": self.warehouse,
            "timeout": 120,
        });
        if let Some(role) = &self.role {
            body["role"] = json!(role);
        }

        let response = self
            .http
            .post(&self.statements_url)
            .bearer_auth(&self.token)
            .header(
                "X-Snowflake-Authorization-Token-Type",
                "PROGRAMMATIC_ACCESS_TOKEN",
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::warehouse(operation, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::warehouse(operation, e))?;

        if !status.is_success() {
            // 出错时尽量取响应里的 message，拿不到就原样带上
            let message = serde_json::from_str::<StatementResponse>(&body)
                .ok()
                .and_then(|p| p.message)
                .unwrap_or(body);
            return Err(AppError::warehouse(
                operation,
                format!("HTTP {}: {}", status, message),
            ));
        }

        let payload: StatementResponse = serde_json::from_str(&body)
            .map_err(|e| AppError::warehouse(operation, format!("响应解析失败: {}", e)))?;

        Ok(assemble_rows(&payload))
    }

    fn qualified(&self, object: &str) -> String {
        format!("{}.{}.{}", self.database, self.schema, object)
    }

    /// 连接测试
    pub async fn test_connection(&self) -> Result<String> {
        let rows = self.execute("连接测试", "SELECT CURRENT_VERSION() AS VERSION").await?;
        let version = rows
            .first()
            .and_then(|r| r.get("VERSION"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        info!("✓ Snowflake 连接成功, 版本: {}", version);
        Ok(version)
    }

    /// 待下载发票的 bill ID 列表（去重、排序，保证顺序稳定）
    pub async fn list_bills_to_download(&self) -> Result<Vec<String>> {
        let statement = format!(
            "SELECT DISTINCT BILL_TRANSACTION_ID FROM {} \
             WHERE BILL_TRANSACTION_ID IS NOT NULL ORDER BY BILL_TRANSACTION_ID",
            self.qualified("ACCRUALS_AUTOMATION_BILLS_TO_DOWNLOAD")
        );
        let rows = self.execute("待下载账单", &statement).await?;

        let bill_ids: Vec<String> = rows
            .iter()
            .filter_map(|r| r.get("BILL_TRANSACTION_ID").and_then(|v| v.as_str()))
            .map(|s| s.to_string())
            .collect();

        info!("✓ 从数仓读到 {} 个待下载 bill", bill_ids.len());
        Ok(bill_ids)
    }

    /// 已抽取的发票集合，标识为 "bill_id/file_name"
    pub async fn list_processed_invoices(&self) -> Result<HashSet<String>> {
        let statement = format!(
            "SELECT BILL_ID, FILE_NAME FROM {}",
            self.qualified("ACCRUALS_AUTOMATION_EXTRACTED_INVOICES")
        );
        let rows = self.execute("已抽取发票", &statement).await?;

        let processed: HashSet<String> = rows
            .iter()
            .filter_map(|r| {
                let bill = r.get("BILL_ID")?.as_str()?;
                let file = r.get("FILE_NAME")?.as_str()?;
                Some(format!("{}/{}", bill, file))
            })
            .collect();

        info!("✓ 数仓中已有 {} 条抽取记录", processed.len());
        Ok(processed)
    }

    /// 待分析的 PO 行（视图已按业务规则过滤）
    pub async fn list_po_lines(&self) -> Result<Vec<PoLine>> {
        let statement = format!(
            "SELECT LOOKUP_KEY, PO_NUMBER, VENDOR_NAME, GL_ACCOUNT_NAME, DESCRIPTION, \
             TOTAL_AMOUNT_FOREIGN, BILLED_AMOUNT_FOREIGN, UNBILLED_AMOUNT_FOREIGN, FOREIGN_CURRENCY \
             FROM {} ORDER BY LOOKUP_KEY",
            self.qualified("ACCRUALS_AUTOMATION_PO_ANALYSIS_INPUT")
        );
        let rows = self.execute("PO 行", &statement).await?;

        let mut po_lines = Vec::with_capacity(rows.len());
        for row in rows {
            let line: PoLine = serde_json::from_value(row)
                .map_err(|e| AppError::warehouse("PO 行", format!("行解析失败: {}", e)))?;
            po_lines.push(line);
        }

        info!("✓ 从数仓读到 {} 个 PO 行", po_lines.len());
        Ok(po_lines)
    }

    /// 所有 PO 的关联账单，按 PO 号分组（一次性取回，派发前查内存）
    pub async fn list_related_bills(&self) -> Result<HashMap<String, Vec<RelatedBill>>> {
        let statement = format!(
            "SELECT PO_NUMBER, BILL_ID, POSTING_PERIOD, AMOUNT, CURRENCY, PAYMENT_STATUS, \
             INVOICE_NUMBER, SERVICE_DESCRIPTION, SERVICE_PERIOD, NET_AMOUNT \
             FROM {}",
            self.qualified("ACCRUALS_AUTOMATION_RELATED_BILLS")
        );
        let rows = self.execute("关联账单", &statement).await?;

        let mut bills_by_po: HashMap<String, Vec<RelatedBill>> = HashMap::new();
        for row in rows {
            let bill: RelatedBill = serde_json::from_value(row)
                .map_err(|e| AppError::warehouse("关联账单", format!("行解析失败: {}", e)))?;
            bills_by_po.entry(bill.po_number.clone()).or_default().push(bill);
        }

        info!("✓ 读到 {} 个 PO 的关联账单", bills_by_po.len());
        Ok(bills_by_po)
    }

    /// 指定月份已分析过的 lookup key 集合
    pub async fn list_analyzed_keys(&self, analysis_month: &str) -> Result<HashSet<String>> {
        let statement = format!(
            "SELECT LOOKUP_KEY FROM {} WHERE ANALYSIS_MONTH = {}",
            self.qualified("ACCRUALS_AUTOMATION_ANALYSIS_RESULTS"),
            sql_quote(analysis_month)
        );
        let rows = self.execute("已分析 PO 行", &statement).await?;

        let keys: HashSet<String> = rows
            .iter()
            .filter_map(|r| r.get("LOOKUP_KEY").and_then(|v| v.as_str()))
            .map(|s| s.to_string())
            .collect();

        info!("✓ {} 已有 {} 条分析记录", analysis_month, keys.len());
        Ok(keys)
    }

    /// 向结果表追加行（只追加，不覆盖存量数据）
    pub async fn append_rows(
        &self,
        table: &str,
        columns: &[&str],
        rows: &[Vec<String>],
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let values: Vec<String> = rows
            .iter()
            .map(|row| {
                let fields: Vec<String> = row
                    .iter()
                    .map(|v| {
                        if v.is_empty() {
                            "NULL".to_string()
                        } else {
                            sql_quote(v)
                        }
                    })
                    .collect();
                format!("({})", fields.join(", "))
            })
            .collect();

        let statement = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.qualified(table),
            columns.join(", "),
            values.join(", ")
        );

        self.execute("结果上传", &statement).await?;

        info!("✓ 已向 {} 追加 {} 行", table, rows.len());
        Ok(rows.len())
    }
}

/// 把 API 返回的"列类型 + 值矩阵"拼成对象列表
fn assemble_rows(payload: &StatementResponse) -> Vec<JsonValue> {
    let Some(meta) = &payload.result_set_meta_data else {
        return Vec::new();
    };
    let Some(data) = &payload.data else {
        return Vec::new();
    };

    data.iter()
        .map(|row| {
            let mut object = Map::new();
            for (column, value) in meta.row_type.iter().zip(row.iter()) {
                object.insert(column.name.clone(), value.clone());
            }
            JsonValue::Object(object)
        })
        .collect()
}

/// SQL 字符串字面量（单引号转义）
pub fn sql_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_quote_escapes_single_quotes() {
        assert_eq!(sql_quote("February 2025"), "'February 2025'");
        assert_eq!(sql_quote("O'Brien & Co"), "'O''Brien & Co'");
    }

    #[test]
    fn test_assemble_rows_keys_by_column_name() {
        let payload: StatementResponse = serde_json::from_str(
            r#"{
                "resultSetMetaData": {"rowType": [{"name": "BILL_ID"}, {"name": "FILE_NAME"}]},
                "data": [["26358814", "invoice.pdf"], ["26358815", null]]
            }"#,
        )
        .unwrap();

        let rows = assemble_rows(&payload);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["BILL_ID"], "26358814");
        assert_eq!(rows[0]["FILE_NAME"], "invoice.pdf");
        assert!(rows[1]["FILE_NAME"].is_null());
    }

    #[test]
    fn test_assemble_rows_without_result_set() {
        // INSERT 之类的语句没有结果集
        let payload: StatementResponse =
            serde_json::from_str(r#"{"message": "Statement executed successfully."}"#).unwrap();
        assert!(assemble_rows(&payload).is_empty());
    }
}
