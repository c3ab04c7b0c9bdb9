//! PO 行与关联账单模型
//!
//! 字段名与 Snowflake 视图列名对应（REST API 返回的值均为字符串），
//! 序列化后直接作为分析数据喂给模型，保持与数仓一致的大写列名。

use serde::{Deserialize, Serialize};

/// 待分析的 PO 行（视图 ACCRUALS_AUTOMATION_PO_ANALYSIS_INPUT）
///
/// 业务规则（GL 科目排除、最小余额阈值）已在视图中预先过滤，
/// 这里拿到的行都是需要判断的
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PoLine {
    pub lookup_key: String,
    pub po_number: String,
    #[serde(default)]
    pub vendor_name: Option<String>,
    #[serde(default)]
    pub gl_account_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub total_amount_foreign: Option<String>,
    #[serde(default)]
    pub billed_amount_foreign: Option<String>,
    #[serde(default)]
    pub unbilled_amount_foreign: Option<String>,
    #[serde(default)]
    pub foreign_currency: Option<String>,
}

/// PO 关联的账单与已抽取发票信息（视图 ACCRUALS_AUTOMATION_RELATED_BILLS）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RelatedBill {
    pub po_number: String,
    pub bill_id: String,
    #[serde(default)]
    pub posting_period: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub service_description: Option<String>,
    #[serde(default)]
    pub service_period: Option<String>,
    #[serde(default)]
    pub net_amount: Option<String>,
}
