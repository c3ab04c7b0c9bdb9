//! 计提判断结果模型

use serde::Deserialize;

use super::de_f64_lenient;
use crate::models::PoLine;

/// 模型返回的计提判断 JSON
#[derive(Debug, Clone, Deserialize)]
pub struct AccrualVerdict {
    pub needs_accrual: bool,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub accrual_amount: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub short_summary: String,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub confidence: f64,
}

/// 计提分析结果的一行（CSV / 数仓表 ACCRUALS_AUTOMATION_ANALYSIS_RESULTS）
#[derive(Debug, Clone)]
pub struct DecisionRow {
    pub po_line: PoLine,
    pub verdict: AccrualVerdict,
    /// 分析月份，如 "February 2025"
    pub analysis_month: String,
    /// 分析完成时间（ISO 8601）
    pub analyzed_at: String,
}

impl DecisionRow {
    /// CSV 表头，与数仓表列顺序一致
    pub const HEADERS: [&'static str; 16] = [
        "lookup_key",
        "po_number",
        "vendor_name",
        "gl_account",
        "description",
        "total_amount",
        "billed_amount",
        "unbilled_amount",
        "currency",
        "needs_accrual",
        "accrual_amount",
        "short_summary",
        "reasoning",
        "confidence_score",
        "analysis_month",
        "analyzed_at",
    ];

    /// 转换为 CSV 字段
    ///
    /// analysis_month 前加单引号，强制 Excel 按文本处理；
    /// 不需要计提时金额固定写 0
    pub fn to_fields(&self) -> Vec<String> {
        let po = &self.po_line;
        let v = &self.verdict;
        let accrual_amount = if v.needs_accrual { v.accrual_amount } else { 0.0 };

        vec![
            po.lookup_key.clone(),
            po.po_number.clone(),
            po.vendor_name.clone().unwrap_or_default(),
            po.gl_account_name.clone().unwrap_or_default(),
            po.description.clone().unwrap_or_default(),
            po.total_amount_foreign.clone().unwrap_or_default(),
            po.billed_amount_foreign.clone().unwrap_or_default(),
            po.unbilled_amount_foreign.clone().unwrap_or_default(),
            po.foreign_currency.clone().unwrap_or_default(),
            v.needs_accrual.to_string(),
            accrual_amount.to_string(),
            v.short_summary.clone(),
            v.reasoning.clone(),
            v.confidence.to_string(),
            format!("'{}", self.analysis_month),
            self.analyzed_at.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_po_line() -> PoLine {
        serde_json::from_str(
            r#"{"LOOKUP_KEY": "PO9:1", "PO_NUMBER": "PO9", "UNBILLED_AMOUNT_FOREIGN": "5000"}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_verdict_from_model_json() {
        let json = r#"{
            "needs_accrual": true,
            "accrual_amount": 5000,
            "reasoning": "Service period covers the analysis month but no bill was posted.",
            "short_summary": "Unbilled service in period",
            "confidence": 0.85
        }"#;

        let v: AccrualVerdict = serde_json::from_str(json).unwrap();
        assert!(v.needs_accrual);
        assert_eq!(v.accrual_amount, 5000.0);
        assert_eq!(v.confidence, 0.85);
    }

    #[test]
    fn test_no_accrual_zeroes_amount() {
        // 模型偶尔在 needs_accrual=false 时仍给出金额，写出时要归零
        let row = DecisionRow {
            po_line: sample_po_line(),
            verdict: AccrualVerdict {
                needs_accrual: false,
                accrual_amount: 1234.0,
                reasoning: "Fully billed.".to_string(),
                short_summary: "Fully billed".to_string(),
                confidence: 0.9,
            },
            analysis_month: "February 2025".to_string(),
            analyzed_at: "2025-02-28T10:00:00+01:00".to_string(),
        };

        let fields = row.to_fields();
        assert_eq!(fields.len(), DecisionRow::HEADERS.len());
        assert_eq!(fields[9], "false");
        assert_eq!(fields[10], "0");
        assert_eq!(fields[14], "'February 2025");
    }
}
