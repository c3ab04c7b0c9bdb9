//! 发票数据模型
//!
//! `InvoiceExtraction` 对应模型返回的 JSON 结构，
//! `InvoiceRow` 是写入 CSV / 数仓表的一行。

use serde::Deserialize;

use super::{de_f64_lenient, de_opt_f64_lenient};

/// 模型抽取出的发票结构化数据
///
/// 字段与提示词中要求的 JSON 结构一一对应，缺失字段按 None 处理
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceExtraction {
    pub is_invoice: bool,
    #[serde(default)]
    pub invoice_number: Option<String>,
    /// YYYY-MM-DD，模型未识别时为 None
    #[serde(default)]
    pub invoice_date: Option<String>,
    #[serde(default)]
    pub service_description: Option<String>,
    /// 服务期间，如 "2025-01-01 - 2025-12-31"
    #[serde(default)]
    pub service_period: Option<String>,
    #[serde(default)]
    pub line_items_summary: Option<String>,
    #[serde(default, deserialize_with = "de_opt_f64_lenient")]
    pub total_amount: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64_lenient")]
    pub tax_amount: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64_lenient")]
    pub net_amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub confidence_score: f64,
}

/// 发票抽取结果的一行（CSV / 数仓表 ACCRUALS_AUTOMATION_EXTRACTED_INVOICES）
#[derive(Debug, Clone)]
pub struct InvoiceRow {
    pub bill_id: String,
    pub file_name: String,
    pub extraction: InvoiceExtraction,
    pub processing_time_seconds: f64,
    pub file_path: String,
}

impl InvoiceRow {
    /// CSV 表头，与数仓表列顺序一致
    pub const HEADERS: [&'static str; 15] = [
        "bill_id",
        "file_name",
        "is_invoice",
        "invoice_number",
        "invoice_date",
        "service_description",
        "service_period",
        "line_items_summary",
        "total_amount",
        "tax_amount",
        "net_amount",
        "currency",
        "confidence_score",
        "processing_time_seconds",
        "file_path",
    ];

    /// 转换为 CSV 字段
    ///
    /// service_period 前加单引号，强制 Excel 按文本处理
    pub fn to_fields(&self) -> Vec<String> {
        let e = &self.extraction;
        let service_period = match e.service_period.as_deref() {
            Some(p) if !p.is_empty() => format!("'{}", p),
            _ => String::new(),
        };

        vec![
            self.bill_id.clone(),
            self.file_name.clone(),
            e.is_invoice.to_string(),
            e.invoice_number.clone().unwrap_or_default(),
            e.invoice_date.clone().unwrap_or_default(),
            e.service_description.clone().unwrap_or_default(),
            service_period,
            e.line_items_summary.clone().unwrap_or_default(),
            e.total_amount.map(|v| v.to_string()).unwrap_or_default(),
            e.tax_amount.map(|v| v.to_string()).unwrap_or_default(),
            e.net_amount.map(|v| v.to_string()).unwrap_or_default(),
            e.currency.clone().unwrap_or_default(),
            e.confidence_score.to_string(),
            format!("{:.1}", self.processing_time_seconds),
            self.file_path.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_from_model_json() {
        let json = r#"{
            "is_invoice": true,
            "invoice_number": "INV-2025-001",
            "invoice_date": "2025-03-15",
            "service_description": "Cloud hosting services",
            "service_period": "2025-03-01 - 2025-03-31",
            "line_items_summary": "Hosting: 1200.00",
            "total_amount": 1452.0,
            "tax_amount": 252.0,
            "net_amount": "1,200.00",
            "currency": "EUR",
            "confidence_score": 0.95
        }"#;

        let e: InvoiceExtraction = serde_json::from_str(json).unwrap();
        assert!(e.is_invoice);
        assert_eq!(e.invoice_number.as_deref(), Some("INV-2025-001"));
        assert_eq!(e.net_amount, Some(1200.0));
        assert_eq!(e.confidence_score, 0.95);
    }

    #[test]
    fn test_extraction_with_missing_fields() {
        // 非发票文档：模型只返回 is_invoice 和 confidence_score
        let json = r#"{"is_invoice": false, "confidence_score": 0.9}"#;
        let e: InvoiceExtraction = serde_json::from_str(json).unwrap();
        assert!(!e.is_invoice);
        assert_eq!(e.invoice_number, None);
        assert_eq!(e.total_amount, None);
    }

    #[test]
    fn test_row_fields_order_matches_headers() {
        let row = InvoiceRow {
            bill_id: "26358814".to_string(),
            file_name: "invoice.pdf".to_string(),
            extraction: InvoiceExtraction {
                is_invoice: true,
                invoice_number: Some("A-1".to_string()),
                invoice_date: None,
                service_description: None,
                service_period: Some("2025-01".to_string()),
                line_items_summary: None,
                total_amount: Some(10.0),
                tax_amount: None,
                net_amount: Some(10.0),
                currency: Some("USD".to_string()),
                confidence_score: 0.8,
            },
            processing_time_seconds: 3.25,
            file_path: "data/invoices/26358814/invoice.pdf".to_string(),
        };

        let fields = row.to_fields();
        assert_eq!(fields.len(), InvoiceRow::HEADERS.len());
        assert_eq!(fields[0], "26358814");
        assert_eq!(fields[2], "true");
        // Excel 文本前缀
        assert_eq!(fields[6], "'2025-01");
        assert_eq!(fields[13], "3.2");
    }
}
