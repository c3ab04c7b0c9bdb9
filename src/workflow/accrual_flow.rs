//! 计提分析流程 - 流程层
//!
//! 定义"一个 PO 行"的完整分析流程：
//! 取出预先加载的上下文 → 组装分析数据 → 渲染提示词 → 调用模型 → 解析判断
//!
//! 条目标识为 PO 行的 LOOKUP_KEY。PO 行和关联账单在批处理开始前
//! 一次性从数仓取回，分析过程中只查内存，不再访问数仓。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use serde_json::json;
use tracing::debug;

use crate::clients::{extract_json, LlmClient};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{AccrualVerdict, DecisionRow, PoLine, RelatedBill};
use crate::orchestrator::batch_runner::{ItemProcessor, TokenUsage};
use crate::prompts::PromptLibrary;

/// 提示词模板名
const PROMPT_NAME: &str = "accrual_analysis";

/// 计提分析流程
pub struct AccrualFlow {
    llm: LlmClient,
    prompts: Arc<PromptLibrary>,
    /// 分析月份，如 "February 2025"
    analysis_month: String,
    po_lines: HashMap<String, PoLine>,
    bills_by_po: HashMap<String, Vec<RelatedBill>>,
}

impl AccrualFlow {
    pub fn new(
        config: &Config,
        prompts: Arc<PromptLibrary>,
        analysis_month: String,
        po_lines: Vec<PoLine>,
        bills_by_po: HashMap<String, Vec<RelatedBill>>,
    ) -> Self {
        Self {
            llm: LlmClient::new(config),
            prompts,
            analysis_month,
            po_lines: po_lines
                .into_iter()
                .map(|line| (line.lookup_key.clone(), line))
                .collect(),
            bills_by_po,
        }
    }

    /// 模板预检：变量缺失属于配置错误，必须在批处理开始前暴露
    pub fn preflight(&self) -> Result<()> {
        let mut vars = HashMap::new();
        vars.insert("analysis_data", "{}".to_string());
        vars.insert("current_month", self.analysis_month.clone());
        self.prompts.render(PROMPT_NAME, &vars)?;
        Ok(())
    }

    /// 组装喂给模型的分析数据
    fn analysis_data(&self, po_line: &PoLine, bills: &[RelatedBill]) -> Result<String> {
        let data = json!({
            "current_analysis_month": self.analysis_month,
            "po_line": po_line,
            "related_bills": bills,
            "bill_count": bills.len(),
        });
        serde_json::to_string_pretty(&data).map_err(|e| AppError::parse("分析数据", e))
    }

    /// 解析模型响应为计提判断
    fn parse_verdict(&self, content: &str) -> Result<AccrualVerdict> {
        serde_json::from_str(extract_json(content))
            .map_err(|e| AppError::parse("计提判断响应", e))
    }
}

#[async_trait]
impl ItemProcessor for AccrualFlow {
    type Output = DecisionRow;

    async fn process(&self, id: &str) -> Result<(DecisionRow, TokenUsage)> {
        let po_line = self
            .po_lines
            .get(id)
            .ok_or_else(|| AppError::Config(format!("条目不在 PO 行清单中: {}", id)))?;

        let empty = Vec::new();
        let bills = self.bills_by_po.get(&po_line.po_number).unwrap_or(&empty);

        debug!(
            "分析 PO {} ({}), 关联账单 {} 条",
            po_line.po_number,
            id,
            bills.len()
        );

        // 渲染提示词
        let mut vars = HashMap::new();
        vars.insert("analysis_data", self.analysis_data(po_line, bills)?);
        vars.insert("current_month", self.analysis_month.clone());
        let prompt = self.prompts.render(PROMPT_NAME, &vars)?;

        // 调用模型并解析
        let reply = self.llm.complete(&prompt, None).await?;
        let verdict = self.parse_verdict(&reply.content)?;

        let row = DecisionRow {
            po_line: po_line.clone(),
            verdict,
            analysis_month: self.analysis_month.clone(),
            analyzed_at: Local::now().to_rfc3339(),
        };

        Ok((row, reply.usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_flow() -> AccrualFlow {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static COUNTER: AtomicUsize = AtomicUsize::new(0);

        let config = Config::default();

        let dir = std::env::temp_dir().join(format!(
            "accrual_flow_test_{}_{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("accrual_analysis.toml"),
            r#"
name = "accrual_analysis"
model = "gpt-4o"
system_prompt = "You are an accrual analyst."
user_prompt_template = "Month: {current_month}\nData:\n{analysis_data}"
"#,
        )
        .unwrap();
        let prompts = Arc::new(PromptLibrary::load(&dir).unwrap());
        std::fs::remove_dir_all(&dir).ok();

        let po_line: PoLine = serde_json::from_str(
            r#"{"LOOKUP_KEY": "PO12345:7", "PO_NUMBER": "PO12345", "VENDOR_NAME": "Acme GmbH"}"#,
        )
        .unwrap();

        let bill: RelatedBill = serde_json::from_str(
            r#"{"PO_NUMBER": "PO12345", "BILL_ID": "26358814", "AMOUNT": "3000"}"#,
        )
        .unwrap();

        let mut bills_by_po = HashMap::new();
        bills_by_po.insert("PO12345".to_string(), vec![bill]);

        AccrualFlow::new(
            &config,
            prompts,
            "February 2025".to_string(),
            vec![po_line],
            bills_by_po,
        )
    }

    #[test]
    fn test_preflight_passes_with_bundled_vars() {
        sample_flow().preflight().unwrap();
    }

    #[test]
    fn test_analysis_data_includes_context() {
        let flow = sample_flow();
        let po_line = flow.po_lines.get("PO12345:7").unwrap();
        let bills = flow.bills_by_po.get("PO12345").unwrap();

        let data = flow.analysis_data(po_line, bills).unwrap();
        assert!(data.contains("\"current_analysis_month\": \"February 2025\""));
        assert!(data.contains("\"PO_NUMBER\": \"PO12345\""));
        assert!(data.contains("\"bill_count\": 1"));
    }

    #[test]
    fn test_parse_verdict_with_fenced_json() {
        let flow = sample_flow();
        let content = "```json\n{\"needs_accrual\": true, \"accrual_amount\": 3000, \"reasoning\": \"r\", \"short_summary\": \"s\", \"confidence\": 0.8}\n```";
        let verdict = flow.parse_verdict(content).unwrap();
        assert!(verdict.needs_accrual);
        assert_eq!(verdict.accrual_amount, 3000.0);
    }

    #[test]
    fn test_parse_verdict_rejects_garbage() {
        let flow = sample_flow();
        assert!(matches!(
            flow.parse_verdict("I cannot analyze this."),
            Err(AppError::Parse { .. })
        ));
    }
}
