//! 发票抽取流程 - 流程层
//!
//! 定义"一张发票文件"的完整处理流程：
//! 读取文档内容 → 渲染提示词 → 调用视觉模型 → 解析结构化 JSON
//!
//! 条目标识为 "bill_id/file_name"，文件清单在派发前一次性建好。
//! 同一个标识重复处理是安全的（唯一的例外：被判定为非发票的
//! 文件会被删除，和人工流程的处理方式保持一致）。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::clients::{extract_json, LlmClient};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{InvoiceExtraction, InvoiceRow};
use crate::orchestrator::batch_runner::{ItemProcessor, TokenUsage};
use crate::prompts::PromptLibrary;

/// 提示词模板名
const PROMPT_NAME: &str = "invoice_extraction";

/// 发给模型的文本内容上限（字符）
const MAX_TEXT_CHARS: usize = 8000;

/// 一个待处理的发票文件
#[derive(Debug, Clone)]
pub struct InvoiceSource {
    pub bill_id: String,
    pub file_name: String,
    pub path: PathBuf,
}

impl InvoiceSource {
    /// 条目标识："bill_id/file_name"，与数仓里的已处理记录对应
    pub fn id(&self) -> String {
        format!("{}/{}", self.bill_id, self.file_name)
    }
}

/// 文档内容：图片走 Vision API，PDF / 文本走文字内容
enum DocumentContent {
    Image { data_url: String },
    Text { content: String },
}

/// 发票抽取流程
pub struct InvoiceFlow {
    llm: LlmClient,
    prompts: Arc<PromptLibrary>,
    sources: HashMap<String, InvoiceSource>,
}

impl InvoiceFlow {
    pub fn new(
        config: &Config,
        prompts: Arc<PromptLibrary>,
        sources: Vec<InvoiceSource>,
    ) -> Self {
        Self {
            llm: LlmClient::new(config),
            prompts,
            sources: sources.into_iter().map(|s| (s.id(), s)).collect(),
        }
    }

    /// 模板预检：变量缺失属于配置错误，必须在批处理开始前暴露
    pub fn preflight(&self) -> Result<()> {
        let mut vars = HashMap::new();
        vars.insert("file_name", "preflight.pdf".to_string());
        vars.insert("text_content", String::new());
        self.prompts.render(PROMPT_NAME, &vars)?;
        Ok(())
    }

    /// 解析模型响应为发票结构
    fn parse_extraction(&self, content: &str) -> Result<InvoiceExtraction> {
        serde_json::from_str(extract_json(content))
            .map_err(|e| AppError::parse("发票抽取响应", e))
    }
}

#[async_trait]
impl ItemProcessor for InvoiceFlow {
    type Output = InvoiceRow;

    async fn process(&self, id: &str) -> Result<(InvoiceRow, TokenUsage)> {
        let source = self
            .sources
            .get(id)
            .ok_or_else(|| AppError::Config(format!("条目不在文件清单中: {}", id)))?;

        let started = std::time::Instant::now();
        debug!("开始处理发票: {}", id);

        // 读取文档内容
        let content = load_document(&source.path).await?;
        let (text_content, images) = match &content {
            DocumentContent::Image { data_url } => (String::new(), Some(vec![data_url.clone()])),
            DocumentContent::Text { content } => (content.clone(), None),
        };

        // 渲染提示词
        let mut vars = HashMap::new();
        vars.insert("file_name", source.file_name.clone());
        vars.insert("text_content", text_content);
        let prompt = self.prompts.render(PROMPT_NAME, &vars)?;

        // 调用模型并解析
        let reply = self.llm.complete(&prompt, images.as_deref()).await?;
        let extraction = self.parse_extraction(&reply.content)?;

        // 非发票文档：删除文件，避免反复进入候选列表
        if !extraction.is_invoice {
            warn!("⚠️ {} 不是发票，删除文件", id);
            if let Err(e) = tokio::fs::remove_file(&source.path).await {
                warn!("删除非发票文件失败 {}: {}", source.path.display(), e);
            } else {
                info!("✓ 已删除非发票文件: {}", source.file_name);
            }
        }

        let row = InvoiceRow {
            bill_id: source.bill_id.clone(),
            file_name: source.file_name.clone(),
            extraction,
            processing_time_seconds: started.elapsed().as_secs_f64(),
            file_path: source.path.to_string_lossy().to_string(),
        };

        Ok((row, reply.usage))
    }
}

/// 读取文档内容
///
/// - 图片：读字节转 base64 data URL
/// - PDF：用系统的 pdftotext 取文字层
/// - 纯文本：直接读取
/// - 其他格式（xlsx / docx 等）不支持，记为条目失败
async fn load_document(path: &Path) -> Result<DocumentContent> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "bmp" => {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| AppError::file(path, e))?;
            let data_url = format!(
                "data:{};base64,{}",
                mime_for_ext(&ext),
                BASE64.encode(&bytes)
            );
            Ok(DocumentContent::Image { data_url })
        }
        "pdf" => {
            let text = pdf_text(path).await?;
            Ok(DocumentContent::Text {
                content: truncate_chars(&text, MAX_TEXT_CHARS),
            })
        }
        "txt" => {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| AppError::file(path, e))?;
            Ok(DocumentContent::Text {
                content: truncate_chars(&text, MAX_TEXT_CHARS),
            })
        }
        other => Err(AppError::parse(
            "文档类型",
            format!("不支持的文件格式: .{}", other),
        )),
    }
}

/// 用 pdftotext 抽取 PDF 文字层
async fn pdf_text(path: &Path) -> Result<String> {
    let output = Command::new("pdftotext")
        .arg("-layout")
        .arg(path)
        .arg("-")
        .output()
        .await
        .map_err(|e| AppError::file(path, e))?;

    if !output.status.success() {
        return Err(AppError::parse(
            "PDF 文字抽取",
            format!(
                "pdftotext 退出码 {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn mime_for_ext(ext: &str) -> &'static str {
    match ext {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        text.chars().take(max_chars).collect()
    } else {
        text.to_string()
    }
}

/// 扫描发票目录，收集所有待处理文件（每个 bill 一个子目录）
///
/// 按 bill / 文件名排序，保证候选列表在多次运行之间顺序稳定
pub fn scan_invoice_files(invoices_dir: &Path) -> Result<Vec<InvoiceSource>> {
    let mut sources = Vec::new();

    let entries = std::fs::read_dir(invoices_dir).map_err(|e| AppError::file(invoices_dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| AppError::file(invoices_dir, e))?;
        let bill_dir = entry.path();
        if !bill_dir.is_dir() {
            continue;
        }
        let bill_id = entry.file_name().to_string_lossy().to_string();

        let files = std::fs::read_dir(&bill_dir).map_err(|e| AppError::file(&bill_dir, e))?;
        for file in files {
            let file = file.map_err(|e| AppError::file(&bill_dir, e))?;
            let path = file.path();
            if !path.is_file() {
                continue;
            }
            sources.push(InvoiceSource {
                bill_id: bill_id.clone(),
                file_name: file.file_name().to_string_lossy().to_string(),
                path,
            });
        }
    }

    sources.sort_by(|a, b| a.id().cmp(&b.id()));
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for_ext() {
        assert_eq!(mime_for_ext("png"), "image/png");
        assert_eq!(mime_for_ext("jpeg"), "image/jpeg");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 10), "abcdef");
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        // 多字节字符按字符数截断
        assert_eq!(truncate_chars("发票内容", 2), "发票");
    }

    #[test]
    fn test_source_id_format() {
        let source = InvoiceSource {
            bill_id: "26358814".to_string(),
            file_name: "invoice.pdf".to_string(),
            path: PathBuf::from("data/invoices/26358814/invoice.pdf"),
        };
        assert_eq!(source.id(), "26358814/invoice.pdf");
    }

    #[test]
    fn test_load_document_rejects_unsupported() {
        let result = tokio_test::block_on(load_document(Path::new("somewhere/invoice.xlsx")));
        match result {
            Err(AppError::Parse { message, .. }) => assert!(message.contains("xlsx")),
            other => panic!("应该拒绝 xlsx, 实际: {:?}", other.is_ok()),
        }
    }

    #[tokio::test]
    async fn test_load_document_reads_text() {
        let path = std::env::temp_dir().join(format!("inv_test_{}.txt", std::process::id()));
        tokio::fs::write(&path, "Invoice No. 42").await.unwrap();

        match load_document(&path).await.unwrap() {
            DocumentContent::Text { content } => assert_eq!(content, "Invoice No. 42"),
            DocumentContent::Image { .. } => panic!("txt 不应识别为图片"),
        }

        tokio::fs::remove_file(&path).await.ok();
    }

    #[test]
    fn test_scan_orders_by_bill_then_file() {
        let dir = std::env::temp_dir().join(format!("scan_test_{}", std::process::id()));
        std::fs::create_dir_all(dir.join("222")).unwrap();
        std::fs::create_dir_all(dir.join("111")).unwrap();
        std::fs::write(dir.join("222/b.pdf"), b"x").unwrap();
        std::fs::write(dir.join("111/z.pdf"), b"x").unwrap();
        std::fs::write(dir.join("111/a.pdf"), b"x").unwrap();

        let sources = scan_invoice_files(&dir).unwrap();
        let ids: Vec<String> = sources.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["111/a.pdf", "111/z.pdf", "222/b.pdf"]);

        std::fs::remove_dir_all(&dir).ok();
    }
}
