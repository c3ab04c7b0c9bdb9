//! 发票下载服务
//!
//! 在已登录的 NetSuite 浏览器会话里抓取 bill 的附件并保存到本地，
//! 每个 bill 一个子目录。下载是顺序执行的（单个浏览器会话），
//! 重试也在这一层处理（每个 bill 最多再试一次），批处理核心不做重试。

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::infrastructure::JsExecutor;

/// 页面里收集到的附件链接
#[derive(Debug, Deserialize)]
struct Attachment {
    name: String,
    url: String,
}

/// 页面内 fetch 的返回
#[derive(Debug, Deserialize)]
struct FetchResult {
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// 发票下载服务
pub struct InvoiceDownloader {
    executor: JsExecutor,
    base_url: String,
    invoices_dir: PathBuf,
}

impl InvoiceDownloader {
    pub fn new(executor: JsExecutor, config: &Config) -> Self {
        Self {
            executor,
            base_url: config.netsuite_base_url.clone(),
            invoices_dir: PathBuf::from(&config.invoices_dir),
        }
    }

    /// 下载一个 bill 的全部附件，返回保存的文件名
    ///
    /// 失败时整体重试一次；两次都失败才向上报错
    pub async fn download_bill(&self, bill_id: &str) -> Result<Vec<String>> {
        match self.try_download_bill(bill_id).await {
            Ok(files) => Ok(files),
            Err(first) => {
                warn!("bill {} 下载失败, 重试一次: {}", bill_id, first);
                self.try_download_bill(bill_id).await
            }
        }
    }

    async fn try_download_bill(&self, bill_id: &str) -> Result<Vec<String>> {
        let url = self.bill_url(bill_id);
        self.executor.navigate(&url).await?;

        let attachments = self.list_attachments().await?;
        if attachments.is_empty() {
            info!("bill {} 没有附件", bill_id);
            return Ok(Vec::new());
        }

        info!("bill {} 找到 {} 个附件", bill_id, attachments.len());

        let bill_dir = self.invoices_dir.join(bill_id);
        tokio::fs::create_dir_all(&bill_dir)
            .await
            .map_err(|e| AppError::file(&bill_dir, e))?;

        let mut saved = Vec::new();
        for attachment in attachments {
            let file_name = sanitize_file_name(&attachment.name);
            let target = bill_dir.join(&file_name);

            let bytes = self.fetch_attachment(&attachment.url).await?;
            tokio::fs::write(&target, &bytes)
                .await
                .map_err(|e| AppError::file(&target, e))?;

            info!("  ✓ 已保存: {} ({} 字节)", file_name, bytes.len());
            saved.push(file_name);
        }

        Ok(saved)
    }

    fn bill_url(&self, bill_id: &str) -> String {
        format!(
            "{}/app/accounting/transactions/vendbill.nl?id={}",
            self.base_url, bill_id
        )
    }

    /// 收集页面上 File Cabinet 的附件链接
    async fn list_attachments(&self) -> Result<Vec<Attachment>> {
        let js_code = r#"
        (() => {
            const links = Array.from(document.querySelectorAll("a[href*='/core/media/media.nl']"));
            const seen = new Set();
            const files = [];
            for (const a of links) {
                if (!a.href || seen.has(a.href)) continue;
                seen.add(a.href);
                const name = (a.textContent || '').trim() || a.href.split('/').pop();
                files.push({ name: name, url: a.href });
            }
            return files;
        })()
        "#;

        self.executor.eval_as(js_code).await
    }

    /// 在页面里 fetch 附件内容，以 base64 带回
    async fn fetch_attachment(&self, url: &str) -> Result<Vec<u8>> {
        let js_code = format!(
            r#"
            (async () => {{
                try {{
                    const response = await fetch({}, {{ credentials: 'include' }});
                    if (!response.ok) {{
                        return {{ error: 'HTTP ' + response.status }};
                    }}
                    const buffer = await response.arrayBuffer();
                    const bytes = new Uint8Array(buffer);
                    let binary = '';
                    const chunk = 0x8000;
                    for (let i = 0; i < bytes.length; i += chunk) {{
                        binary += String.fromCharCode.apply(null, bytes.subarray(i, i + chunk));
                    }}
                    return {{ data: btoa(binary) }};
                }} catch (error) {{
                    return {{ error: error.message }};
                }}
            }})()
            "#,
            serde_json::to_string(url)
                .map_err(|e| AppError::Browser(format!("附件 URL 序列化失败: {}", e)))?
        );

        let result: FetchResult = self.executor.eval_as(js_code).await?;

        if let Some(error) = result.error {
            return Err(AppError::Browser(format!("附件下载失败 ({}): {}", url, error)));
        }

        let data = result
            .data
            .ok_or_else(|| AppError::Browser(format!("附件下载返回为空: {}", url)))?;

        BASE64
            .decode(data.as_bytes())
            .map_err(|e| AppError::Browser(format!("附件内容解码失败: {}", e)))
    }
}

/// 检查某个 bill 是否已有本地文件（下载阶段的增量判断）
pub fn has_local_files(invoices_dir: &Path, bill_id: &str) -> bool {
    let bill_dir = invoices_dir.join(bill_id);
    match std::fs::read_dir(&bill_dir) {
        Ok(mut entries) => entries.any(|e| {
            e.map(|e| e.path().is_file()).unwrap_or(false)
        }),
        Err(_) => false,
    }
}

/// 去掉文件名里的路径分隔符和查询串
fn sanitize_file_name(name: &str) -> String {
    let name = name.split(['?', '#']).next().unwrap_or(name);
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "attachment".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("invoice.pdf"), "invoice.pdf");
        assert_eq!(sanitize_file_name("a/b\\c.pdf"), "a_b_c.pdf");
        assert_eq!(sanitize_file_name("media.nl?id=123"), "media.nl");
        assert_eq!(sanitize_file_name("  "), "attachment");
    }

    #[test]
    fn test_has_local_files() {
        let dir = std::env::temp_dir().join(format!("dl_test_{}", std::process::id()));
        std::fs::create_dir_all(dir.join("111")).unwrap();
        std::fs::create_dir_all(dir.join("222")).unwrap();
        std::fs::write(dir.join("111/invoice.pdf"), b"x").unwrap();

        assert!(has_local_files(&dir, "111"));
        assert!(!has_local_files(&dir, "222"));
        assert!(!has_local_files(&dir, "333"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
