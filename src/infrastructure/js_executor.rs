//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，暴露"导航"和"执行 JS"两个能力。
//! 下载服务通过它在已登录的 NetSuite 会话里抓取附件，
//! 本身不认识 bill / 发票这些业务概念。

use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::{AppError, Result};

/// JS 执行器
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于其他操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 导航到指定 URL 并等待加载完成
    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| AppError::Browser(format!("导航到 {} 失败: {}", url, e)))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| AppError::Browser(format!("等待页面加载失败: {}", e)))?;
        Ok(())
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue> {
        let result = self
            .page
            .evaluate(js_code.into())
            .await
            .map_err(|e| AppError::Browser(format!("执行脚本失败: {}", e)))?;
        let json_value = result
            .into_value()
            .map_err(|e| AppError::Browser(format!("脚本返回值解析失败: {}", e)))?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> Result<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)
            .map_err(|e| AppError::Browser(format!("脚本返回值解析失败: {}", e)))?;
        Ok(typed_value)
    }
}
