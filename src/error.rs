//! 应用程序错误类型
//!
//! 错误分为两类：
//! - 配置类错误（`Config` / `MissingVariable`）：在批处理开始前抛出，直接终止本次运行
//! - 条目级错误（其余变体）：在单个条目边界被捕获，记录为 Failure，批处理继续

use std::path::PathBuf;
use thiserror::Error;

/// 应用程序错误
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误（并发数非法、环境变量缺失等），批处理开始前直接失败
    #[error("配置错误: {0}")]
    Config(String),

    /// 提示词模板缺少变量，属于配置类错误
    #[error("提示词模板 {template} 缺少变量: {variable}")]
    MissingVariable { template: String, variable: String },

    /// 数仓查询 / 写入失败
    #[error("数仓操作失败 ({operation}): {message}")]
    Warehouse { operation: String, message: String },

    /// LLM API 调用失败（网络、限流或模型拒答，不再细分）
    #[error("LLM API 调用失败 (模型: {model}): {message}")]
    Llm { model: String, message: String },

    /// 模型响应无法按预期结构解析
    #[error("响应解析失败 ({what}): {message}")]
    Parse { what: String, message: String },

    /// 文件操作失败
    #[error("文件操作失败 ({}): {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 浏览器 / 页面操作失败
    #[error("浏览器操作失败: {0}")]
    Browser(String),
}

impl AppError {
    /// 创建数仓错误
    pub fn warehouse(operation: impl Into<String>, message: impl ToString) -> Self {
        AppError::Warehouse {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// 创建 LLM 调用错误
    pub fn llm(model: impl Into<String>, message: impl ToString) -> Self {
        AppError::Llm {
            model: model.into(),
            message: message.to_string(),
        }
    }

    /// 创建解析错误
    pub fn parse(what: impl Into<String>, message: impl ToString) -> Self {
        AppError::Parse {
            what: what.into(),
            message: message.to_string(),
        }
    }

    /// 创建文件错误
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::File {
            path: path.into(),
            source,
        }
    }
}

/// 应用程序结果类型
pub type Result<T> = std::result::Result<T, AppError>;
