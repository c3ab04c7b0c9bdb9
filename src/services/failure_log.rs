//! 下载失败记录服务
//!
//! 只负责"把下载失败的 bill 追加到记录文件"这一件事，供人工跟进重跑

use std::fs::OpenOptions;
use std::io::Write;

use chrono::Local;
use tracing::debug;

use crate::error::{AppError, Result};

/// 失败记录服务
pub struct FailureLog {
    file_path: String,
}

impl FailureLog {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            file_path: path.into(),
        }
    }

    /// 追加一条失败记录
    pub fn record(&self, bill_id: &str, reason: &str) -> Result<()> {
        debug!("记录下载失败: bill {} ({})", bill_id, reason);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .map_err(|e| AppError::file(&self.file_path, e))?;

        let line = format!(
            "{} | bill {} | {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            bill_id,
            reason
        );
        file.write_all(line.as_bytes())
            .map_err(|e| AppError::file(&self.file_path, e))?;

        Ok(())
    }
}
