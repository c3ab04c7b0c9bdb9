//! CSV 结果落盘服务
//!
//! 批处理的成功结果先写成 CSV 供人工审核，确认无误后再单独触发上传。
//! 每次运行开始时清空重写，带 UTF-8 BOM 方便 Excel 直接打开。

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{AppError, Result};

/// CSV 写入服务
///
/// 职责：
/// - 创建结果文件（清空旧内容）并写入表头
/// - 逐行追加成功条目
/// - 只写成功结果，失败条目不进这个文件
pub struct CsvSink {
    path: PathBuf,
    column_count: usize,
}

impl CsvSink {
    /// 创建结果文件，写入 BOM 和表头
    pub fn create(path: impl Into<PathBuf>, headers: &[&str]) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::file(parent, e))?;
        }

        let mut file = File::create(&path).map_err(|e| AppError::file(&path, e))?;
        file.write_all("\u{feff}".as_bytes())
            .map_err(|e| AppError::file(&path, e))?;

        let header_line: Vec<String> = headers.iter().map(|h| escape_field(h)).collect();
        writeln!(file, "{}", header_line.join(",")).map_err(|e| AppError::file(&path, e))?;

        debug!("CSV 文件已创建: {}", path.display());

        Ok(Self {
            path,
            column_count: headers.len(),
        })
    }

    /// 追加一行
    pub fn append(&self, fields: &[String]) -> Result<()> {
        if fields.len() != self.column_count {
            return Err(AppError::Config(format!(
                "CSV 列数不匹配: 期望 {}, 实际 {}",
                self.column_count,
                fields.len()
            )));
        }

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| AppError::file(&self.path, e))?;

        let line: Vec<String> = fields.iter().map(|f| escape_field(f)).collect();
        writeln!(file, "{}", line.join(",")).map_err(|e| AppError::file(&self.path, e))?;

        Ok(())
    }
}

/// 读回结果文件，按表头映射为"列名 → 值"
///
/// 上传步骤用：人工审核（可能用 Excel 改过）之后以文件内容为准
pub fn read_rows(path: impl AsRef<Path>) -> Result<Vec<HashMap<String, String>>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| AppError::file(path, e))?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

    let mut records = parse_records(content);
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let headers = records.remove(0);
    let rows = records
        .into_iter()
        .filter(|fields| fields.iter().any(|f| !f.is_empty()))
        .map(|fields| {
            headers
                .iter()
                .cloned()
                .zip(fields.into_iter().chain(std::iter::repeat(String::new())))
                .collect()
        })
        .collect();

    Ok(rows)
}

/// 字段转义：含逗号、引号或换行时加引号包裹
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// 解析 CSV 记录（引号包裹的字段可以跨行）
fn parse_records(content: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;

    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
        } else {
            match c {
                '"' => in_quotes = true,
                ',' => {
                    record.push(std::mem::take(&mut field));
                }
                '\r' => {}
                '\n' => {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                _ => field.push(c),
            }
        }
    }

    // 文件末尾没有换行的最后一条记录
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_csv_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("csv_sink_test_{}_{}.csv", std::process::id(), tag))
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let path = temp_csv_path("roundtrip");
        let sink = CsvSink::create(&path, &["id", "summary", "amount"]).unwrap();

        sink.append(&[
            "PO1:1".to_string(),
            "simple".to_string(),
            "100".to_string(),
        ])
        .unwrap();
        sink.append(&[
            "PO2:1".to_string(),
            "has, comma and \"quotes\"\nand a newline".to_string(),
            "2500.5".to_string(),
        ])
        .unwrap();

        let rows = read_rows(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], "PO1:1");
        assert_eq!(rows[1]["summary"], "has, comma and \"quotes\"\nand a newline");
        assert_eq!(rows[1]["amount"], "2500.5");
    }

    #[test]
    fn test_create_truncates_previous_run() {
        let path = temp_csv_path("truncate");

        let sink = CsvSink::create(&path, &["a"]).unwrap();
        sink.append(&["old".to_string()]).unwrap();

        let sink = CsvSink::create(&path, &["a"]).unwrap();
        sink.append(&["new".to_string()]).unwrap();

        let rows = read_rows(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["a"], "new");
    }

    #[test]
    fn test_column_count_mismatch_is_error() {
        let path = temp_csv_path("mismatch");
        let sink = CsvSink::create(&path, &["a", "b"]).unwrap();
        let result = sink.append(&["only-one".to_string()]);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }

    #[test]
    fn test_read_empty_file_gives_no_rows() {
        let path = temp_csv_path("empty");
        CsvSink::create(&path, &["a", "b"]).unwrap();
        let rows = read_rows(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(rows.is_empty());
    }
}
