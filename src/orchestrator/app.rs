//! 主菜单 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，提供交互式主菜单并分发到各个任务：
//!
//! 1. **发票处理**：下载（RPA）、抽取（AI）、上传
//! 2. **计提分析**：按月份分析、上传
//! 3. **工具**：数仓连接测试
//!
//! 菜单和确认提示直接走标准输出，任务执行过程的日志走 tracing。
//! 任务出错只打印错误回到菜单，不退出程序。

use std::io::{self, Write};

use anyhow::Result;
use tracing::error;

use crate::config::Config;
use crate::clients::WarehouseClient;
use crate::orchestrator::accrual::{self, month_options, parse_month_label};
use crate::orchestrator::{download, extraction, upload};

/// 应用主结构
pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// 主菜单循环
    pub async fn run(&self) -> Result<()> {
        loop {
            print_menu();

            let choice = prompt("▶ 请选择 (0-6): ");
            let result = match choice.as_str() {
                "0" => {
                    println!("\n👋 再见!");
                    break;
                }
                "1" => self.download_invoices().await,
                "2" => self.extract_invoices().await,
                "3" => self.upload_invoices().await,
                "4" => self.analyze_accruals().await,
                "5" => self.upload_analysis().await,
                "6" => self.test_warehouse().await,
                other => {
                    println!("\n❌ 无效选项: {}，请输入 0-6", other);
                    Ok(())
                }
            };

            if let Err(e) = result {
                error!("任务执行出错: {:#}", e);
                println!("\n❌ 错误: {:#}", e);
            }

            if choice != "0" {
                prompt("\n⏸️  按回车返回主菜单...");
            }
        }

        Ok(())
    }

    async fn download_invoices(&self) -> Result<()> {
        println!("\n将从数仓视图读取待下载的 bill，在已登录的浏览器会话里抓取附件。");
        println!("已下载过的 bill 会自动跳过。下载是顺序执行的（单个浏览器会话）。");

        if !confirm("\n▶ 继续? (yes/no): ") {
            println!("❌ 已取消");
            return Ok(());
        }

        download::run_invoice_download(&self.config).await
    }

    async fn extract_invoices(&self) -> Result<()> {
        println!("\n将用 AI 从已下载的发票中抽取结构化数据。");
        println!("数仓里已有记录的发票会自动跳过。");

        if !confirm("\n▶ 继续? (yes/no): ") {
            println!("❌ 已取消");
            return Ok(());
        }

        let workers = self.prompt_workers();
        extraction::run_invoice_extraction(&self.config, workers).await
    }

    async fn upload_invoices(&self) -> Result<()> {
        println!("\n📤 上传发票抽取结果");

        let Some(rows) = upload::load_invoice_results(&self.config)? else {
            println!("❌ 结果文件不存在，请先运行发票抽取");
            return Ok(());
        };
        if rows.is_empty() {
            println!("⚠️ 结果文件是空的，没有可上传的行");
            return Ok(());
        }

        if !confirm(&format!("\n📋 上传 {} 行到数仓? (yes/no): ", rows.len())) {
            println!("❌ 上传已取消");
            return Ok(());
        }

        upload::upload_invoice_results(&self.config, rows).await?;
        Ok(())
    }

    async fn analyze_accruals(&self) -> Result<()> {
        println!("\n将逐个分析 PO 行，判断是否需要计提。");
        println!("所选月份已分析过的 PO 行会自动跳过。");

        if !confirm("\n▶ 继续? (yes/no): ") {
            println!("❌ 已取消");
            return Ok(());
        }

        let Some(month) = self.pick_month() else {
            println!("❌ 已取消");
            return Ok(());
        };

        let workers = self.prompt_workers();
        accrual::run_accrual_analysis(&self.config, &month, workers).await
    }

    async fn upload_analysis(&self) -> Result<()> {
        println!("\n📤 上传计提分析结果");

        let Some(rows) = upload::load_analysis_results(&self.config)? else {
            println!("❌ 结果文件不存在，请先运行计提分析");
            return Ok(());
        };
        if rows.is_empty() {
            println!("⚠️ 结果文件是空的，没有可上传的行");
            return Ok(());
        }

        if !confirm(&format!("\n📋 上传 {} 行到数仓? (yes/no): ", rows.len())) {
            println!("❌ 上传已取消");
            return Ok(());
        }

        upload::upload_analysis_results(&self.config, rows).await?;
        Ok(())
    }

    async fn test_warehouse(&self) -> Result<()> {
        println!("\n🔌 测试数仓连接");
        println!("🔄 正在连接 Snowflake...");

        let warehouse = WarehouseClient::new(&self.config)?;
        let version = warehouse.test_connection().await?;

        println!("✅ 连接成功!");
        println!("   版本: {}", version);
        println!("   数据库: {}", self.config.snowflake_database);
        println!("   Schema: {}", self.config.snowflake_schema);
        Ok(())
    }

    /// 询问并发数，回车用默认值
    fn prompt_workers(&self) -> usize {
        let input = prompt(&format!(
            "▶ 并发数 (默认 {}, 回车使用默认): ",
            self.config.max_workers
        ));
        if input.is_empty() {
            return self.config.max_workers;
        }
        // 0 会原样传下去，由批处理器在开工前拒绝；解析不了的输入退回默认值
        match input.parse() {
            Ok(workers) => workers,
            Err(_) => {
                println!("⚠️ 无法识别的并发数 '{}'，使用默认值 {}", input, self.config.max_workers);
                self.config.max_workers
            }
        }
    }

    /// 选择分析月份；输入空行取消
    fn pick_month(&self) -> Option<String> {
        println!("\n📅 选择分析月份");
        println!("{}", "=".repeat(60));

        let options = month_options();
        for (index, month) in options.iter().enumerate() {
            let marker = if index == 3 { "  ← 当前月" } else { "" };
            println!("  {}. {}{}", index + 1, month, marker);
        }
        println!("  8. 自定义月份");
        println!("{}", "=".repeat(60));

        loop {
            let choice = prompt("\n▶ 请选择 (1-8): ");
            if choice.is_empty() {
                return None;
            }

            match choice.parse::<usize>() {
                Ok(n @ 1..=7) => {
                    let selected = options[n - 1].clone();
                    println!("✓ 已选择: {}", selected);
                    return Some(selected);
                }
                Ok(8) => {
                    let custom = prompt("\n▶ 输入月份 (如 'October 2025'): ");
                    if custom.is_empty() {
                        return None;
                    }
                    match parse_month_label(&custom) {
                        Some(label) => {
                            println!("✓ 已选择: {}", label);
                            return Some(label);
                        }
                        None => println!("❌ 格式不正确，请用 'October 2025' 这样的格式"),
                    }
                }
                _ => println!("❌ 无效选择，请输入 1-8"),
            }
        }
    }
}

// ========== 菜单辅助函数 ==========

fn print_menu() {
    println!("\n{}", "=".repeat(60));
    println!("📊 计提自动化 - 主菜单");
    println!("{}", "=".repeat(60));

    println!("\n🔹 发票处理");
    println!("  1. 从 NetSuite 下载发票 (RPA)");
    println!("  2. AI 抽取发票数据");
    println!("  3. 上传抽取结果到数仓");

    println!("\n🔹 计提分析");
    println!("  4. 按月份运行计提分析");
    println!("  5. 上传分析结果到数仓");

    println!("\n🔹 工具");
    println!("  6. 测试数仓连接");

    println!("\n🔹 退出");
    println!("  0. 退出程序");

    println!("\n{}", "=".repeat(60));
}

fn prompt(message: &str) -> String {
    print!("{}", message);
    io::stdout().flush().ok();

    let mut line = String::new();
    io::stdin().read_line(&mut line).ok();
    line.trim().to_string()
}

fn confirm(message: &str) -> bool {
    matches!(prompt(message).to_lowercase().as_str(), "yes" | "y")
}
