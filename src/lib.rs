//! # Accrual Automation
//!
//! 财务后台自动化：下载供应商发票、用视觉模型抽取发票数据、
//! 用模型判断 PO 行的月度计提，所有输入输出都落在 Snowflake 数仓。
//!
//! ## 架构设计
//!
//! 本系统采用严格的分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 navigate() / eval() 能力
//!
//! ### ② 能力层（Clients / Services）
//! - `clients/` - LLM 调用、数仓读写
//! - `services/` - CSV 落盘、附件下载、失败记录
//! - 只处理单次调用，不关心批处理流程
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个条目"的完整处理流程
//! - `InvoiceFlow` - 一张发票文件的抽取流程
//! - `AccrualFlow` - 一个 PO 行的计提分析流程
//! - 两个流程实现同一套 `ItemProcessor` 契约
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_runner` - 批量工作协调器（增量 + 并发 + 失败隔离）
//! - `orchestrator/extraction` / `accrual` / `download` / `upload` - 任务编排
//! - `orchestrator/app` - 交互式主菜单
//!
//! ## 模块结构

pub mod browser;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::connect_to_browser_and_page;
pub use config::Config;
pub use error::{AppError, Result};
pub use infrastructure::JsExecutor;
pub use orchestrator::{compute_delta, App, BatchReport, BatchRunner, ItemProcessor};
pub use workflow::{AccrualFlow, InvoiceFlow};
