//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和任务调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_runner` - 批量工作协调器（核心）
//! - 增量计算（候选列表减去已完成集合）
//! - 控制并发数量（Semaphore）
//! - 条目级失败隔离和指标汇总
//!
//! ### 任务模块
//! - `download` - 发票下载（RPA，顺序执行）
//! - `extraction` - 发票抽取（并发批处理）
//! - `accrual` - 计提分析（并发批处理）
//! - `upload` - 结果上传（用户显式触发）
//!
//! ### `app` - 交互式主菜单
//!
//! ## 层次关系
//!
//! ```text
//! app (菜单分发)
//!     ↓
//! extraction / accrual / download / upload (任务编排)
//!     ↓
//! batch_runner (批处理 Vec<Identifier>)
//!     ↓
//! workflow (处理单个条目)
//!     ↓
//! clients / services (能力层：llm / warehouse / csv / downloader)
//!     ↓
//! infrastructure (基础设施：JsExecutor)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：batch_runner 管批量，workflow 管单个条目
//! 2. **两段式落库**：批处理只写 CSV，上传由用户审核后单独触发
//! 3. **失败隔离**：条目级错误不中断批次，汇总后供手工重跑

pub mod accrual;
pub mod app;
pub mod batch_runner;
pub mod download;
pub mod extraction;
pub mod upload;

pub use app::App;
pub use batch_runner::{compute_delta, BatchReport, BatchRunner, ItemOutcome, ItemProcessor, TokenUsage};
