//! 流程层（Workflow Layer）
//!
//! 定义"单个条目"的完整处理流程，每个流程实现同一套
//! `ItemProcessor` 契约，由编排层的批处理器统一调度：
//!
//! - `invoice_flow`：一张发票文件的抽取流程
//! - `accrual_flow`：一个 PO 行的计提分析流程
//!
//! 流程只依赖业务能力（LLM 客户端、提示词库），不持有批处理状态。

pub mod accrual_flow;
pub mod invoice_flow;

pub use accrual_flow::AccrualFlow;
pub use invoice_flow::{scan_invoice_files, InvoiceFlow, InvoiceSource};
