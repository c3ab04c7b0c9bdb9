//! 批量工作协调器 - 编排层核心
//!
//! ## 职责
//!
//! 发票抽取和计提分析共用同一套批处理骨架，本模块就是这套骨架：
//!
//! 1. **增量计算**：`compute_delta` 从候选列表中剔除已处理的条目
//! 2. **并发控制**：使用 Semaphore 限制同时执行的条目数量
//! 3. **失败隔离**：单个条目失败只记录为 Failure，绝不影响其他条目
//! 4. **指标汇总**：成功条目的 token 用量和耗时累加进最终报告
//! 5. **完整返回**：所有条目都有结果之后才返回，不支持中途退出
//!
//! ## 设计特点
//!
//! - 协调器自身不做重试：模型调用失败记录后继续下一条，失败条目
//!   可以安全地重新运行（处理器是幂等的）
//! - 等待模型响应期间不持有任何共享锁
//! - 可选的单条目超时，超时同样记录为 Failure

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{error, info};

use crate::error::{AppError, Result};

/// 单次模型调用的 token 用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
    pub total: u32,
}

/// 成功条目的指标：token 用量 + 实际耗时
#[derive(Debug, Clone, Copy)]
pub struct ItemMetrics {
    pub tokens: TokenUsage,
    pub elapsed: Duration,
}

/// 单个条目的处理结果
#[derive(Debug)]
pub enum ItemOutcome<T> {
    /// 处理成功，带结构化数据和指标
    Success {
        id: String,
        payload: T,
        metrics: ItemMetrics,
    },
    /// 处理失败，只记录标识和错误描述（没有指标）
    Failure { id: String, error: String },
}

impl<T> ItemOutcome<T> {
    pub fn id(&self) -> &str {
        match self {
            ItemOutcome::Success { id, .. } => id,
            ItemOutcome::Failure { id, .. } => id,
        }
    }
}

/// 条目处理器契约
///
/// 两个调用点（发票抽取、计提分析）各自实现：
/// - 输入是一个条目标识，所需上下文在派发前已经一次性取好
/// - 任何一步失败都返回 Err，由协调器转为 Failure
/// - 同一个标识重复调用必须安全（除最终结果落盘外不改共享状态）
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    type Output: Send + 'static;

    async fn process(&self, id: &str) -> Result<(Self::Output, TokenUsage)>;
}

/// 一次批处理的最终报告
///
/// 运行期间由协调器独占，所有条目完成后整体返回
#[derive(Debug)]
pub struct BatchReport<T> {
    pub outcomes: Vec<ItemOutcome<T>>,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 成功条目的 token 累计
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub tokens_total: u64,
    /// 成功条目耗时之和（非墙钟时间）
    pub items_elapsed: Duration,
    /// 整个批次的墙钟时间
    pub wall_clock: Duration,
}

impl<T> BatchReport<T> {
    fn new() -> Self {
        Self {
            outcomes: Vec::new(),
            attempted: 0,
            succeeded: 0,
            failed: 0,
            tokens_input: 0,
            tokens_output: 0,
            tokens_total: 0,
            items_elapsed: Duration::ZERO,
            wall_clock: Duration::ZERO,
        }
    }

    fn record(&mut self, outcome: ItemOutcome<T>) {
        self.attempted += 1;
        match &outcome {
            ItemOutcome::Success { metrics, .. } => {
                self.succeeded += 1;
                self.tokens_input += metrics.tokens.input as u64;
                self.tokens_output += metrics.tokens.output as u64;
                self.tokens_total += metrics.tokens.total as u64;
                self.items_elapsed += metrics.elapsed;
            }
            ItemOutcome::Failure { .. } => {
                self.failed += 1;
            }
        }
        self.outcomes.push(outcome);
    }

    /// 失败条目的标识，供汇总输出和手工重跑
    pub fn failed_ids(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                ItemOutcome::Failure { id, .. } => Some(id.as_str()),
                ItemOutcome::Success { .. } => None,
            })
            .collect()
    }

    /// 成功条目的平均 token 数
    pub fn avg_tokens(&self) -> u64 {
        self.tokens_total / (self.succeeded.max(1) as u64)
    }

    /// 成功条目的平均耗时（秒）
    pub fn avg_item_secs(&self) -> f64 {
        self.items_elapsed.as_secs_f64() / (self.succeeded.max(1) as f64)
    }
}

/// 增量计算：候选列表减去已完成集合
///
/// 输出保持候选列表的原始顺序，每个标识最多出现一次，
/// 这样日志和报告在多次运行之间是稳定可复现的
pub fn compute_delta(candidates: &[String], completed: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    candidates
        .iter()
        .filter(|id| !completed.contains(*id) && seen.insert((*id).clone()))
        .cloned()
        .collect()
}

/// 批量工作协调器
pub struct BatchRunner {
    worker_count: usize,
    item_timeout: Option<Duration>,
}

impl BatchRunner {
    /// 创建协调器
    ///
    /// 并发数必须为正，非法配置在任何条目开始处理之前就失败
    pub fn new(worker_count: usize) -> Result<Self> {
        if worker_count == 0 {
            return Err(AppError::Config(
                "并发数必须大于 0".to_string(),
            ));
        }
        Ok(Self {
            worker_count,
            item_timeout: None,
        })
    }

    /// 设置单条目超时（可选加固，默认不限制）
    pub fn with_item_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.item_timeout = timeout;
        self
    }

    /// 执行批处理
    ///
    /// 所有条目派发到固定大小的工作池，逐个等待结果；
    /// 条目间完全隔离，处理器报错（甚至 panic）都只影响自己这一条
    pub async fn run<P>(&self, items: Vec<String>, processor: Arc<P>) -> Result<BatchReport<P::Output>>
    where
        P: ItemProcessor + 'static,
    {
        let batch_start = Instant::now();
        let mut report = BatchReport::new();

        let total = items.len();
        if total == 0 {
            return Ok(report);
        }

        info!("📦 批处理开始: {} 个条目, 并发数 {}", total, self.worker_count);

        let semaphore = Arc::new(Semaphore::new(self.worker_count));
        let completed = Arc::new(AtomicUsize::new(0));
        let item_timeout = self.item_timeout;

        let mut handles = Vec::with_capacity(total);

        for id in items {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AppError::Config(format!("工作池信号量已关闭: {}", e)))?;

            let processor = processor.clone();
            let completed = completed.clone();
            let join_id = id.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;

                let outcome = process_one(processor.as_ref(), &id, item_timeout).await;

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                match &outcome {
                    ItemOutcome::Success { metrics, .. } => {
                        info!(
                            "[{}/{}] ✓ {} (tokens: {}, 耗时: {:.1}s)",
                            done,
                            total,
                            outcome.id(),
                            metrics.tokens.total,
                            metrics.elapsed.as_secs_f64()
                        );
                    }
                    ItemOutcome::Failure { id, error } => {
                        error!("[{}/{}] ❌ {} 处理失败: {}", done, total, id, error);
                    }
                }

                outcome
            });
            handles.push((join_id, handle));
        }

        // 等待所有条目产生结果
        for (id, handle) in handles {
            match handle.await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    // 工作任务 panic：同样只算这一条失败
                    error!("[{}] 任务执行失败: {}", id, e);
                    report.record(ItemOutcome::Failure {
                        id,
                        error: format!("任务执行失败: {}", e),
                    });
                }
            }
        }

        report.wall_clock = batch_start.elapsed();

        info!(
            "📦 批处理完成: 成功 {}/{}, 失败 {}, 墙钟时间 {:.1}s",
            report.succeeded,
            report.attempted,
            report.failed,
            report.wall_clock.as_secs_f64()
        );

        Ok(report)
    }
}

/// 处理单个条目：计时、可选超时、把所有错误收敛为 Failure
async fn process_one<P>(processor: &P, id: &str, item_timeout: Option<Duration>) -> ItemOutcome<P::Output>
where
    P: ItemProcessor,
{
    let started = Instant::now();

    let result = match item_timeout {
        Some(limit) => match tokio::time::timeout(limit, processor.process(id)).await {
            Ok(r) => r,
            Err(_) => {
                return ItemOutcome::Failure {
                    id: id.to_string(),
                    error: format!("处理超时 ({}s)", limit.as_secs_f64()),
                }
            }
        },
        None => processor.process(id).await,
    };

    match result {
        Ok((payload, tokens)) => ItemOutcome::Success {
            id: id.to_string(),
            payload,
            metrics: ItemMetrics {
                tokens,
                elapsed: started.elapsed(),
            },
        },
        Err(e) => ItemOutcome::Failure {
            id: id.to_string(),
            error: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// 测试用处理器：按编号返回确定的 token 数，指定条目必定失败
    struct MockProcessor {
        fail_ids: HashSet<String>,
        delay: Duration,
    }

    impl MockProcessor {
        fn new() -> Self {
            Self {
                fail_ids: HashSet::new(),
                delay: Duration::ZERO,
            }
        }

        fn failing(fail_ids: &[&str]) -> Self {
            Self {
                fail_ids: set(fail_ids),
                delay: Duration::ZERO,
            }
        }

        fn item_number(id: &str) -> u32 {
            id.rsplit('-').next().and_then(|n| n.parse().ok()).unwrap_or(1)
        }
    }

    #[async_trait]
    impl ItemProcessor for MockProcessor {
        type Output = String;

        async fn process(&self, id: &str) -> Result<(String, TokenUsage)> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail_ids.contains(id) {
                return Err(AppError::llm("mock-model", format!("模拟失败: {}", id)));
            }
            let n = Self::item_number(id);
            Ok((
                format!("payload-{}", id),
                TokenUsage {
                    input: n,
                    output: n,
                    total: 2 * n,
                },
            ))
        }
    }

    // ========== compute_delta ==========

    #[test]
    fn test_delta_basic_scenario() {
        let delta = compute_delta(&ids(&["A", "B", "C"]), &set(&["B"]));
        assert_eq!(delta, ids(&["A", "C"]));
    }

    #[test]
    fn test_delta_preserves_order_and_dedups() {
        let delta = compute_delta(&ids(&["C", "A", "C", "B", "A"]), &set(&["B"]));
        assert_eq!(delta, ids(&["C", "A"]));
    }

    #[test]
    fn test_delta_empty_cases() {
        assert!(compute_delta(&[], &set(&["X"])).is_empty());
        assert!(compute_delta(&ids(&["A", "B"]), &set(&["A", "B"])).is_empty());

        let delta = compute_delta(&ids(&["A", "B"]), &HashSet::new());
        assert_eq!(delta, ids(&["A", "B"]));
    }

    // ========== BatchRunner ==========

    #[test]
    fn test_zero_workers_is_config_error() {
        match BatchRunner::new(0) {
            Err(AppError::Config(_)) => {}
            other => panic!("并发数为 0 应该返回配置错误, 实际: {:?}", other.map(|_| ())),
        }
        assert!(BatchRunner::new(1).is_ok());
    }

    #[tokio::test]
    async fn test_empty_batch_returns_clean_report() {
        let runner = BatchRunner::new(3).unwrap();
        let report = runner.run(vec![], Arc::new(MockProcessor::new())).await.unwrap();
        assert_eq!(report.attempted, 0);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(report.tokens_total, 0);
    }

    #[tokio::test]
    async fn test_alternating_outcomes_add_up() {
        // 一半成功一半失败，不同并发数下计数都必须守恒
        let items: Vec<String> = (1..=10).map(|n| format!("item-{}", n)).collect();
        let fail: Vec<String> = items.iter().step_by(2).cloned().collect();
        let fail_refs: Vec<&str> = fail.iter().map(|s| s.as_str()).collect();

        for workers in [1, 3, 50] {
            let runner = BatchRunner::new(workers).unwrap();
            let report = runner
                .run(items.clone(), Arc::new(MockProcessor::failing(&fail_refs)))
                .await
                .unwrap();

            assert_eq!(report.attempted, 10, "workers={}", workers);
            assert_eq!(report.succeeded + report.failed, 10, "workers={}", workers);
            assert_eq!(report.failed, 5, "workers={}", workers);
        }
    }

    #[tokio::test]
    async fn test_deterministic_processor_gives_identical_payloads() {
        let items: Vec<String> = (1..=6).map(|n| format!("item-{}", n)).collect();

        let mut runs = Vec::new();
        for _ in 0..2 {
            let runner = BatchRunner::new(3).unwrap();
            let report = runner.run(items.clone(), Arc::new(MockProcessor::new())).await.unwrap();

            let mut payloads: Vec<(String, String)> = report
                .outcomes
                .iter()
                .map(|o| match o {
                    ItemOutcome::Success { id, payload, .. } => (id.clone(), payload.clone()),
                    ItemOutcome::Failure { id, .. } => panic!("不应失败: {}", id),
                })
                .collect();
            payloads.sort();
            runs.push(payloads);
        }

        assert_eq!(runs[0], runs[1]);
    }

    #[tokio::test]
    async fn test_single_failure_is_isolated() {
        let items: Vec<String> = (1..=8).map(|n| format!("item-{}", n)).collect();
        let runner = BatchRunner::new(4).unwrap();
        let report = runner
            .run(items, Arc::new(MockProcessor::failing(&["item-5"])))
            .await
            .unwrap();

        assert_eq!(report.succeeded, 7);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failed_ids(), vec!["item-5"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_lost_token_updates_under_concurrency() {
        // 200 个条目、10 个并发，每条带短暂休眠放大竞争窗口；
        // 最终 token 总和必须等于各条目之和
        let items: Vec<String> = (1..=200).map(|n| format!("item-{}", n)).collect();
        let processor = MockProcessor {
            fail_ids: HashSet::new(),
            delay: Duration::from_millis(2),
        };

        let runner = BatchRunner::new(10).unwrap();
        let report = runner.run(items, Arc::new(processor)).await.unwrap();

        let expected_input: u64 = (1..=200u64).sum();
        assert_eq!(report.attempted, 200);
        assert_eq!(report.succeeded, 200);
        assert_eq!(report.tokens_input, expected_input);
        assert_eq!(report.tokens_output, expected_input);
        assert_eq!(report.tokens_total, 2 * expected_input);
    }

    #[tokio::test]
    async fn test_all_failures_leave_metrics_empty() {
        let items: Vec<String> = (1..=5).map(|n| format!("item-{}", n)).collect();
        let fail_refs: Vec<&str> = items.iter().map(|s| s.as_str()).collect();

        let runner = BatchRunner::new(3).unwrap();
        let report = runner
            .run(items.clone(), Arc::new(MockProcessor::failing(&fail_refs)))
            .await
            .unwrap();

        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed, 5);
        assert_eq!(report.tokens_total, 0);
        assert_eq!(report.items_elapsed, Duration::ZERO);
        assert_eq!(report.failed_ids().len(), 5);
    }

    #[tokio::test]
    async fn test_item_timeout_becomes_failure() {
        let items = ids(&["item-1", "item-2"]);
        let processor = MockProcessor {
            fail_ids: HashSet::new(),
            delay: Duration::from_millis(200),
        };

        let runner = BatchRunner::new(2)
            .unwrap()
            .with_item_timeout(Some(Duration::from_millis(10)));
        let report = runner.run(items, Arc::new(processor)).await.unwrap();

        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed, 2);
        for o in &report.outcomes {
            match o {
                ItemOutcome::Failure { error, .. } => assert!(error.contains("超时")),
                ItemOutcome::Success { .. } => panic!("不应成功"),
            }
        }
    }

    #[tokio::test]
    async fn test_avg_helpers() {
        let items: Vec<String> = (1..=4).map(|n| format!("item-{}", n)).collect();
        let runner = BatchRunner::new(2).unwrap();
        let report = runner.run(items, Arc::new(MockProcessor::new())).await.unwrap();

        // tokens_total = 2*(1+2+3+4) = 20, 平均 5
        assert_eq!(report.tokens_total, 20);
        assert_eq!(report.avg_tokens(), 5);
    }
}
