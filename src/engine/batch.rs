// ==========================================
// 应收账款催收系统 - 通用分片批量执行器
// ==========================================
// 依据: Dunning_Engine_Specs_v1.0.md - 6. 批量执行
// 红线: 汇总合并满足交换律,分片大小与并发度不得影响合并结果
// 红线: 单分片失败只记失败,不中断其余分片
// 红线: 取消只拦截未启动的分片,已启动的跑完并计入结果
// ==========================================
// 职责: 固定大小分片 + 有界并发 + 结果合并 + 进度回调 + 取消
// ==========================================

use crate::engine::error::EngineResult;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// 并发上限,与配置层的钳制保持一致
const MAX_CONCURRENCY: usize = 8;

// ==========================================
// ChunkMerge - 可合并的分片汇总
// ==========================================
// 三个批量操作的汇总类型都实现本 trait
pub trait ChunkMerge: Default {
    /// 把另一分片的汇总并入自身(要求满足交换律与结合律)
    fn merge(&mut self, other: Self);
}

// ==========================================
// 进度回调
// ==========================================

pub trait BatchProgressObserver: Send + Sync {
    /// 每个分片结束(成功或失败)后回调一次
    fn on_chunk_done(&self, completed: usize, total: usize, failed_so_far: usize);
}

/// 默认空实现
pub struct NoOpProgressObserver;

impl BatchProgressObserver for NoOpProgressObserver {
    fn on_chunk_done(&self, _completed: usize, _total: usize, _failed_so_far: usize) {}
}

/// 按结构化日志输出分片进度
pub struct TracingProgressObserver {
    operation: String,
}

impl TracingProgressObserver {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }
}

impl BatchProgressObserver for TracingProgressObserver {
    fn on_chunk_done(&self, completed: usize, total: usize, failed_so_far: usize) {
        info!(
            operation = %self.operation,
            completed_chunks = completed,
            total_chunks = total,
            failed_chunks = failed_so_far,
            "分片执行进度"
        );
    }
}

// ==========================================
// 结果类型
// ==========================================

/// 单个分片的失败记录
#[derive(Debug, Clone, Serialize)]
pub struct ChunkFailure {
    pub chunk_index: usize,
    pub item_count: usize,
    pub message: String,
}

/// 批量执行结果
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome<R> {
    /// 各成功分片汇总的合并结果
    pub merged: R,
    pub total_chunks: usize,
    pub completed_chunks: usize,
    pub failed_chunks: Vec<ChunkFailure>,
    /// 有分片因取消未启动时为 true(部分完成)
    pub canceled: bool,
}

// ==========================================
// BatchRunner - 分片批量执行器
// ==========================================
pub struct BatchRunner {
    chunk_size: usize,
    max_concurrency: usize,
    cancel_flag: Arc<AtomicBool>,
}

impl BatchRunner {
    /// 创建批量执行器
    ///
    /// # 参数
    /// - chunk_size: 分片大小(0 视为 1)
    /// - max_concurrency: 并发度,钳制到 1..=8
    pub fn new(chunk_size: usize, max_concurrency: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            max_concurrency: max_concurrency.clamp(1, MAX_CONCURRENCY),
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 取消句柄: 置 true 后,尚未启动的分片不再启动
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel_flag.clone()
    }

    /// 分片执行并合并结果
    ///
    /// # 参数
    /// - items: 全量输入,按 chunk_size 切分
    /// - observer: 分片进度回调
    /// - f: 分片处理函数 (chunk_index, 分片数据) → 分片汇总
    ///
    /// # 说明
    /// - 取消检查发生在分片启动之间;已在途的分片照常收尾
    /// - 分片返回 Err 记入 failed_chunks,其余分片继续
    pub async fn run<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        observer: &dyn BatchProgressObserver,
        f: F,
    ) -> BatchOutcome<R>
    where
        R: ChunkMerge,
        F: Fn(usize, Vec<T>) -> Fut,
        Fut: Future<Output = EngineResult<R>>,
    {
        let mut chunks: Vec<Vec<T>> = Vec::new();
        let mut buf = Vec::with_capacity(self.chunk_size.min(items.len().max(1)));
        for item in items {
            buf.push(item);
            if buf.len() == self.chunk_size {
                chunks.push(std::mem::take(&mut buf));
            }
        }
        if !buf.is_empty() {
            chunks.push(buf);
        }

        let total_chunks = chunks.len();
        let cancel = self.cancel_flag.clone();

        let tasks = chunks
            .into_iter()
            .enumerate()
            .map(|(idx, chunk)| {
                let item_count = chunk.len();
                let fut = f(idx, chunk);
                async move { (idx, item_count, fut.await) }
            })
            // 惰性拉取: buffer_unordered 腾出并发位时才启动下一分片,
            // 取消标志恰好在这条启动边界上生效
            .take_while(|_| !cancel.load(Ordering::SeqCst));

        let mut results = stream::iter(tasks).buffer_unordered(self.max_concurrency);

        let mut merged = R::default();
        let mut completed_chunks = 0usize;
        let mut failed_chunks: Vec<ChunkFailure> = Vec::new();

        while let Some((chunk_index, item_count, result)) = results.next().await {
            match result {
                Ok(summary) => {
                    merged.merge(summary);
                    completed_chunks += 1;
                }
                Err(e) => {
                    failed_chunks.push(ChunkFailure {
                        chunk_index,
                        item_count,
                        message: e.to_string(),
                    });
                }
            }
            observer.on_chunk_done(completed_chunks, total_chunks, failed_chunks.len());
        }

        let processed = completed_chunks + failed_chunks.len();
        BatchOutcome {
            merged,
            total_chunks,
            completed_chunks,
            failed_chunks,
            canceled: processed < total_chunks,
        }
    }
}

// ==========================================
// 单元测试
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::EngineError;

    // ==========================================
    // 测试数据准备
    // ==========================================

    #[derive(Debug, Default, Clone, PartialEq)]
    struct TestSummary {
        sum: i64,
        count: i64,
    }

    impl ChunkMerge for TestSummary {
        fn merge(&mut self, other: Self) {
            self.sum += other.sum;
            self.count += other.count;
        }
    }

    async fn sum_chunk(_idx: usize, chunk: Vec<i64>) -> EngineResult<TestSummary> {
        Ok(TestSummary {
            sum: chunk.iter().sum(),
            count: chunk.len() as i64,
        })
    }

    // ==========================================
    // 测试场景
    // ==========================================

    #[tokio::test]
    async fn test_scenario_1_merge_independent_of_chunk_size() {
        // 场景1: 合并不变式 - 分片大小不影响合并结果
        let items: Vec<i64> = (1..=250).collect();
        let expected_sum: i64 = items.iter().sum();

        for chunk_size in [1usize, 7, 100, 250, 1000] {
            let runner = BatchRunner::new(chunk_size, 4);
            let outcome = runner
                .run(items.clone(), &NoOpProgressObserver, sum_chunk)
                .await;

            assert_eq!(outcome.merged.sum, expected_sum, "chunk_size={}", chunk_size);
            assert_eq!(outcome.merged.count, 250, "chunk_size={}", chunk_size);
            assert_eq!(outcome.failed_chunks.len(), 0);
            assert!(!outcome.canceled);
            assert_eq!(outcome.completed_chunks, outcome.total_chunks);
        }
    }

    #[tokio::test]
    async fn test_scenario_2_failed_chunk_is_isolated() {
        // 场景2: 单分片失败只记失败,其余分片照常合并
        let items: Vec<i64> = (1..=30).collect();
        let runner = BatchRunner::new(10, 2);

        let outcome = runner
            .run(items, &NoOpProgressObserver, |idx, chunk: Vec<i64>| async move {
                if idx == 1 {
                    return Err(EngineError::InternalError("模拟分片失败".to_string()));
                }
                sum_chunk(idx, chunk).await
            })
            .await;

        assert_eq!(outcome.total_chunks, 3);
        assert_eq!(outcome.completed_chunks, 2);
        assert_eq!(outcome.failed_chunks.len(), 1);
        assert_eq!(outcome.failed_chunks[0].chunk_index, 1);
        assert_eq!(outcome.failed_chunks[0].item_count, 10);
        // 第二分片(11..=20)的和未计入
        let expected: i64 = (1..=10).sum::<i64>() + (21..=30).sum::<i64>();
        assert_eq!(outcome.merged.sum, expected);
        assert!(!outcome.canceled, "失败不等于取消");
    }

    #[tokio::test]
    async fn test_scenario_3_cancel_skips_unstarted_chunks() {
        // 场景3: 首分片内置取消 → 后续分片不启动,结果部分完成
        let items: Vec<i64> = (1..=30).collect();
        let runner = BatchRunner::new(10, 1);
        let cancel = runner.cancel_handle();

        let outcome = runner
            .run(items, &NoOpProgressObserver, |idx, chunk: Vec<i64>| {
                let cancel = cancel.clone();
                async move {
                    if idx == 0 {
                        cancel.store(true, Ordering::SeqCst);
                    }
                    sum_chunk(idx, chunk).await
                }
            })
            .await;

        assert!(outcome.canceled, "有分片未启动应标记取消");
        assert_eq!(outcome.total_chunks, 3);
        assert!(outcome.completed_chunks < 3, "取消后不应全部完成");
        assert!(outcome.merged.count < 30);
    }

    #[tokio::test]
    async fn test_scenario_4_empty_input() {
        // 场景4: 空输入 → 零分片,默认汇总
        let runner = BatchRunner::new(100, 4);
        let outcome = runner
            .run(Vec::<i64>::new(), &NoOpProgressObserver, sum_chunk)
            .await;

        assert_eq!(outcome.total_chunks, 0);
        assert_eq!(outcome.completed_chunks, 0);
        assert_eq!(outcome.merged, TestSummary::default());
        assert!(!outcome.canceled);
    }

    #[tokio::test]
    async fn test_scenario_5_degenerate_parameters_clamped() {
        // 场景5: 非法参数(分片0/并发0) → 钳制后正常执行
        let items: Vec<i64> = (1..=5).collect();
        let runner = BatchRunner::new(0, 0);
        let outcome = runner
            .run(items, &NoOpProgressObserver, sum_chunk)
            .await;

        assert_eq!(outcome.total_chunks, 5, "分片大小0应按1处理");
        assert_eq!(outcome.merged.sum, 15);
    }

    #[tokio::test]
    async fn test_scenario_6_observer_called_per_chunk() {
        // 场景6: 进度回调每分片一次
        use std::sync::atomic::AtomicUsize;

        struct CountingObserver {
            calls: AtomicUsize,
        }
        impl BatchProgressObserver for CountingObserver {
            fn on_chunk_done(&self, _completed: usize, total: usize, _failed: usize) {
                assert_eq!(total, 4);
                self.calls.fetch_add(1, Ordering::SeqCst);
            }
        }

        let observer = CountingObserver {
            calls: AtomicUsize::new(0),
        };
        let items: Vec<i64> = (1..=40).collect();
        let runner = BatchRunner::new(10, 2);
        runner.run(items, &observer, sum_chunk).await;

        assert_eq!(observer.calls.load(Ordering::SeqCst), 4);
    }
}
