// ==========================================
// 应收账款催收系统 - 桶位重算引擎
// ==========================================
// 依据: Dunning_Engine_Specs_v1.0.md - 7. 桶位重算
// 红线: (current_bucket, bucket_entered_on) 的唯一写入方
// 红线: 同一进程内重算运行互斥,杜绝缓存对交错写入
// 红线: 不可催收状态的账款不参与重算,保留最后桶位
// ==========================================
// 职责: 按注入 today 重新分桶,漂移账款原子写回缓存对
// 输入: 作用域 + today
// 输出: BatchOutcome<ReassignSummary>
// ==========================================

use crate::config::DunningConfigReader;
use crate::domain::obligation::Obligation;
use crate::engine::batch::{BatchOutcome, BatchRunner, ChunkMerge, TracingProgressObserver};
use crate::engine::bucket_classifier::BucketClassifier;
use crate::engine::error::{EngineError, EngineResult};
use crate::repository::ObligationRepository;
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};

/// 进程级运行互斥: 重算是桶位缓存的唯一写入方
static REASSIGN_GUARD: Mutex<()> = Mutex::const_new(());

// ==========================================
// 汇总类型
// ==========================================

#[derive(Debug, Clone, Serialize)]
pub struct ReassignErrorDetail {
    pub obligation_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReassignSummary {
    /// 桶位漂移并成功写回的账款数
    pub reassigned: i64,
    /// 桶位未变化的账款数
    pub skipped: i64,
    pub errors: i64,
    pub error_details: Vec<ReassignErrorDetail>,
}

impl ChunkMerge for ReassignSummary {
    fn merge(&mut self, other: Self) {
        self.reassigned += other.reassigned;
        self.skipped += other.skipped;
        self.errors += other.errors;
        self.error_details.extend(other.error_details);
    }
}

// ==========================================
// ReassignmentEngine - 桶位重算引擎
// ==========================================
pub struct ReassignmentEngine<C>
where
    C: DunningConfigReader,
{
    obligation_repo: Arc<ObligationRepository>,
    config: Arc<C>,
}

impl<C> ReassignmentEngine<C>
where
    C: DunningConfigReader,
{
    /// 创建新的桶位重算引擎
    pub fn new(obligation_repo: Arc<ObligationRepository>, config: Arc<C>) -> Self {
        Self {
            obligation_repo,
            config,
        }
    }

    /// 作用域内全量重算
    ///
    /// # 参数
    /// - owner_id: Some 时限定单一债权人,None 为全量
    /// - today: 注入的业务日期
    ///
    /// # 说明
    /// - 输入集合读取失败是唯一的整体失败;之后的单笔失败只计入汇总
    /// - 漂移账款写回时 bucket_entered_on 一律记为 today
    #[instrument(skip(self), fields(scope = owner_id.unwrap_or("ALL"), %today))]
    pub async fn reassign_scope(
        &self,
        owner_id: Option<&str>,
        today: NaiveDate,
    ) -> EngineResult<BatchOutcome<ReassignSummary>> {
        let _guard = REASSIGN_GUARD.lock().await;

        // ===== 步骤 1: 读取配置 =====
        let chunk_size = self
            .config
            .get_reassign_chunk_size()
            .await
            .map_err(|e| EngineError::ConfigReadError {
                key: "reassign_chunk_size".to_string(),
                message: e.to_string(),
            })?;

        // ===== 步骤 2: 加载可催收账款(状态过滤在查询侧) =====
        let obligations = self.obligation_repo.list_outreach_eligible(owner_id)?;
        info!(count = obligations.len(), "桶位重算输入加载完成");

        // ===== 步骤 3: 分片执行 =====
        // 单写连接之上并发无收益,固定并发为 1
        let runner = BatchRunner::new(chunk_size, 1);
        let observer = TracingProgressObserver::new("reassign_buckets");
        let repo = self.obligation_repo.clone();

        let outcome = runner
            .run(obligations, &observer, |_idx, chunk: Vec<Obligation>| {
                let repo = repo.clone();
                async move {
                    let classifier = BucketClassifier::new();
                    let mut summary = ReassignSummary::default();

                    for obligation in &chunk {
                        let assessment = classifier.assess(obligation, today);
                        if !assessment.changed {
                            summary.skipped += 1;
                            continue;
                        }

                        match repo.update_bucket(
                            &obligation.obligation_id,
                            assessment.target_bucket,
                            today,
                        ) {
                            Ok(()) => summary.reassigned += 1,
                            Err(e) => {
                                summary.errors += 1;
                                summary.error_details.push(ReassignErrorDetail {
                                    obligation_id: obligation.obligation_id.clone(),
                                    reason: e.to_string(),
                                });
                            }
                        }
                    }

                    Ok(summary)
                }
            })
            .await;

        info!(
            reassigned = outcome.merged.reassigned,
            skipped = outcome.merged.skipped,
            errors = outcome.merged.errors,
            failed_chunks = outcome.failed_chunks.len(),
            "桶位重算完成"
        );
        Ok(outcome)
    }
}
