// ==========================================
// 应收账款催收系统 - 账龄分桶引擎
// ==========================================
// 依据: Dunning_Engine_Specs_v1.0.md - 1. 账龄分桶体系
// 红线: 逾期天数按日历日差计算,无时分秒参与
// 红线: today 一律外部注入,引擎不读系统时钟
// ==========================================
// 职责: 计算逾期天数 + 判定账龄桶 + 检测桶位漂移
// 输入: obligation (due_date, current_bucket 缓存)
// 输出: BucketAssessment (目标桶, 逾期天数, 是否需要重算)
// ==========================================

use crate::domain::obligation::Obligation;
use crate::domain::types::AgingBucket;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::instrument;

// ==========================================
// BucketAssessment - 单笔账款的分桶判定结果
// ==========================================
#[derive(Debug, Clone, Serialize)]
pub struct BucketAssessment {
    pub obligation_id: String,
    /// 判定前的桶位缓存(从未分桶时为 None)
    pub cached_bucket: Option<AgingBucket>,
    /// 按 today 重新判定的目标桶
    pub target_bucket: AgingBucket,
    pub days_past_due: i64,
    /// 目标桶与缓存不一致(或从未分桶)时为 true
    pub changed: bool,
}

// ==========================================
// BucketClassifier - 账龄分桶引擎
// ==========================================
pub struct BucketClassifier;

impl BucketClassifier {
    /// 创建新的账龄分桶引擎
    pub fn new() -> Self {
        Self
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 计算逾期天数
    ///
    /// 规则: max(0, today - due_date),未到期一律记 0
    pub fn days_past_due(&self, due_date: NaiveDate, today: NaiveDate) -> i64 {
        (today - due_date).num_days().max(0)
    }

    /// 判定账龄桶
    ///
    /// 返回: (目标桶, 逾期天数)
    ///
    /// 边界处理:
    /// - 今天到期 → 0 天 → CURRENT
    /// - 明天到期 → 差值为负,钳为 0 → CURRENT
    /// - 第 30 天 → DAYS1_TO30; 第 31 天 → DAYS31_TO60
    /// - 151 天及以上 → DAYS151_PLUS
    pub fn classify(&self, due_date: NaiveDate, today: NaiveDate) -> (AgingBucket, i64) {
        let dpd = self.days_past_due(due_date, today);
        (AgingBucket::classify(dpd), dpd)
    }

    /// 单笔账款判定（含桶位漂移检测）
    pub fn assess(&self, obligation: &Obligation, today: NaiveDate) -> BucketAssessment {
        let (target_bucket, days_past_due) = self.classify(obligation.due_date, today);
        let changed = obligation.current_bucket != Some(target_bucket);

        BucketAssessment {
            obligation_id: obligation.obligation_id.clone(),
            cached_bucket: obligation.current_bucket,
            target_bucket,
            days_past_due,
            changed,
        }
    }

    /// 批量判定（推荐使用）
    ///
    /// 纯计算,不落库;桶位缓存写回由重算引擎负责
    #[instrument(skip(self, obligations), fields(count = obligations.len()))]
    pub fn assess_batch(
        &self,
        obligations: &[Obligation],
        today: NaiveDate,
    ) -> Vec<BucketAssessment> {
        obligations.iter().map(|o| self.assess(o, today)).collect()
    }
}

impl Default for BucketClassifier {
    fn default() -> Self {
        Self::new()
    }
}
