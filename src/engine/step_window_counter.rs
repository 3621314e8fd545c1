// ==========================================
// 应收账款催收系统 - 步骤窗口统计引擎
// ==========================================
// 依据: Dunning_Engine_Specs_v1.0.md - 3. 步骤窗口统计
// 红线: 只读投影,任何时刻可由账款与工作流配置重新推导
// 红线: 不落库任何计数,杜绝统计漂移
// ==========================================
// 职责: 按 (账龄桶, 步骤窗口) 统计可催收账款数
// 输入: 可催收账款 + 各桶生效工作流(预加载) + today
// 输出: StepWindowReport (含 needs_workflow / needs_configuration 标记)
// ==========================================

use crate::domain::obligation::Obligation;
use crate::domain::types::{AgingBucket, MessageTone, OutreachChannel};
use crate::domain::workflow::DunningWorkflow;
use crate::engine::bucket_classifier::BucketClassifier;
use crate::engine::workflow_resolver::{StepResolution, StepSchedule, WorkflowResolver};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use tracing::instrument;

// ==========================================
// 报表 DTO
// ==========================================

/// 单个步骤窗口的统计行
#[derive(Debug, Clone, Serialize)]
pub struct StepWindowCount {
    pub step_id: String,
    pub seq_no: i64,
    pub day_offset: i64,
    pub channel: OutreachChannel,
    pub tone: MessageTone,
    pub count: i64,
}

/// 单个账龄桶的统计块
#[derive(Debug, Clone, Serialize)]
pub struct BucketWindowReport {
    pub bucket: AgingBucket,
    pub bucket_label: String,
    /// 该桶可催收账款总数
    pub total: i64,
    pub workflow_id: Option<String>,
    pub workflow_name: Option<String>,
    /// 有账款但没有任何工作流 → 提示创建,而非报错
    pub needs_workflow: bool,
    /// 步骤窗口定义非法时的错误文本(桶不会被静默丢弃)
    pub needs_configuration: Option<String>,
    /// 已入桶但尚未到达首个步骤窗口的账款数
    pub pre_step: i64,
    pub steps: Vec<StepWindowCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepWindowReport {
    pub run_date: NaiveDate,
    pub owner_scope: String,
    pub total_eligible: i64,
    pub buckets: Vec<BucketWindowReport>,
}

// ==========================================
// StepWindowCounter - 步骤窗口统计引擎
// ==========================================
pub struct StepWindowCounter {
    classifier: BucketClassifier,
    resolver: WorkflowResolver,
}

impl StepWindowCounter {
    /// 创建新的步骤窗口统计引擎
    pub fn new() -> Self {
        Self {
            classifier: BucketClassifier::new(),
            resolver: WorkflowResolver::new(),
        }
    }

    /// 构建步骤窗口报表
    ///
    /// # 参数
    /// - obligations: 可催收账款(状态过滤已在查询侧完成)
    /// - effective_by_bucket: 各桶生效工作流(裁决已在调用侧完成)
    /// - owner_scope: 作用域描述(只进报表,不参与计算)
    ///
    /// # 说明
    /// - 每笔账款: 分桶 O(1) → 窗口定位 O(log k)
    /// - 配置非法的桶记入 needs_configuration,其余桶照常统计
    /// - 零计数步骤也出现在报表中,窗口全貌可见
    #[instrument(skip(self, obligations, effective_by_bucket), fields(count = obligations.len()))]
    pub fn build_report(
        &self,
        obligations: &[Obligation],
        effective_by_bucket: &HashMap<AgingBucket, DunningWorkflow>,
        owner_scope: &str,
        today: NaiveDate,
    ) -> StepWindowReport {
        // 1. 每桶构建一次经校验的步骤视图,非法配置只报一次
        let mut schedules: HashMap<AgingBucket, StepSchedule> = HashMap::new();
        let mut config_errors: HashMap<AgingBucket, String> = HashMap::new();
        for (bucket, workflow) in effective_by_bucket {
            match self.resolver.step_schedule(workflow) {
                Ok(schedule) => {
                    schedules.insert(*bucket, schedule);
                }
                Err(e) => {
                    config_errors.insert(*bucket, e.to_string());
                }
            }
        }

        // 2. 逐笔归位(视图上二分,无逐笔校验)
        let mut totals: HashMap<AgingBucket, i64> = HashMap::new();
        let mut pre_steps: HashMap<AgingBucket, i64> = HashMap::new();
        let mut step_counts: HashMap<String, i64> = HashMap::new();

        for obligation in obligations {
            let (bucket, _dpd) = self.classifier.classify(obligation.due_date, today);
            *totals.entry(bucket).or_insert(0) += 1;

            // 无工作流或配置非法的桶只计总数
            let Some(schedule) = schedules.get(&bucket) else {
                continue;
            };

            let days = self.resolver.days_since_entry(obligation, bucket, today);
            match schedule.resolve(days) {
                StepResolution::NoActiveStep => {
                    *pre_steps.entry(bucket).or_insert(0) += 1;
                }
                StepResolution::Active { step } => {
                    *step_counts.entry(step.step_id).or_insert(0) += 1;
                }
            }
        }

        // 3. 组装报表(固定桶序,零计数步骤保留)
        let mut buckets = Vec::with_capacity(AgingBucket::ALL.len());
        for bucket in AgingBucket::ALL {
            let total = totals.get(&bucket).copied().unwrap_or(0);
            let workflow = effective_by_bucket.get(&bucket);

            let mut steps = Vec::new();
            if let Some(wf) = workflow {
                // 配置非法的桶没有视图,报表仍按 seq_no 列出步骤定义
                let ordered = match schedules.get(&bucket) {
                    Some(schedule) => schedule.steps().to_vec(),
                    None => {
                        let mut raw = wf.steps.clone();
                        raw.sort_by_key(|s| s.seq_no);
                        raw
                    }
                };
                for step in ordered {
                    let count = step_counts.get(&step.step_id).copied().unwrap_or(0);
                    steps.push(StepWindowCount {
                        step_id: step.step_id,
                        seq_no: step.seq_no,
                        day_offset: step.day_offset,
                        channel: step.channel,
                        tone: step.tone,
                        count,
                    });
                }
            }

            buckets.push(BucketWindowReport {
                bucket,
                bucket_label: bucket.label_cn().to_string(),
                total,
                workflow_id: workflow.map(|w| w.workflow_id.clone()),
                workflow_name: workflow.map(|w| w.name.clone()),
                needs_workflow: workflow.is_none() && total > 0,
                needs_configuration: config_errors.get(&bucket).cloned(),
                pre_step: pre_steps.get(&bucket).copied().unwrap_or(0),
                steps,
            });
        }

        StepWindowReport {
            run_date: today,
            owner_scope: owner_scope.to_string(),
            total_eligible: obligations.len() as i64,
            buckets,
        }
    }
}

impl Default for StepWindowCounter {
    fn default() -> Self {
        Self::new()
    }
}

// ==========================================
// 单元测试
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ObligationStatus;
    use crate::domain::workflow::WorkflowStep;
    use chrono::{Duration, NaiveDateTime};

    // ==========================================
    // 测试数据准备
    // ==========================================

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 15).unwrap()
    }

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn step(seq_no: i64, day_offset: i64) -> WorkflowStep {
        WorkflowStep {
            step_id: format!("step-{}", seq_no),
            workflow_id: "wf-1".to_string(),
            seq_no,
            day_offset,
            channel: OutreachChannel::Email,
            tone: MessageTone::Neutral,
        }
    }

    /// 偏移 [3,7,14,21,30] 的五步工作流
    fn five_step_workflow(bucket: AgingBucket) -> DunningWorkflow {
        DunningWorkflow {
            workflow_id: "wf-1".to_string(),
            owner_id: None,
            bucket,
            name: "系统默认".to_string(),
            active: true,
            locked: true,
            cloned_from: None,
            steps: vec![step(1, 3), step(2, 7), step(3, 14), step(4, 21), step(5, 30)],
            created_at: ts(),
            updated_at: ts(),
        }
    }

    /// 指定桶与入桶天数的账款
    fn obligation_in(bucket: AgingBucket, days_in_bucket: i64, id: &str) -> Obligation {
        // 到期日按桶下界反推,保证分桶判定落在目标桶
        let dpd = bucket.dpd_floor() + days_in_bucket.min(20);
        Obligation {
            obligation_id: id.to_string(),
            owner_id: "owner_a".to_string(),
            customer_name: Some("测试客户".to_string()),
            contact_email: Some("ar@example.com".to_string()),
            contact_phone: None,
            contact_outreach_enabled: true,
            amount_cents: 50_000,
            currency: "CNY".to_string(),
            due_date: today() - Duration::days(dpd),
            status: ObligationStatus::Open,
            current_bucket: Some(bucket),
            bucket_entered_on: Some(today() - Duration::days(days_in_bucket)),
            created_at: ts(),
            updated_at: ts(),
        }
    }

    fn bucket_block<'a>(
        report: &'a StepWindowReport,
        bucket: AgingBucket,
    ) -> &'a BucketWindowReport {
        report
            .buckets
            .iter()
            .find(|b| b.bucket == bucket)
            .expect("报表应包含全部账龄桶")
    }

    // ==========================================
    // 第一部分：正常案例
    // ==========================================

    #[test]
    fn test_scenario_1_empty_input() {
        // 场景1: 空输入 → 七个桶全零,无 needs_workflow
        let counter = StepWindowCounter::new();
        let report = counter.build_report(&[], &HashMap::new(), "ALL", today());

        assert_eq!(report.total_eligible, 0);
        assert_eq!(report.buckets.len(), AgingBucket::ALL.len(), "报表应含全部桶");
        for b in &report.buckets {
            assert_eq!(b.total, 0);
            assert!(!b.needs_workflow, "空桶不应提示缺工作流");
        }
    }

    #[test]
    fn test_scenario_2_entry_today_is_pre_step() {
        // 场景2: 今日入桶,首偏移为3 → 未进入任何步骤
        let counter = StepWindowCounter::new();

        let bucket = AgingBucket::Days31To60;
        let mut workflows = HashMap::new();
        workflows.insert(bucket, five_step_workflow(bucket));

        let obligations = vec![obligation_in(bucket, 0, "OBL_001")];
        let report = counter.build_report(&obligations, &workflows, "OWNER:owner_a", today());

        let block = bucket_block(&report, bucket);
        assert_eq!(block.total, 1);
        assert_eq!(block.pre_step, 1, "今日入桶应计入pre_step");
        assert!(block.steps.iter().all(|s| s.count == 0));
    }

    #[test]
    fn test_scenario_3_counts_per_window() {
        // 场景3: 入桶 3/10/35 天 → 分别命中第1/2/5步
        let counter = StepWindowCounter::new();

        let bucket = AgingBucket::Days61To90;
        let mut workflows = HashMap::new();
        workflows.insert(bucket, five_step_workflow(bucket));

        let obligations = vec![
            obligation_in(bucket, 3, "OBL_001"),
            obligation_in(bucket, 10, "OBL_002"),
            obligation_in(bucket, 35, "OBL_003"),
        ];
        let report = counter.build_report(&obligations, &workflows, "ALL", today());

        let block = bucket_block(&report, bucket);
        assert_eq!(block.total, 3);
        assert_eq!(block.pre_step, 0);

        let by_seq: HashMap<i64, i64> = block.steps.iter().map(|s| (s.seq_no, s.count)).collect();
        assert_eq!(by_seq[&1], 1, "入桶3天应命中第1步");
        assert_eq!(by_seq[&2], 1, "入桶10天应命中第2步");
        assert_eq!(by_seq[&5], 1, "入桶35天应命中末步(开放窗口)");
        assert_eq!(by_seq[&3], 0);
        assert_eq!(by_seq[&4], 0);
    }

    #[test]
    fn test_scenario_4_stale_cache_counts_as_entry_today() {
        // 场景4: 缓存桶过期 → 入桶天数记0 → pre_step
        let counter = StepWindowCounter::new();

        // 账款实际逾期65天(DAYS61_TO90),但缓存还停在DAYS31_TO60
        let mut obligation = obligation_in(AgingBucket::Days31To60, 10, "OBL_001");
        obligation.due_date = today() - Duration::days(65);

        let bucket = AgingBucket::Days61To90;
        let mut workflows = HashMap::new();
        workflows.insert(bucket, five_step_workflow(bucket));

        let report = counter.build_report(&[obligation], &workflows, "ALL", today());

        let block = bucket_block(&report, bucket);
        assert_eq!(block.total, 1, "应按重新判定的桶统计");
        assert_eq!(block.pre_step, 1, "缓存过期视同今日入桶");
    }

    // ==========================================
    // 第二部分：配置缺失与配置错误
    // ==========================================

    #[test]
    fn test_scenario_5_needs_workflow_flag() {
        // 场景5: 桶内有账款但没有工作流 → needs_workflow
        let counter = StepWindowCounter::new();

        let bucket = AgingBucket::Days1To30;
        let obligations = vec![obligation_in(bucket, 5, "OBL_001")];
        let report = counter.build_report(&obligations, &HashMap::new(), "ALL", today());

        let block = bucket_block(&report, bucket);
        assert!(block.needs_workflow, "有账款无工作流应提示创建");
        assert_eq!(block.workflow_id, None);
        assert_eq!(block.pre_step, 0, "无工作流不产生pre_step");
    }

    #[test]
    fn test_scenario_6_invalid_offsets_do_not_abort_report() {
        // 场景6: 某桶配置非法 → 该桶记needs_configuration,其余桶照常
        let counter = StepWindowCounter::new();

        let bad_bucket = AgingBucket::Days1To30;
        let good_bucket = AgingBucket::Days31To60;

        let mut bad_workflow = five_step_workflow(bad_bucket);
        bad_workflow.steps = vec![step(1, 7), step(2, 3)]; // 递减

        let mut workflows = HashMap::new();
        workflows.insert(bad_bucket, bad_workflow);
        workflows.insert(good_bucket, five_step_workflow(good_bucket));

        let obligations = vec![
            obligation_in(bad_bucket, 5, "OBL_001"),
            obligation_in(good_bucket, 8, "OBL_002"),
        ];
        let report = counter.build_report(&obligations, &workflows, "ALL", today());

        let bad = bucket_block(&report, bad_bucket);
        assert!(bad.needs_configuration.is_some(), "非法配置应被标记");
        assert_eq!(bad.total, 1, "非法配置的桶仍计入总数");

        let good = bucket_block(&report, good_bucket);
        assert!(good.needs_configuration.is_none());
        let by_seq: HashMap<i64, i64> = good.steps.iter().map(|s| (s.seq_no, s.count)).collect();
        assert_eq!(by_seq[&2], 1, "正常桶不受影响");
    }

    #[test]
    fn test_scenario_7_total_eligible_is_sum() {
        // 场景7: total_eligible 等于各桶 total 之和
        let counter = StepWindowCounter::new();

        let mut workflows = HashMap::new();
        workflows.insert(AgingBucket::Days1To30, five_step_workflow(AgingBucket::Days1To30));

        let obligations = vec![
            obligation_in(AgingBucket::Current, 0, "OBL_001"),
            obligation_in(AgingBucket::Days1To30, 4, "OBL_002"),
            obligation_in(AgingBucket::Days151Plus, 9, "OBL_003"),
        ];
        let report = counter.build_report(&obligations, &workflows, "ALL", today());

        let sum: i64 = report.buckets.iter().map(|b| b.total).sum();
        assert_eq!(report.total_eligible, 3);
        assert_eq!(sum, 3, "各桶合计应等于总数");
    }
}
