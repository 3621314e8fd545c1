// ==========================================
// 应收账款催收系统 - 催收运行 API
// ==========================================
// 依据: Dunning_Engine_Specs_v1.0.md - 6. 批量执行
// 职责: 聚合三个批量操作与步骤窗口报表,统一作用域/审计/性能护栏
// 红线: 三个批量操作每次运行必须写 engine_run_log(开始与收尾各一笔)
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::DunningConfigReader;
use crate::delivery::MessageDeliveryService;
use crate::domain::run_log::EngineRunLog;
use crate::domain::types::{AgingBucket, OwnerScope, RunStatus};
use crate::domain::workflow::DunningWorkflow;
use crate::engine::batch::BatchOutcome;
use crate::engine::dispatch_engine::{DispatchEngine, DispatchSummary};
use crate::engine::reassign::{ReassignSummary, ReassignmentEngine};
use crate::engine::step_window_counter::{StepWindowCounter, StepWindowReport};
use crate::engine::template_generator::{
    GenerationHints, TemplateGenerationEngine, TemplateGenerationSummary,
};
use crate::engine::workflow_resolver::WorkflowResolver;
use crate::perf::PerfGuard;
use crate::repository::{
    ObligationRepository, RunLogRepository, TemplateRepository, WorkflowRepository,
};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

// ==========================================
// DunningApi
// ==========================================

/// 催收运行 API
///
/// 职责：
/// 1. 桶位重算(定时/手动)
/// 2. 拟稿模板生成(单债权人)
/// 3. 已审批模板发送(定时/手动)
/// 4. 步骤窗口统计报表
pub struct DunningApi<C>
where
    C: DunningConfigReader,
{
    obligation_repo: Arc<ObligationRepository>,
    workflow_repo: Arc<WorkflowRepository>,
    run_log_repo: Arc<RunLogRepository>,
    reassignment_engine: ReassignmentEngine<C>,
    dispatch_engine: DispatchEngine<C>,
    generation_engine: TemplateGenerationEngine,
    counter: StepWindowCounter,
    resolver: WorkflowResolver,
}

impl<C> DunningApi<C>
where
    C: DunningConfigReader,
{
    /// 创建新的 DunningApi 实例(引擎在内部组装)
    pub fn new(
        obligation_repo: Arc<ObligationRepository>,
        workflow_repo: Arc<WorkflowRepository>,
        template_repo: Arc<TemplateRepository>,
        run_log_repo: Arc<RunLogRepository>,
        delivery: Arc<dyn MessageDeliveryService>,
        config: Arc<C>,
    ) -> Self {
        let reassignment_engine =
            ReassignmentEngine::new(obligation_repo.clone(), config.clone());
        let dispatch_engine = DispatchEngine::new(
            obligation_repo.clone(),
            workflow_repo.clone(),
            template_repo.clone(),
            delivery,
            config,
        );
        let generation_engine =
            TemplateGenerationEngine::new(workflow_repo.clone(), template_repo);

        Self {
            obligation_repo,
            workflow_repo,
            run_log_repo,
            reassignment_engine,
            dispatch_engine,
            generation_engine,
            counter: StepWindowCounter::new(),
            resolver: WorkflowResolver::new(),
        }
    }

    // ==========================================
    // 批量操作
    // ==========================================

    /// 作用域内全量桶位重算
    pub async fn reassign_buckets(
        &self,
        scope: &OwnerScope,
        today: NaiveDate,
    ) -> ApiResult<BatchOutcome<ReassignSummary>> {
        let _perf = PerfGuard::new("api.reassign_buckets");
        info!(scope = %scope, %today, "桶位重算开始");
        let run_id = self.log_run_started("REASSIGN_BUCKETS", scope, today);

        match self
            .reassignment_engine
            .reassign_scope(scope.owner_id(), today)
            .await
        {
            Ok(outcome) => {
                let status = batch_run_status(&outcome);
                self.log_run_finished(&run_id, status, summary_json(&outcome), None);
                info!(scope = %scope, status = %status, "桶位重算结束");
                Ok(outcome)
            }
            Err(e) => {
                self.log_run_finished(&run_id, RunStatus::Failed, None, Some(&e.to_string()));
                Err(e.into())
            }
        }
    }

    /// 为单债权人在指定桶位生成拟稿模板
    ///
    /// # 说明
    /// - 生成是全有审批前置的: 产出一律 PENDING_APPROVAL
    /// - 无工作流不是错误,summary.needs_workflow=true 供前台引导配置
    pub fn generate_templates(
        &self,
        owner_id: &str,
        bucket: AgingBucket,
        tone_modifier: Option<String>,
        approach_style: Option<String>,
        today: NaiveDate,
    ) -> ApiResult<TemplateGenerationSummary> {
        let _perf = PerfGuard::new("api.generate_templates");
        if owner_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("owner_id 不能为空".to_string()));
        }
        info!(owner_id, bucket = %bucket, "模板生成开始");

        let scope = OwnerScope::Owner(owner_id.to_string());
        let run_id = self.log_run_started("GENERATE_TEMPLATES", &scope, today);

        let hints = GenerationHints {
            tone_modifier,
            approach_style,
        };
        let summary = self
            .generation_engine
            .generate_for_bucket(owner_id, bucket, &hints);

        let status = if summary.success {
            RunStatus::Completed
        } else {
            RunStatus::Partial
        };
        self.log_run_finished(&run_id, status, summary_json(&summary), None);
        info!(
            owner_id,
            created = summary.templates_created,
            needs_workflow = summary.needs_workflow,
            "模板生成结束"
        );
        Ok(summary)
    }

    /// 作用域内发送全部已审批模板
    pub async fn dispatch_approved_templates(
        &self,
        scope: &OwnerScope,
        today: NaiveDate,
    ) -> ApiResult<BatchOutcome<DispatchSummary>> {
        let _perf = PerfGuard::new("api.dispatch_approved_templates");
        info!(scope = %scope, %today, "模板发送开始");
        let run_id = self.log_run_started("DISPATCH_TEMPLATES", scope, today);

        match self
            .dispatch_engine
            .dispatch_scope(scope.owner_id(), today)
            .await
        {
            Ok(outcome) => {
                let status = batch_run_status(&outcome);
                self.log_run_finished(&run_id, status, summary_json(&outcome), None);
                info!(scope = %scope, status = %status, "模板发送结束");
                Ok(outcome)
            }
            Err(e) => {
                self.log_run_finished(&run_id, RunStatus::Failed, None, Some(&e.to_string()));
                Err(e.into())
            }
        }
    }

    // ==========================================
    // 报表
    // ==========================================

    /// 步骤窗口统计报表
    ///
    /// # 说明
    /// - 只读,不写运行日志
    /// - Owner 作用域按 自定义优先于系统 解析各桶生效工作流;
    ///   All 作用域按系统默认视图解析
    pub fn step_window_report(
        &self,
        scope: &OwnerScope,
        today: NaiveDate,
    ) -> ApiResult<StepWindowReport> {
        let _perf = PerfGuard::new("api.step_window_report");

        let obligations = self.obligation_repo.list_outreach_eligible(scope.owner_id())?;

        let mut effective_by_bucket: HashMap<AgingBucket, DunningWorkflow> = HashMap::new();
        for bucket in AgingBucket::ALL {
            let candidates = self
                .workflow_repo
                .list_for_scope(Some(bucket), scope.owner_id())?;
            if let Some(workflow) = self.resolver.pick_effective(&candidates) {
                effective_by_bucket.insert(bucket, workflow.clone());
            }
        }

        let report =
            self.counter
                .build_report(&obligations, &effective_by_bucket, &scope.describe(), today);
        info!(
            scope = %scope,
            total_eligible = report.total_eligible,
            "步骤窗口报表生成完成"
        );
        Ok(report)
    }

    // ==========================================
    // 运行审计
    // ==========================================

    /// 运行日志写入尽力而为: 审计不可用时告警但不阻断业务操作
    fn log_run_started(&self, operation: &str, scope: &OwnerScope, today: NaiveDate) -> String {
        let run_id = Uuid::new_v4().to_string();
        let run = EngineRunLog {
            run_id: run_id.clone(),
            operation: operation.to_string(),
            owner_scope: scope.describe(),
            run_date: today,
            started_at: Local::now().naive_local(),
            completed_at: None,
            duration_ms: None,
            status: RunStatus::Running,
            summary_json: None,
            error_message: None,
        };
        if let Err(e) = self.run_log_repo.insert_started(&run) {
            warn!(operation, "运行日志写入失败,本次运行不留痕: {}", e);
        }
        run_id
    }

    fn log_run_finished(
        &self,
        run_id: &str,
        status: RunStatus,
        summary: Option<JsonValue>,
        error: Option<&str>,
    ) {
        if let Err(e) = self
            .run_log_repo
            .mark_completed(run_id, status, summary.as_ref(), error)
        {
            warn!(run_id, "运行日志收尾失败: {}", e);
        }
    }
}

/// 分片结果映射运行状态: 有失败分片或被取消 → PARTIAL
fn batch_run_status<R>(outcome: &BatchOutcome<R>) -> RunStatus {
    if outcome.canceled || !outcome.failed_chunks.is_empty() {
        RunStatus::Partial
    } else {
        RunStatus::Completed
    }
}

fn summary_json<T: Serialize>(value: &T) -> Option<JsonValue> {
    serde_json::to_value(value).ok()
}

// ==========================================
// 单元测试
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigManager;
    use crate::db;
    use crate::delivery::LogOnlyDeliveryService;
    use crate::domain::obligation::Obligation;
    use crate::domain::template::DraftTemplate;
    use crate::domain::types::{
        MessageTone, ObligationStatus, OutreachChannel, TemplateState,
    };
    use crate::domain::workflow::WorkflowStep;
    use chrono::Duration;
    use rusqlite::Connection;
    use std::sync::Mutex as StdMutex;

    struct ApiHarness {
        obligation_repo: Arc<ObligationRepository>,
        workflow_repo: Arc<WorkflowRepository>,
        template_repo: Arc<TemplateRepository>,
        run_log_repo: Arc<RunLogRepository>,
        api: DunningApi<ConfigManager>,
    }

    fn setup() -> ApiHarness {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let shared = Arc::new(StdMutex::new(conn));

        let obligation_repo = Arc::new(ObligationRepository::new(shared.clone()));
        let workflow_repo = Arc::new(WorkflowRepository::new(shared.clone()));
        let template_repo = Arc::new(TemplateRepository::new(shared.clone()));
        let run_log_repo = Arc::new(RunLogRepository::new(shared.clone()));
        let config = Arc::new(ConfigManager::from_connection(shared).unwrap());

        let api = DunningApi::new(
            obligation_repo.clone(),
            workflow_repo.clone(),
            template_repo.clone(),
            run_log_repo.clone(),
            Arc::new(LogOnlyDeliveryService),
            config,
        );
        ApiHarness {
            obligation_repo,
            workflow_repo,
            template_repo,
            run_log_repo,
            api,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 15).unwrap()
    }

    fn ts() -> chrono::NaiveDateTime {
        today().and_hms_opt(8, 0, 0).unwrap()
    }

    fn obligation(id: &str, overdue_days: i64) -> Obligation {
        Obligation {
            obligation_id: id.to_string(),
            owner_id: "owner_a".to_string(),
            customer_name: Some("测试客户".to_string()),
            contact_email: Some("ar@example.com".to_string()),
            contact_phone: None,
            contact_outreach_enabled: true,
            amount_cents: 120_000,
            currency: "CNY".to_string(),
            due_date: today() - Duration::days(overdue_days),
            status: ObligationStatus::Open,
            current_bucket: None,
            bucket_entered_on: None,
            created_at: ts(),
            updated_at: ts(),
        }
    }

    fn system_workflow(workflow_id: &str, bucket: AgingBucket, offsets: &[i64]) -> DunningWorkflow {
        let steps = offsets
            .iter()
            .enumerate()
            .map(|(i, off)| WorkflowStep {
                step_id: format!("{}_step_{}", workflow_id, i + 1),
                workflow_id: workflow_id.to_string(),
                seq_no: (i + 1) as i64,
                day_offset: *off,
                channel: OutreachChannel::Email,
                tone: MessageTone::Friendly,
            })
            .collect();
        DunningWorkflow {
            workflow_id: workflow_id.to_string(),
            owner_id: None,
            bucket,
            name: format!("系统默认 {}", bucket),
            active: true,
            locked: true,
            cloned_from: None,
            steps,
            created_at: ts(),
            updated_at: ts(),
        }
    }

    #[tokio::test]
    async fn test_reassign_writes_completed_run_log() {
        // 重算成功 → COMPLETED 运行日志含汇总 JSON
        let harness = setup();
        harness
            .obligation_repo
            .batch_upsert(&[obligation("OBL_001", 45)])
            .unwrap();

        let outcome = harness
            .api
            .reassign_buckets(&OwnerScope::All, today())
            .await
            .unwrap();
        assert_eq!(outcome.merged.reassigned, 1);

        let runs = harness.run_log_repo.recent_runs(10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].operation, "REASSIGN_BUCKETS");
        assert_eq!(runs[0].owner_scope, "ALL");
        assert_eq!(runs[0].status, RunStatus::Completed);
        let summary = runs[0].summary_json.as_ref().expect("应有汇总 JSON");
        assert_eq!(summary["merged"]["reassigned"], 1);
    }

    #[tokio::test]
    async fn test_dispatch_end_to_end_through_api() {
        // 播种 账款+工作流+已审批模板 → API 发送 1 条并留痕
        let harness = setup();
        let mut seeded = obligation("OBL_001", 15);
        seeded.current_bucket = Some(AgingBucket::Days1To30);
        seeded.bucket_entered_on = Some(today() - Duration::days(5));
        harness.obligation_repo.batch_upsert(&[seeded]).unwrap();
        harness
            .workflow_repo
            .insert_workflow(&system_workflow("wf_1", AgingBucket::Days1To30, &[3]))
            .unwrap();
        harness
            .template_repo
            .insert_template(&DraftTemplate {
                template_id: "tpl_1".to_string(),
                owner_id: "owner_a".to_string(),
                bucket: AgingBucket::Days1To30,
                workflow_id: "wf_1".to_string(),
                step_id: "wf_1_step_1".to_string(),
                step_seq_no: 1,
                channel: OutreachChannel::Email,
                tone: MessageTone::Friendly,
                subject: Some("付款提醒".to_string()),
                body: "{{customer_name}}您好".to_string(),
                state: TemplateState::Approved,
                created_at: ts(),
                updated_at: ts(),
            })
            .unwrap();

        let outcome = harness
            .api
            .dispatch_approved_templates(&OwnerScope::All, today())
            .await
            .unwrap();

        assert_eq!(outcome.merged.sent, 1);
        let runs = harness.run_log_repo.recent_runs(10).unwrap();
        assert_eq!(runs[0].operation, "DISPATCH_TEMPLATES");
        assert_eq!(runs[0].status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_owner() {
        let harness = setup();
        let result = harness.api.generate_templates(
            "  ",
            AgingBucket::Days1To30,
            None,
            None,
            today(),
        );
        assert!(matches!(result, Err(ApiError::InvalidInput(_))));
        assert!(
            harness.run_log_repo.recent_runs(10).unwrap().is_empty(),
            "入参校验失败不留运行痕"
        );
    }

    #[tokio::test]
    async fn test_generate_writes_run_log_with_summary() {
        let harness = setup();
        harness
            .workflow_repo
            .insert_workflow(&system_workflow("wf_1", AgingBucket::Days1To30, &[3, 7]))
            .unwrap();

        let summary = harness
            .api
            .generate_templates("owner_a", AgingBucket::Days1To30, None, None, today())
            .unwrap();

        assert!(summary.success);
        assert_eq!(summary.templates_created, 2);
        let runs = harness.run_log_repo.recent_runs(10).unwrap();
        assert_eq!(runs[0].operation, "GENERATE_TEMPLATES");
        assert_eq!(runs[0].owner_scope, "OWNER:owner_a");
        assert_eq!(runs[0].status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_report_prefers_custom_workflow_in_owner_scope() {
        // Owner 作用域: 自定义工作流覆盖系统默认
        let harness = setup();
        harness
            .obligation_repo
            .batch_upsert(&[obligation("OBL_001", 15)])
            .unwrap();
        harness
            .workflow_repo
            .insert_workflow(&system_workflow("wf_sys", AgingBucket::Days1To30, &[3]))
            .unwrap();
        let mut custom = system_workflow("wf_custom", AgingBucket::Days1To30, &[1, 9]);
        custom.owner_id = Some("owner_a".to_string());
        custom.locked = false;
        harness.workflow_repo.insert_workflow(&custom).unwrap();

        let report = harness
            .api
            .step_window_report(&OwnerScope::Owner("owner_a".to_string()), today())
            .unwrap();

        let bucket_report = report
            .buckets
            .iter()
            .find(|b| b.bucket == AgingBucket::Days1To30)
            .unwrap();
        assert_eq!(
            bucket_report.workflow_id.as_deref(),
            Some("wf_custom"),
            "自定义工作流优先"
        );
        assert_eq!(bucket_report.steps.len(), 2);

        // All 作用域退回系统视图
        let report = harness
            .api
            .step_window_report(&OwnerScope::All, today())
            .unwrap();
        let bucket_report = report
            .buckets
            .iter()
            .find(|b| b.bucket == AgingBucket::Days1To30)
            .unwrap();
        assert_eq!(bucket_report.workflow_id.as_deref(), Some("wf_sys"));
    }
}
