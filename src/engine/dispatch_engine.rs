// ==========================================
// 应收账款催收系统 - 模板发送引擎
// ==========================================
// 依据: Dunning_Engine_Specs_v1.0.md - 5. 发送引擎
// 红线: 幂等预检在投递调用之前,送达记录落库之后才计 sent
// 红线: 单笔投递失败绝不中断本轮,FAILED 审计记录不阻断下轮重试
// 红线: 运行内快照一致,中途的后台变更不影响本轮判定
// ==========================================
// 职责: 已审批模板 × 命中步骤窗口的可催收账款 → 渲染投递并落发送记录
// 输入: 作用域 + today
// 输出: BatchOutcome<DispatchSummary>
// ==========================================

use crate::config::DunningConfigReader;
use crate::delivery::{recipient_for, render_template, DeliveryRequest, MessageDeliveryService};
use crate::domain::obligation::Obligation;
use crate::domain::template::{DispatchRecord, DraftTemplate};
use crate::domain::types::{AgingBucket, DispatchOutcome, TemplateState};
use crate::domain::workflow::DunningWorkflow;
use crate::engine::batch::{BatchOutcome, BatchRunner, ChunkMerge, TracingProgressObserver};
use crate::engine::bucket_classifier::BucketClassifier;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::workflow_resolver::{StepResolution, StepSchedule, WorkflowResolver};
use crate::repository::{
    ObligationRepository, RepositoryError, TemplateRepository, WorkflowRepository,
};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

// ==========================================
// 汇总类型
// ==========================================

#[derive(Debug, Clone, Serialize)]
pub struct DispatchErrorDetail {
    pub obligation_id: String,
    /// 投递前置失败(如步骤配置非法)时为空
    pub template_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchSummary {
    /// 送达且发送记录落库的条数
    pub sent: i64,
    /// 跳过条数(幂等命中/资格不符/收件人缺失/并发重复)
    pub skipped: i64,
    pub errors: i64,
    pub error_details: Vec<DispatchErrorDetail>,
}

impl ChunkMerge for DispatchSummary {
    fn merge(&mut self, other: Self) {
        self.sent += other.sent;
        self.skipped += other.skipped;
        self.errors += other.errors;
        self.error_details.extend(other.error_details);
    }
}

// ==========================================
// 运行快照
// ==========================================

/// 单次运行的只读快照,分片间共享
///
/// 运行开始时一次性读取,运行期间不再回源,
/// 保证同一账款在本轮内的桶位/步骤判定不漂移
struct DispatchContext {
    template_repo: Arc<TemplateRepository>,
    delivery: Arc<dyn MessageDeliveryService>,
    /// (owner_id, bucket) -> 生效工作流的经校验步骤视图
    schedules: HashMap<(String, AgingBucket), StepSchedule>,
    /// (owner_id, bucket) -> 步骤配置错误(需人工修复)
    config_errors: HashMap<(String, AgingBucket), String>,
    /// (owner_id, step_id) -> 已审批模板
    templates_by_step: HashMap<(String, String), Vec<DraftTemplate>>,
    paused_owners: HashSet<String>,
    delivery_timeout: Duration,
    today: NaiveDate,
}

// ==========================================
// DispatchEngine - 模板发送引擎
// ==========================================
pub struct DispatchEngine<C>
where
    C: DunningConfigReader,
{
    obligation_repo: Arc<ObligationRepository>,
    workflow_repo: Arc<WorkflowRepository>,
    template_repo: Arc<TemplateRepository>,
    delivery: Arc<dyn MessageDeliveryService>,
    config: Arc<C>,
}

impl<C> DispatchEngine<C>
where
    C: DunningConfigReader,
{
    /// 创建新的模板发送引擎
    pub fn new(
        obligation_repo: Arc<ObligationRepository>,
        workflow_repo: Arc<WorkflowRepository>,
        template_repo: Arc<TemplateRepository>,
        delivery: Arc<dyn MessageDeliveryService>,
        config: Arc<C>,
    ) -> Self {
        Self {
            obligation_repo,
            workflow_repo,
            template_repo,
            delivery,
            config,
        }
    }

    /// 作用域内发送全部已审批模板
    ///
    /// # 参数
    /// - owner_id: Some 时限定单一债权人,None 为全量
    /// - today: 注入的业务日期(桶位判定与占位符渲染共用)
    ///
    /// # 说明
    /// - 紧接着重复运行第二次必然 sent=0(幂等)
    /// - 输入集合读取失败是唯一的整体失败;之后的单笔失败只计入汇总
    #[instrument(skip(self), fields(scope = owner_id.unwrap_or("ALL"), %today))]
    pub async fn dispatch_scope(
        &self,
        owner_id: Option<&str>,
        today: NaiveDate,
    ) -> EngineResult<BatchOutcome<DispatchSummary>> {
        // ===== 步骤 1: 读取配置 =====
        let chunk_size = self.read_usize_config(
            self.config.get_dispatch_chunk_size().await,
            "dispatch_chunk_size",
        )?;
        let concurrency = self.read_usize_config(
            self.config.get_dispatch_max_concurrency().await,
            "dispatch_max_concurrency",
        )?;
        let timeout_secs = self
            .config
            .get_delivery_timeout_secs()
            .await
            .map_err(|e| EngineError::ConfigReadError {
                key: "delivery_timeout_secs".to_string(),
                message: e.to_string(),
            })?;

        // ===== 步骤 2: 快照读取 =====
        let obligations = self.obligation_repo.list_outreach_eligible(owner_id)?;
        let paused_owners = self.obligation_repo.list_paused_owners()?;
        let templates_by_step = self.load_approved_templates(owner_id)?;

        info!(
            obligations = obligations.len(),
            template_groups = templates_by_step.len(),
            paused = paused_owners.len(),
            "发送快照加载完成"
        );

        // ===== 步骤 3: 生效工作流预裁决与步骤视图构建(每 (债权人,桶位) 一次) =====
        let (schedules, config_errors) = self.resolve_step_schedules(&obligations, today)?;

        let ctx = Arc::new(DispatchContext {
            template_repo: self.template_repo.clone(),
            delivery: self.delivery.clone(),
            schedules,
            config_errors,
            templates_by_step,
            paused_owners,
            delivery_timeout: Duration::from_secs(timeout_secs),
            today,
        });

        // ===== 步骤 4: 分片发送 =====
        let runner = BatchRunner::new(chunk_size, concurrency);
        let observer = TracingProgressObserver::new("dispatch_approved_templates");
        let outcome = runner
            .run(obligations, &observer, |_idx, chunk| {
                let ctx = ctx.clone();
                async move { process_chunk(chunk, ctx).await }
            })
            .await;

        // ===== 步骤 5: 汇总 =====
        info!(
            sent = outcome.merged.sent,
            skipped = outcome.merged.skipped,
            errors = outcome.merged.errors,
            failed_chunks = outcome.failed_chunks.len(),
            canceled = outcome.canceled,
            "模板发送完成"
        );
        Ok(outcome)
    }

    fn read_usize_config(
        &self,
        value: Result<usize, Box<dyn std::error::Error>>,
        key: &str,
    ) -> EngineResult<usize> {
        value.map_err(|e| EngineError::ConfigReadError {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    /// 已审批模板按 (owner_id, step_id) 分组
    fn load_approved_templates(
        &self,
        owner_id: Option<&str>,
    ) -> EngineResult<HashMap<(String, String), Vec<DraftTemplate>>> {
        let approved =
            self.template_repo
                .list_templates(owner_id, None, Some(TemplateState::Approved))?;

        let mut grouped: HashMap<(String, String), Vec<DraftTemplate>> = HashMap::new();
        for template in approved {
            grouped
                .entry((template.owner_id.clone(), template.step_id.clone()))
                .or_default()
                .push(template);
        }
        Ok(grouped)
    }

    /// 每个出现的 (债权人,桶位) 裁决一次生效工作流并构建步骤视图
    ///
    /// 排序与偏移校验都在这里一次完成,分片内逐笔只做二分定位;
    /// 步骤配置非法的组合进入 config_errors,
    /// 其账款在发送阶段逐笔计错误(绝不静默兜底)
    fn resolve_step_schedules(
        &self,
        obligations: &[Obligation],
        today: NaiveDate,
    ) -> EngineResult<(
        HashMap<(String, AgingBucket), StepSchedule>,
        HashMap<(String, AgingBucket), String>,
    )> {
        let classifier = BucketClassifier::new();
        let resolver = WorkflowResolver::new();

        // 按债权人加载一次候选(系统 + 自定义,全桶位)
        let mut candidates_by_owner: HashMap<String, Vec<DunningWorkflow>> = HashMap::new();
        for obligation in obligations {
            if !candidates_by_owner.contains_key(&obligation.owner_id) {
                let candidates = self
                    .workflow_repo
                    .list_for_scope(None, Some(&obligation.owner_id))?;
                candidates_by_owner.insert(obligation.owner_id.clone(), candidates);
            }
        }

        let mut schedules = HashMap::new();
        let mut config_errors = HashMap::new();

        for obligation in obligations {
            let (bucket, _) = classifier.classify(obligation.due_date, today);
            let key = (obligation.owner_id.clone(), bucket);
            if schedules.contains_key(&key) || config_errors.contains_key(&key) {
                continue;
            }

            let candidates = match candidates_by_owner.get(&obligation.owner_id) {
                Some(c) => c,
                None => continue,
            };
            let in_bucket: Vec<DunningWorkflow> = candidates
                .iter()
                .filter(|w| w.bucket == bucket)
                .cloned()
                .collect();

            if let Some(workflow) = resolver.pick_effective(&in_bucket) {
                match resolver.step_schedule(workflow) {
                    Ok(schedule) => {
                        schedules.insert(key, schedule);
                    }
                    Err(e) => {
                        config_errors.insert(key, e.to_string());
                    }
                }
            }
            // 无工作流的桶位不进任何表: 发送阶段自然不产出
        }

        Ok((schedules, config_errors))
    }
}

// ==========================================
// 分片处理
// ==========================================

/// 处理一个分片内的全部账款
///
/// 规则(逐笔顺序执行):
/// 1) 发送时点资格复核: 状态可催收、债权人未暂停、联系人未退订
/// 2) 桶位判定 + 预构建步骤视图上的窗口定位,任一无结果则该账款不产出
/// 3) 命中步骤的每个已审批模板逐一投递(见 dispatch_template)
async fn process_chunk(
    chunk: Vec<Obligation>,
    ctx: Arc<DispatchContext>,
) -> EngineResult<DispatchSummary> {
    let classifier = BucketClassifier::new();
    let resolver = WorkflowResolver::new();
    let mut summary = DispatchSummary::default();

    for obligation in &chunk {
        // ===== 资格复核 =====
        if !obligation.status.is_outreach_eligible() {
            summary.skipped += 1;
            continue;
        }
        if ctx.paused_owners.contains(&obligation.owner_id) {
            summary.skipped += 1;
            continue;
        }
        if !obligation.contact_outreach_enabled {
            summary.skipped += 1;
            continue;
        }

        // ===== 桶位与步骤定位 =====
        let (bucket, _) = classifier.classify(obligation.due_date, ctx.today);
        let key = (obligation.owner_id.clone(), bucket);

        if let Some(message) = ctx.config_errors.get(&key) {
            summary.errors += 1;
            summary.error_details.push(DispatchErrorDetail {
                obligation_id: obligation.obligation_id.clone(),
                template_id: String::new(),
                reason: message.clone(),
            });
            continue;
        }

        let schedule = match ctx.schedules.get(&key) {
            Some(s) => s,
            None => continue,
        };

        let days = resolver.days_since_entry(obligation, bucket, ctx.today);
        let step = match schedule.resolve(days) {
            StepResolution::Active { step } => step,
            StepResolution::NoActiveStep => continue,
        };

        // ===== 逐模板投递 =====
        let template_key = (obligation.owner_id.clone(), step.step_id.clone());
        let templates = match ctx.templates_by_step.get(&template_key) {
            Some(t) => t,
            None => continue,
        };

        for template in templates {
            dispatch_template(obligation, template, &ctx, &mut summary).await;
        }
    }

    Ok(summary)
}

/// 单条 (账款, 模板) 投递
///
/// 规则(顺序执行):
/// 1) 幂等预检: 已有非 FAILED 发送记录 → skipped
/// 2) 渠道收件人缺失 → skipped
/// 3) 渲染占位符,按配置超时调用投递服务
/// 4) 送达 → 先落 DELIVERED 记录再计 sent;记录写入撞唯一索引(并发重复) → skipped
/// 5) 失败/超时 → 落 FAILED 审计记录并计错误,该组合下轮仍可重试
async fn dispatch_template(
    obligation: &Obligation,
    template: &DraftTemplate,
    ctx: &DispatchContext,
    summary: &mut DispatchSummary,
) {
    let fail = |summary: &mut DispatchSummary, reason: String| {
        summary.errors += 1;
        summary.error_details.push(DispatchErrorDetail {
            obligation_id: obligation.obligation_id.clone(),
            template_id: template.template_id.clone(),
            reason,
        });
    };

    // ===== 幂等预检(投递调用之前) =====
    match ctx
        .template_repo
        .has_live_dispatch(&obligation.obligation_id, &template.template_id)
    {
        Ok(true) => {
            summary.skipped += 1;
            return;
        }
        Ok(false) => {}
        Err(e) => {
            fail(summary, format!("幂等预检失败: {}", e));
            return;
        }
    }

    // ===== 收件人 =====
    let recipient = match recipient_for(obligation, template.channel) {
        Some(r) => r,
        None => {
            summary.skipped += 1;
            return;
        }
    };

    // ===== 渲染与投递 =====
    let rendered = render_template(template, obligation, ctx.today);
    let request = DeliveryRequest {
        channel: template.channel,
        recipient,
        subject: rendered.subject,
        body: rendered.body,
    };

    let send_result = match tokio::time::timeout(ctx.delivery_timeout, ctx.delivery.send(&request))
        .await
    {
        Ok(Ok(_receipt)) => Ok(()),
        Ok(Err(e)) => Err(e.reason),
        Err(_) => Err(format!("投递超时({}s)", ctx.delivery_timeout.as_secs())),
    };

    // ===== 落发送记录 =====
    match send_result {
        Ok(()) => {
            let record = dispatch_record(obligation, template, DispatchOutcome::Delivered, None);
            match ctx.template_repo.insert_dispatch_record(&record) {
                Ok(()) => summary.sent += 1,
                Err(RepositoryError::UniqueConstraintViolation(_)) => {
                    // 并发窗口内另一 worker 已发成功
                    summary.skipped += 1;
                }
                Err(e) => {
                    fail(summary, format!("已送达但发送记录写入失败,下轮按未发送处理: {}", e));
                }
            }
        }
        Err(reason) => {
            let record = dispatch_record(
                obligation,
                template,
                DispatchOutcome::Failed,
                Some(reason.clone()),
            );
            if let Err(e) = ctx.template_repo.insert_dispatch_record(&record) {
                warn!(
                    obligation_id = %obligation.obligation_id,
                    template_id = %template.template_id,
                    "FAILED 审计记录写入失败: {}", e
                );
            }
            fail(summary, reason);
        }
    }
}

fn dispatch_record(
    obligation: &Obligation,
    template: &DraftTemplate,
    outcome: DispatchOutcome,
    failure_reason: Option<String>,
) -> DispatchRecord {
    DispatchRecord {
        dispatch_id: Uuid::new_v4().to_string(),
        obligation_id: obligation.obligation_id.clone(),
        template_id: template.template_id.clone(),
        channel: template.channel,
        outcome,
        failure_reason,
        dispatched_at: Local::now().naive_local(),
    }
}
