// ==========================================
// 应收账款催收系统 - 模板生成引擎
// ==========================================
// 依据: Dunning_Engine_Specs_v1.0.md - 4. 模板生成与审批
// 红线: 每个 (步骤, 债权人) 至多一份在用模板,在用=待审批或已审批
// 红线: 生成的模板一律 PENDING_APPROVAL,人工审批后才可发送
// 红线: 文案来自内置确定性文案库,不调用外部服务
// ==========================================
// 职责: 按生效工作流逐步骤物化草稿模板
// 输入: (债权人, 账龄桶) + 可选文案提示
// 输出: TemplateGenerationSummary
// ==========================================

use crate::domain::template::DraftTemplate;
use crate::domain::types::{AgingBucket, MessageTone, OutreachChannel, TemplateState};
use crate::domain::workflow::WorkflowStep;
use crate::engine::workflow_resolver::WorkflowResolver;
use crate::repository::{TemplateRepository, WorkflowRepository};
use chrono::Local;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

// ==========================================
// 生成提示与结果汇总
// ==========================================

/// 人工触发生成时的可选文案提示(自由文本)
#[derive(Debug, Clone, Default)]
pub struct GenerationHints {
    pub tone_modifier: Option<String>,
    pub approach_style: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct TemplateGenerationSummary {
    pub success: bool,
    pub templates_created: i64,
    /// 已有在用模板而跳过的步骤数
    pub skipped_existing: i64,
    /// 桶下没有任何工作流(正常结果,提示先建工作流)
    pub needs_workflow: bool,
    pub errors: Vec<String>,
}

// ==========================================
// TemplateGenerationEngine - 模板生成引擎
// ==========================================
pub struct TemplateGenerationEngine {
    workflow_repo: Arc<WorkflowRepository>,
    template_repo: Arc<TemplateRepository>,
    resolver: WorkflowResolver,
}

impl TemplateGenerationEngine {
    /// 创建新的模板生成引擎
    pub fn new(
        workflow_repo: Arc<WorkflowRepository>,
        template_repo: Arc<TemplateRepository>,
    ) -> Self {
        Self {
            workflow_repo,
            template_repo,
            resolver: WorkflowResolver::new(),
        }
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 为 (债权人, 账龄桶) 生成缺失的草稿模板
    ///
    /// 流程:
    /// 1) 裁决生效工作流;没有 → needs_workflow,直接返回
    /// 2) 校验步骤窗口定义;非法 → 记错误,一个不生成
    /// 3) 逐步骤: 已有在用模板 → 跳过;否则按文案库物化 PENDING_APPROVAL 草稿
    ///
    /// # 说明
    /// - 单步骤写库失败只记入 errors,不中断其余步骤
    #[instrument(skip(self, hints), fields(owner = %owner_id, bucket = %bucket))]
    pub fn generate_for_bucket(
        &self,
        owner_id: &str,
        bucket: AgingBucket,
        hints: &GenerationHints,
    ) -> TemplateGenerationSummary {
        let mut summary = TemplateGenerationSummary::default();

        // 1. 生效工作流裁决
        let candidates = match self.workflow_repo.list_for_scope(Some(bucket), Some(owner_id)) {
            Ok(c) => c,
            Err(e) => {
                summary.errors.push(format!("加载工作流失败: {}", e));
                return summary;
            }
        };
        let Some(workflow) = self.resolver.pick_effective(&candidates) else {
            info!(owner = %owner_id, bucket = %bucket, "桶下没有工作流,跳过生成");
            summary.needs_workflow = true;
            summary.success = true;
            return summary;
        };

        // 2. 步骤窗口定义校验(同时得到 seq_no 有序视图)
        let schedule = match self.resolver.step_schedule(workflow) {
            Ok(s) => s,
            Err(e) => {
                warn!(workflow_id = %workflow.workflow_id, "步骤配置非法,不生成模板: {}", e);
                summary.errors.push(e.to_string());
                return summary;
            }
        };

        // 3. 查询各步骤的在用模板
        let step_ids: Vec<String> = schedule.steps().iter().map(|s| s.step_id.clone()).collect();
        let live_by_step = match self.template_repo.list_live_by_step(owner_id, &step_ids) {
            Ok(m) => m,
            Err(e) => {
                summary.errors.push(format!("加载在用模板失败: {}", e));
                return summary;
            }
        };

        // 4. 逐步骤物化
        for step in schedule.steps() {
            if live_by_step.contains_key(&step.step_id) {
                summary.skipped_existing += 1;
                continue;
            }

            let template =
                self.build_template(owner_id, &workflow.workflow_id, bucket, step, hints);
            match self.template_repo.insert_template(&template) {
                Ok(()) => summary.templates_created += 1,
                Err(e) => summary
                    .errors
                    .push(format!("步骤 seq_no={} 模板写入失败: {}", step.seq_no, e)),
            }
        }

        summary.success = summary.errors.is_empty();
        info!(
            owner = %owner_id,
            bucket = %bucket,
            created = summary.templates_created,
            skipped = summary.skipped_existing,
            errors = summary.errors.len(),
            "模板生成完成"
        );
        summary
    }

    /// 按文案库物化单步骤草稿（重新生成复用同一入口）
    pub fn build_template(
        &self,
        owner_id: &str,
        workflow_id: &str,
        bucket: AgingBucket,
        step: &WorkflowStep,
        hints: &GenerationHints,
    ) -> DraftTemplate {
        let now = Local::now().naive_local();
        let subject = match step.channel {
            OutreachChannel::Email => Some(subject_for(step.tone)),
            OutreachChannel::Sms => None,
        };

        DraftTemplate {
            template_id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            bucket,
            workflow_id: workflow_id.to_string(),
            step_id: step.step_id.clone(),
            step_seq_no: step.seq_no,
            channel: step.channel,
            tone: step.tone,
            subject,
            body: body_for(step.tone, step.channel, step.seq_no, step.day_offset, hints),
            state: TemplateState::PendingApproval,
            created_at: now,
            updated_at: now,
        }
    }
}

// ==========================================
// 内置文案库
// ==========================================
// 正文占位符在发送时填充:
// {{customer_name}} / {{amount}} / {{days_past_due}} / {{due_date}}

fn subject_for(tone: MessageTone) -> String {
    match tone {
        MessageTone::Friendly => "付款提醒 - 贵方账款已到期".to_string(),
        MessageTone::Neutral => "账款逾期提醒（逾期 {{days_past_due}} 天）".to_string(),
        MessageTone::Firm => "逾期账款催告函 - 请尽快安排付款".to_string(),
        MessageTone::Urgent => "紧急催收通知 - 请立即处理逾期账款".to_string(),
    }
}

fn body_for(
    tone: MessageTone,
    channel: OutreachChannel,
    seq_no: i64,
    day_offset: i64,
    hints: &GenerationHints,
) -> String {
    let mut body = match channel {
        OutreachChannel::Email => email_body(tone, seq_no, day_offset),
        OutreachChannel::Sms => sms_body(tone),
    };

    // 提示以拟稿备注附在末尾,审批人可在编辑时删改
    if hints.tone_modifier.is_some() || hints.approach_style.is_some() {
        let tone_note = hints.tone_modifier.as_deref().unwrap_or("-");
        let style_note = hints.approach_style.as_deref().unwrap_or("-");
        body.push_str(&format!(
            "\n\n（拟稿提示 语气:{} 方式:{}）",
            tone_note, style_note
        ));
    }

    body
}

fn email_body(tone: MessageTone, seq_no: i64, day_offset: i64) -> String {
    let reminder_label = if seq_no <= 1 {
        "首次提醒".to_string()
    } else {
        format!("第 {} 次提醒（入桶第 {} 天）", seq_no, day_offset)
    };

    match tone {
        MessageTone::Friendly => format!(
            "{{{{customer_name}}}}您好：\n\n\
             友情提示（{}）：贵方账款 {{{{amount}}}} 已于 {{{{due_date}}}} 到期,\
             目前逾期 {{{{days_past_due}}}} 天。\n\
             如已安排付款请忽略本提醒;如对账单有任何疑问,欢迎随时与我们对账核实。\n\n\
             祝商祺",
            reminder_label
        ),
        MessageTone::Neutral => format!(
            "{{{{customer_name}}}}：\n\n\
             经核对,贵方账款 {{{{amount}}}}（到期日 {{{{due_date}}}}）已逾期 \
             {{{{days_past_due}}}} 天,本函为{}。\n\
             请贵方核实并尽快安排付款;若已付款,请提供付款凭证以便销账。",
            reminder_label
        ),
        MessageTone::Firm => format!(
            "{{{{customer_name}}}}：\n\n\
             贵方账款 {{{{amount}}}}（到期日 {{{{due_date}}}}）已逾期 \
             {{{{days_past_due}}}} 天,此前提醒未获回应（{}）。\n\
             请于收到本函后三个工作日内安排付款,逾期未付将影响后续发货与合作安排。",
            reminder_label
        ),
        MessageTone::Urgent => format!(
            "{{{{customer_name}}}}：\n\n\
             贵方账款 {{{{amount}}}}（到期日 {{{{due_date}}}}）已严重逾期 \
             {{{{days_past_due}}}} 天（{}）。\n\
             请立即安排付款并回复付款安排;若四十八小时内仍无回应,\
             我方将依约启动进一步催收程序,由此产生的费用由贵方承担。",
            reminder_label
        ),
    }
}

fn sms_body(tone: MessageTone) -> String {
    match tone {
        MessageTone::Friendly => "【应收提醒】{{customer_name}}您好,贵方账款 {{amount}} 已逾期 \
                                  {{days_past_due}} 天,如已付款请忽略。"
            .to_string(),
        MessageTone::Neutral => "【应收提醒】{{customer_name}},贵方账款 {{amount}}（到期 \
                                 {{due_date}}）已逾期 {{days_past_due}} 天,请及时安排付款。"
            .to_string(),
        MessageTone::Firm => "【催收通知】{{customer_name}},账款 {{amount}} 已逾期 \
                              {{days_past_due}} 天,请三个工作日内付款,以免影响合作。"
            .to_string(),
        MessageTone::Urgent => "【紧急催收】{{customer_name}},账款 {{amount}} 严重逾期 \
                                {{days_past_due}} 天,请立即处理,否则将启动进一步催收程序。"
            .to_string(),
    }
}
