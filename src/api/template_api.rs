// ==========================================
// 应收账款催收系统 - 模板生命周期 API
// ==========================================
// 依据: Dunning_Engine_Specs_v1.0.md - 4. 模板生成与审批
// 职责: 拟稿模板的审批/废弃/编辑/重生成/查询
// 红线: 状态机只允许 PENDING_APPROVAL → {APPROVED, DISCARDED},越界即拒绝
// 红线: 重生成 = 删旧 + 建新 PENDING_APPROVAL,历史发送记录原样保留
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::domain::template::DraftTemplate;
use crate::domain::types::{AgingBucket, OwnerScope, TemplateState};
use crate::engine::template_generator::{GenerationHints, TemplateGenerationEngine};
use crate::repository::{TemplateRepository, WorkflowRepository};
use std::sync::Arc;
use tracing::info;

// ==========================================
// TemplateApi
// ==========================================

/// 模板生命周期 API
pub struct TemplateApi {
    template_repo: Arc<TemplateRepository>,
    workflow_repo: Arc<WorkflowRepository>,
    generation_engine: TemplateGenerationEngine,
}

impl TemplateApi {
    /// 创建新的 TemplateApi 实例
    pub fn new(
        template_repo: Arc<TemplateRepository>,
        workflow_repo: Arc<WorkflowRepository>,
    ) -> Self {
        let generation_engine =
            TemplateGenerationEngine::new(workflow_repo.clone(), template_repo.clone());
        Self {
            template_repo,
            workflow_repo,
            generation_engine,
        }
    }

    /// 审批通过,模板进入可发送状态
    pub fn approve(&self, template_id: &str) -> ApiResult<()> {
        self.template_repo
            .update_state(template_id, TemplateState::Approved)?;
        info!(template_id, "模板已审批");
        Ok(())
    }

    /// 废弃模板(终态,永不发送)
    pub fn discard(&self, template_id: &str) -> ApiResult<()> {
        self.template_repo
            .update_state(template_id, TemplateState::Discarded)?;
        info!(template_id, "模板已废弃");
        Ok(())
    }

    /// 编辑模板文案(标题/正文),不改变状态
    pub fn edit_content(
        &self,
        template_id: &str,
        subject: Option<&str>,
        body: &str,
    ) -> ApiResult<()> {
        self.template_repo
            .update_content(template_id, subject, body)?;
        Ok(())
    }

    /// 重新生成模板: 删旧建新
    ///
    /// # 说明
    /// - 旧模板删除即退出发送资格;已发出的发送记录保留为历史审计
    /// - 新模板回到 PENDING_APPROVAL,重新走审批
    /// - 来源步骤已被删除时无法重生成(孤儿模板只能废弃)
    pub fn regenerate(
        &self,
        template_id: &str,
        tone_modifier: Option<String>,
        approach_style: Option<String>,
    ) -> ApiResult<DraftTemplate> {
        let old = self
            .template_repo
            .find_by_id(template_id)?
            .ok_or_else(|| ApiError::NotFound(format!("DraftTemplate(id={})不存在", template_id)))?;

        let workflow = self
            .workflow_repo
            .find_by_id(&old.workflow_id)?
            .ok_or_else(|| {
                ApiError::NotFound(format!(
                    "来源工作流(id={})已删除,模板无法重新生成",
                    old.workflow_id
                ))
            })?;
        let step = workflow
            .steps
            .iter()
            .find(|s| s.step_id == old.step_id)
            .ok_or_else(|| {
                ApiError::NotFound(format!(
                    "来源步骤(id={})已不存在,模板无法重新生成",
                    old.step_id
                ))
            })?;

        let hints = GenerationHints {
            tone_modifier,
            approach_style,
        };
        let replacement =
            self.generation_engine
                .build_template(&old.owner_id, &old.workflow_id, old.bucket, step, &hints);

        // 删旧建新: 删除即退出发送资格,新稿重新走审批
        self.template_repo.delete_template(template_id)?;
        self.template_repo.insert_template(&replacement)?;
        info!(
            old_template_id = template_id,
            new_template_id = %replacement.template_id,
            "模板已重新生成"
        );
        Ok(replacement)
    }

    /// 查询模板(作用域 + 可选桶位/状态过滤)
    pub fn list_templates(
        &self,
        scope: &OwnerScope,
        bucket: Option<AgingBucket>,
        state: Option<TemplateState>,
    ) -> ApiResult<Vec<DraftTemplate>> {
        Ok(self
            .template_repo
            .list_templates(scope.owner_id(), bucket, state)?)
    }
}
