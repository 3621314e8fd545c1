// ==========================================
// 应收账款催收系统 - 工作流管理 API
// ==========================================
// 依据: Dunning_Engine_Specs_v1.0.md - 2. 工作流与步骤窗口
// 职责: 工作流的创建/克隆/启停/删除与生效裁决查询
// 红线: 步骤窗口偏移在入库前校验,非法定义绝不落库
// 红线: 锁定工作流只可克隆定制,不可删除
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::domain::types::{AgingBucket, MessageTone, OutreachChannel, OwnerScope};
use crate::domain::workflow::{DunningWorkflow, WorkflowStep};
use crate::engine::workflow_resolver::WorkflowResolver;
use crate::repository::WorkflowRepository;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

// ==========================================
// DTO 定义
// ==========================================

/// 创建工作流时的步骤定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    pub seq_no: i64,
    pub day_offset: i64,
    pub channel: OutreachChannel,
    pub tone: MessageTone,
}

/// 创建工作流请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWorkflowRequest {
    /// None = 系统默认作用域
    pub owner_id: Option<String>,
    pub bucket: AgingBucket,
    pub name: String,
    pub active: bool,
    pub steps: Vec<StepSpec>,
}

// ==========================================
// WorkflowApi
// ==========================================

/// 工作流管理 API
pub struct WorkflowApi {
    workflow_repo: Arc<WorkflowRepository>,
    resolver: WorkflowResolver,
}

impl WorkflowApi {
    /// 创建新的 WorkflowApi 实例
    pub fn new(workflow_repo: Arc<WorkflowRepository>) -> Self {
        Self {
            workflow_repo,
            resolver: WorkflowResolver::new(),
        }
    }

    /// 创建工作流(含步骤)
    ///
    /// # 说明
    /// - 偏移序列在入库前校验: 非负且按 seq_no 严格递增
    /// - 新建工作流一律非锁定;锁定位仅系统内置数据持有
    pub fn create_workflow(&self, request: CreateWorkflowRequest) -> ApiResult<DunningWorkflow> {
        if request.name.trim().is_empty() {
            return Err(ApiError::InvalidInput("工作流名称不能为空".to_string()));
        }
        if let Some(owner) = &request.owner_id {
            if owner.trim().is_empty() {
                return Err(ApiError::InvalidInput(
                    "owner_id 给定时不能为空串".to_string(),
                ));
            }
        }

        let now = Local::now().naive_local();
        let workflow_id = Uuid::new_v4().to_string();
        let steps: Vec<WorkflowStep> = request
            .steps
            .iter()
            .map(|s| WorkflowStep {
                step_id: Uuid::new_v4().to_string(),
                workflow_id: workflow_id.clone(),
                seq_no: s.seq_no,
                day_offset: s.day_offset,
                channel: s.channel,
                tone: s.tone,
            })
            .collect();

        let workflow = DunningWorkflow {
            workflow_id,
            owner_id: request.owner_id,
            bucket: request.bucket,
            name: request.name.trim().to_string(),
            active: request.active,
            locked: false,
            cloned_from: None,
            steps,
            created_at: now,
            updated_at: now,
        };

        // 入库前校验,非法偏移直接拒绝
        self.resolver
            .validate_offsets(&workflow)
            .map_err(|e| ApiError::ValidationError(e.to_string()))?;

        self.workflow_repo.insert_workflow(&workflow)?;
        info!(
            workflow_id = %workflow.workflow_id,
            bucket = %workflow.bucket,
            steps = workflow.steps.len(),
            "工作流已创建"
        );
        Ok(workflow)
    }

    /// 从锁定的系统工作流克隆出债权人自定义副本
    ///
    /// # 说明
    /// - 步骤逐一复制(新 step_id),locked=false,cloned_from 指回来源
    pub fn clone_locked_workflow(
        &self,
        source_workflow_id: &str,
        new_owner_id: &str,
        name: &str,
    ) -> ApiResult<DunningWorkflow> {
        if name.trim().is_empty() {
            return Err(ApiError::InvalidInput("克隆工作流名称不能为空".to_string()));
        }
        let cloned = self
            .workflow_repo
            .clone_workflow(source_workflow_id, new_owner_id, name.trim())?;
        info!(
            source = source_workflow_id,
            cloned_id = %cloned.workflow_id,
            owner_id = new_owner_id,
            "工作流已克隆"
        );
        Ok(cloned)
    }

    /// 启用/停用工作流
    pub fn set_active(&self, workflow_id: &str, active: bool) -> ApiResult<()> {
        self.workflow_repo.set_active(workflow_id, active)?;
        Ok(())
    }

    /// 删除工作流(步骤级联删除;锁定工作流拒绝)
    pub fn delete_workflow(&self, workflow_id: &str) -> ApiResult<()> {
        self.workflow_repo.delete_workflow(workflow_id)?;
        Ok(())
    }

    /// 查询作用域内工作流(含步骤)
    pub fn list_workflows(
        &self,
        scope: &OwnerScope,
        bucket: Option<AgingBucket>,
    ) -> ApiResult<Vec<DunningWorkflow>> {
        Ok(self.workflow_repo.list_for_scope(bucket, scope.owner_id())?)
    }

    /// 查询指定桶位的生效工作流
    ///
    /// # 返回
    /// - None: 该作用域下此桶位未配置任何工作流
    pub fn effective_workflow(
        &self,
        bucket: AgingBucket,
        scope: &OwnerScope,
    ) -> ApiResult<Option<DunningWorkflow>> {
        let candidates = self
            .workflow_repo
            .list_for_scope(Some(bucket), scope.owner_id())?;
        Ok(self.resolver.pick_effective(&candidates).cloned())
    }
}

// ==========================================
// 单元测试
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use rusqlite::Connection;
    use std::sync::Mutex as StdMutex;

    fn setup() -> (Arc<WorkflowRepository>, WorkflowApi) {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let repo = Arc::new(WorkflowRepository::new(Arc::new(StdMutex::new(conn))));
        let api = WorkflowApi::new(repo.clone());
        (repo, api)
    }

    fn request(owner_id: Option<&str>, offsets: &[i64]) -> CreateWorkflowRequest {
        CreateWorkflowRequest {
            owner_id: owner_id.map(str::to_string),
            bucket: AgingBucket::Days1To30,
            name: "温和提醒流程".to_string(),
            active: true,
            steps: offsets
                .iter()
                .enumerate()
                .map(|(i, off)| StepSpec {
                    seq_no: (i + 1) as i64,
                    day_offset: *off,
                    channel: OutreachChannel::Email,
                    tone: MessageTone::Friendly,
                })
                .collect(),
        }
    }

    #[test]
    fn test_create_workflow_persists_steps() {
        let (repo, api) = setup();
        let created = api.create_workflow(request(None, &[3, 7, 14])).unwrap();

        let loaded = repo.find_by_id(&created.workflow_id).unwrap().unwrap();
        assert_eq!(loaded.steps.len(), 3);
        assert_eq!(loaded.day_offsets(), vec![3, 7, 14]);
        assert!(!loaded.locked, "新建工作流不得锁定");
    }

    #[test]
    fn test_create_rejects_non_increasing_offsets() {
        let (repo, api) = setup();
        let result = api.create_workflow(request(None, &[7, 3]));

        assert!(matches!(result, Err(ApiError::ValidationError(_))));
        assert!(
            repo.list_for_scope(None, None).unwrap().is_empty(),
            "非法定义不得落库"
        );
    }

    #[test]
    fn test_create_rejects_blank_name() {
        let (_, api) = setup();
        let mut bad = request(None, &[3]);
        bad.name = "   ".to_string();
        assert!(matches!(
            api.create_workflow(bad),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_clone_then_effective_prefers_custom() {
        let (_, api) = setup();
        let system = api.create_workflow(request(None, &[3, 7])).unwrap();

        let cloned = api
            .clone_locked_workflow(&system.workflow_id, "owner_a", "owner_a 定制")
            .unwrap();
        assert_eq!(cloned.cloned_from.as_deref(), Some(system.workflow_id.as_str()));
        assert_eq!(cloned.owner_id.as_deref(), Some("owner_a"));

        // Owner 作用域裁决到克隆副本,All 作用域仍是系统默认
        let effective = api
            .effective_workflow(
                AgingBucket::Days1To30,
                &OwnerScope::Owner("owner_a".to_string()),
            )
            .unwrap()
            .expect("应有生效工作流");
        assert_eq!(effective.workflow_id, cloned.workflow_id);

        let effective = api
            .effective_workflow(AgingBucket::Days1To30, &OwnerScope::All)
            .unwrap()
            .expect("应有生效工作流");
        assert_eq!(effective.workflow_id, system.workflow_id);
    }

    #[test]
    fn test_delete_locked_workflow_rejected() {
        // 锁定工作流由系统播种,不经 API 创建
        let (repo, api) = setup();
        let now = Local::now().naive_local();
        let locked = DunningWorkflow {
            workflow_id: "wf_system".to_string(),
            owner_id: None,
            bucket: AgingBucket::Days1To30,
            name: "系统默认 1-30".to_string(),
            active: true,
            locked: true,
            cloned_from: None,
            steps: vec![],
            created_at: now,
            updated_at: now,
        };
        repo.insert_workflow(&locked).unwrap();

        let result = api.delete_workflow("wf_system");
        assert!(matches!(result, Err(ApiError::BusinessRuleViolation(_))));
        assert!(repo.find_by_id("wf_system").unwrap().is_some(), "锁定工作流仍在");
    }

    #[test]
    fn test_set_active_toggles() {
        let (repo, api) = setup();
        let created = api.create_workflow(request(None, &[3])).unwrap();

        api.set_active(&created.workflow_id, false).unwrap();
        let loaded = repo.find_by_id(&created.workflow_id).unwrap().unwrap();
        assert!(!loaded.active);
    }
}
