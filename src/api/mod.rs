// ==========================================
// 应收账款催收系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供 CLI 与定时任务调用
// ==========================================

pub mod error;
pub mod dunning_api;
pub mod workflow_api;
pub mod template_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use dunning_api::DunningApi;
pub use workflow_api::{CreateWorkflowRequest, StepSpec, WorkflowApi};
pub use template_api::TemplateApi;
