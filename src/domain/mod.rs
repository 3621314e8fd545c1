// ==========================================
// 应收账款催收系统 - 领域模型层
// ==========================================
// 依据: Collections_Master_Spec.md - PART C 数据与状态体系
// 依据: Dunning_Engine_Specs_v1.0.md - 主实体定义
// ==========================================
// 职责: 定义领域实体、类型、业务规则接口
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod obligation;
pub mod run_log;
pub mod template;
pub mod types;
pub mod workflow;

// 重导出核心类型
pub use obligation::{Obligation, OwnerProfile};
pub use run_log::EngineRunLog;
pub use template::{DispatchRecord, DraftTemplate};
pub use types::{
    AgingBucket, DispatchOutcome, MessageTone, ObligationStatus, OutreachChannel, OwnerScope,
    RunStatus, TemplateState,
};
pub use workflow::{DunningWorkflow, WorkflowStep};
