// ==========================================
// 应收账款催收系统 - 数据仓储层
// ==========================================
// 依据: Collections_Master_Spec.md - PART B 仓储层
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod error;
pub mod obligation_repo;
pub mod run_log_repo;
pub mod template_repo;
pub mod workflow_repo;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use obligation_repo::ObligationRepository;
pub use run_log_repo::RunLogRepository;
pub use template_repo::TemplateRepository;
pub use workflow_repo::WorkflowRepository;
