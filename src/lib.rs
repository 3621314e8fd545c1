// ==========================================
// 应收账款催收系统 - 核心库
// ==========================================
// 依据: Collections_Master_Spec.md - 系统宪法
// 技术栈: Rust + SQLite + Tokio
// 系统定位: 催收流程引擎 (模板发送前人工审批控制权)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 账款/工作流/模板实体与状态机
pub mod domain;

// 仓储层 - SQLite 共享连接上的读写
pub mod repository;

// 引擎层 - 分桶/窗口裁决/生成/发送
pub mod engine;

// 配置层 - config_kv 读写与引擎配置读取口
pub mod config;

// 数据库基础设施(连接初始化/PRAGMA 统一/幂等建表)
pub mod db;

// 日志初始化 (tracing)
pub mod logging;

// 性能观测(操作耗时/SQL 探针)
pub mod perf;

// 投递层 - 外部消息通道抽象与文案渲染
pub mod delivery;

// API 层 - 面向 CLI 与定时任务的业务门面
pub mod api;

// 应用层 - 状态装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    AgingBucket, DispatchOutcome, MessageTone, ObligationStatus, OutreachChannel, OwnerScope,
    RunStatus, TemplateState,
};

// 领域实体
pub use domain::{
    DispatchRecord, DraftTemplate, DunningWorkflow, EngineRunLog, Obligation, OwnerProfile,
    WorkflowStep,
};

// 引擎
pub use engine::{
    BucketClassifier, DispatchEngine, ReassignmentEngine, StepWindowCounter,
    TemplateGenerationEngine, WorkflowResolver,
};

// API
pub use api::{DunningApi, TemplateApi, WorkflowApi};

// 应用状态
pub use app::{get_default_db_path, AppState};

// ==========================================
// 常量定义
// ==========================================

/// 系统版本(随 Cargo.toml)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 系统名称
pub const APP_NAME: &str = "应收账款催收系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constants_present() {
        assert!(!VERSION.is_empty());
        assert!(!APP_NAME.is_empty());
    }
}
