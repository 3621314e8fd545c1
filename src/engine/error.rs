// ==========================================
// 应收账款催收系统 - 引擎层错误类型
// ==========================================
// 依据: Collections_Master_Spec.md - PART D 引擎体系
// 工具: thiserror 派生宏
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    // ===== 配置类错误 =====
    // "没有工作流"与"未进入任何步骤"是正常结果,不在此列;
    // 步骤窗口定义非法属于配置错误,引擎拒绝猜测
    #[error("工作流步骤配置非法 (workflow: {workflow_id}): {message}")]
    InvalidStepConfiguration {
        workflow_id: String,
        message: String,
    },

    #[error("配置读取失败 (key: {key}): {message}")]
    ConfigReadError { key: String, message: String },

    // ===== 数据层错误 =====
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
