// ==========================================
// 应收账款催收系统 - 仓储层错误类型
// ==========================================
// 依据: Collections_Master_Spec.md - PART B 仓储层
// 工具: thiserror 派生宏
// 红线: UNIQUE 冲突必须可精确识别,发送幂等依赖它
// ==========================================

use thiserror::Error;

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== 数据访问 =====
    #[error("{entity} 未找到: id={id}")]
    NotFound { entity: String, id: String },

    /// 共享连接的互斥锁中毒,整个进程视为连接故障
    #[error("连接互斥锁获取失败: {0}")]
    LockError(String),

    #[error("SQL 执行失败: {0}")]
    DatabaseQueryError(String),

    #[error("UNIQUE 约束冲突: {0}")]
    UniqueConstraintViolation(String),

    #[error("外键约束冲突: {0}")]
    ForeignKeyViolation(String),

    // ===== 业务规则 =====
    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("非法状态转换: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("数据校验失败: {0}")]
    ValidationError(String),

    // ===== 兜底 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            // 约束类错误按报文再细分: UNIQUE 与外键走各自的变体
            rusqlite::Error::SqliteFailure(code, Some(msg))
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                if msg.contains("UNIQUE") {
                    RepositoryError::UniqueConstraintViolation(msg)
                } else if msg.contains("FOREIGN KEY") {
                    RepositoryError::ForeignKeyViolation(msg)
                } else {
                    RepositoryError::DatabaseQueryError(msg)
                }
            }
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                entity: "Unknown".to_string(),
                id: "Unknown".to_string(),
            },
            other => RepositoryError::DatabaseQueryError(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;
