// ==========================================
// 应收账款催收系统 - 引擎运行日志领域模型
// ==========================================
// 依据: Collections_Master_Spec.md - PART A3 审计增强
// ==========================================

use crate::domain::types::RunStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// EngineRunLog - 引擎运行日志
// ==========================================
// 红线: 三个批量操作(桶位重算/模板生成/模板发送)每次运行必须留痕
// 用途: 定时任务排障,运行历史追溯
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineRunLog {
    // ===== 主键 =====
    pub run_id: String,    // 运行唯一标识
    pub operation: String, // 操作名(REASSIGN_BUCKETS/GENERATE_TEMPLATES/DISPATCH_TEMPLATES)

    // ===== 运行上下文 =====
    pub owner_scope: String,        // 作用域描述(ALL / OWNER:xxx)
    pub run_date: chrono::NaiveDate, // 业务日期(注入的 today)

    // ===== 时间与状态 =====
    pub started_at: NaiveDateTime,          // 开始时间
    pub completed_at: Option<NaiveDateTime>, // 结束时间(RUNNING 时为空)
    pub duration_ms: Option<i64>,           // 耗时(毫秒)
    pub status: RunStatus,                  // 运行状态

    // ===== 结果摘要 =====
    pub summary_json: Option<JsonValue>, // 操作汇总(JSON,结构随操作而异)
    pub error_message: Option<String>,   // 整体失败时的错误信息
}
