// ==========================================
// 应收账款催收系统 - 催收工作流领域模型
// ==========================================
// 依据: Collections_Master_Spec.md - PART C 数据与状态体系
// 依据: Dunning_Engine_Specs_v1.0.md - 2. 工作流与步骤窗口
// ==========================================

use crate::domain::types::{AgingBucket, MessageTone, OutreachChannel};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// DunningWorkflow - 催收工作流
// ==========================================
// 红线: 一个工作流只服务一个账龄桶
// 红线: 步骤 day_offset 严格递增,窗口仅由偏移序列推导,
//       不持久化窗口边界
// owner_id 为 None 表示系统默认(锁定)工作流;
// 自定义工作流可由锁定工作流克隆而来(步骤逐条复制)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DunningWorkflow {
    // ===== 主键 =====
    pub workflow_id: String, // 工作流唯一标识

    // ===== 归属与定位 =====
    pub owner_id: Option<String>, // 债权人 ID(None=系统默认作用域)
    pub bucket: AgingBucket,      // 服务的账龄桶

    // ===== 基本属性 =====
    pub name: String,               // 展示名称
    pub active: bool,               // 是否启用(解析时启用者优先)
    pub locked: bool,               // 是否锁定(系统模板只读)
    pub cloned_from: Option<String>, // 克隆来源工作流 ID

    // ===== 步骤序列 =====
    pub steps: Vec<WorkflowStep>, // 按 seq_no 升序

    // ===== 审计字段 =====
    pub created_at: NaiveDateTime, // 创建时间(解析平手时新者优先)
    pub updated_at: NaiveDateTime, // 最后更新时间
}

impl DunningWorkflow {
    /// 步骤偏移序列(按 seq_no 顺序)
    pub fn day_offsets(&self) -> Vec<i64> {
        self.steps.iter().map(|s| s.day_offset).collect()
    }
}

// ==========================================
// WorkflowStep - 催收步骤
// ==========================================
// 步骤 i 的生效窗口: [offset_i, offset_{i+1});
// 最后一步窗口开放: [offset_last, ∞)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub step_id: String,          // 步骤唯一标识
    pub workflow_id: String,      // 所属工作流
    pub seq_no: i64,              // 序号(1 起)
    pub day_offset: i64,          // 入桶后第几天开始生效(>=0)
    pub channel: OutreachChannel, // 催收渠道
    pub tone: MessageTone,        // 文案语气
}
