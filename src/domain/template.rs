// ==========================================
// 应收账款催收系统 - 文案模板与发送记录领域模型
// ==========================================
// 依据: Collections_Master_Spec.md - PART C 数据与状态体系
// 依据: Dunning_Engine_Specs_v1.0.md - 4. 模板生成 / 8. 发送记录幂等
// ==========================================

use crate::domain::types::{
    AgingBucket, DispatchOutcome, MessageTone, OutreachChannel, TemplateState,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// DraftTemplate - 催收文案模板
// ==========================================
// 状态机: PENDING_APPROVAL -> APPROVED | DISCARDED
// 重新生成 = 删除旧行 + 新建待审批行(新 template_id),
// 旧模板的历史发送记录保留(发送记录表不设模板外键)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftTemplate {
    // ===== 主键 =====
    pub template_id: String, // 模板唯一标识

    // ===== 归属与定位 =====
    pub owner_id: String,        // 生成时的作用域债权人
    pub bucket: AgingBucket,     // 对应账龄桶
    pub workflow_id: String,     // 生成时的工作流
    pub step_id: String,         // 服务的步骤
    pub step_seq_no: i64,        // 步骤序号快照(工作流改动后仍可追溯)

    // ===== 文案属性(生成时从步骤复制) =====
    pub channel: OutreachChannel, // 催收渠道
    pub tone: MessageTone,        // 文案语气

    // ===== 文案内容 =====
    pub subject: Option<String>, // 邮件主题(SMS 无主题)
    pub body: String,            // 正文,含 {{placeholder}} 占位符

    // ===== 审批状态 =====
    pub state: TemplateState, // 待审批/已批准/已废弃

    // ===== 审计字段 =====
    pub created_at: NaiveDateTime, // 创建时间
    pub updated_at: NaiveDateTime, // 最后更新时间
}

// ==========================================
// DispatchRecord - 发送记录
// ==========================================
// 红线: 同一 (obligation_id, template_id) 至多一条非 FAILED 记录
//       (应用层先查 + 数据库部分唯一索引双保险)
// FAILED 记录仅作审计,后续运行可重试
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub dispatch_id: String,            // 发送记录唯一标识
    pub obligation_id: String,          // 目标账款
    pub template_id: String,            // 使用的模板
    pub channel: OutreachChannel,       // 实际使用渠道
    pub outcome: DispatchOutcome,       // 发送结果
    pub failure_reason: Option<String>, // 失败原因(FAILED 时填写)
    pub dispatched_at: NaiveDateTime,   // 发送时间
}
