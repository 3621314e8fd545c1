// ==========================================
// 应收账款催收系统 - 账款领域模型
// ==========================================
// 依据: Collections_Master_Spec.md - PART C 数据与状态体系
// 依据: Dunning_Engine_Specs_v1.0.md - obligation/owner_profile 表
// ==========================================

use crate::domain::types::{AgingBucket, ObligationStatus};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// Obligation - 应收账款
// ==========================================
// 红线: (current_bucket, bucket_entered_on) 成对原子更新,
//       且只允许桶位重算操作写入
// 用途: 外部系统写入主数据,引擎层读取 + 维护桶位缓存
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Obligation {
    // ===== 主键 =====
    pub obligation_id: String, // 账款唯一标识(发票号/账单号)

    // ===== 归属 =====
    pub owner_id: String, // 债权人(用户)ID

    // ===== 债务人联系信息 =====
    pub customer_name: Option<String>,  // 债务人名称(文案渲染用)
    pub contact_email: Option<String>,  // 联系邮箱(EMAIL 渠道收件人)
    pub contact_phone: Option<String>,  // 联系电话(SMS 渠道收件人)
    pub contact_outreach_enabled: bool, // 联系人级催收开关(false=该联系人拒收)

    // ===== 金额信息 =====
    pub amount_cents: i64, // 未清金额(最小货币单位)
    pub currency: String,  // 币种标签(不做汇率换算)

    // ===== 账期信息 =====
    pub due_date: NaiveDate,         // 应付日期(账龄计算基准)
    pub status: ObligationStatus, // 账款状态(仅 OPEN/IN_PAYMENT_PLAN 可催收)

    // ===== 桶位缓存(重算操作维护) =====
    pub current_bucket: Option<AgingBucket>, // 当前账龄桶(None=从未分桶)
    pub bucket_entered_on: Option<NaiveDate>, // 进入当前桶的日期(步骤窗口锚点)

    // ===== 审计字段 =====
    pub created_at: NaiveDateTime, // 记录创建时间
    pub updated_at: NaiveDateTime, // 记录更新时间
}

impl Obligation {
    /// 当前是否可参与催收(仅状态维度,暂停/拒收在发送时另查)
    pub fn is_outreach_eligible(&self) -> bool {
        self.status.is_outreach_eligible()
    }
}

// ==========================================
// OwnerProfile - 债权人档案
// ==========================================
// 用途: 债权人级全局催收暂停开关
// 暂停的债权人名下账款在发送时计入 skipped,不算错误
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerProfile {
    pub owner_id: String,          // 债权人 ID
    pub outreach_paused: bool,     // 全局暂停催收
    pub updated_at: NaiveDateTime, // 最后更新时间
}
