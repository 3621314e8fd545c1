// ==========================================
// 应收账款催收系统 - 领域类型定义
// ==========================================
// 依据: Collections_Master_Spec.md - PART A2 红线
// 依据: Dunning_Engine_Specs_v1.0.md - 1. 账龄分桶体系
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 账款状态 (Obligation Status)
// ==========================================
// 红线: 只有 OPEN / IN_PAYMENT_PLAN 两种状态可催收
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObligationStatus {
    Open,          // 未结清
    InPaymentPlan, // 分期还款中
    Paid,          // 已付清
    Disputed,      // 争议中
    Settled,       // 已和解
    Canceled,      // 已作废
}

impl fmt::Display for ObligationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl ObligationStatus {
    /// 是否允许对该账款发起催收
    ///
    /// 争议中/已付清/已和解/已作废的账款一律不参与催收,
    /// 状态在发送时重新校验,不依赖规划时的快照。
    pub fn is_outreach_eligible(&self) -> bool {
        matches!(
            self,
            ObligationStatus::Open | ObligationStatus::InPaymentPlan
        )
    }

    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "OPEN" => Some(ObligationStatus::Open),
            "IN_PAYMENT_PLAN" => Some(ObligationStatus::InPaymentPlan),
            "PAID" => Some(ObligationStatus::Paid),
            "DISPUTED" => Some(ObligationStatus::Disputed),
            "SETTLED" => Some(ObligationStatus::Settled),
            "CANCELED" => Some(ObligationStatus::Canceled),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ObligationStatus::Open => "OPEN",
            ObligationStatus::InPaymentPlan => "IN_PAYMENT_PLAN",
            ObligationStatus::Paid => "PAID",
            ObligationStatus::Disputed => "DISPUTED",
            ObligationStatus::Settled => "SETTLED",
            ObligationStatus::Canceled => "CANCELED",
        }
    }

    /// 可催收状态全集(SQL IN 子句用)
    pub const OUTREACH_ELIGIBLE: [ObligationStatus; 2] =
        [ObligationStatus::Open, ObligationStatus::InPaymentPlan];
}

// ==========================================
// 账龄桶 (Aging Bucket)
// ==========================================
// 红线: 桶边界是编译期封闭枚举,不是运行时配置
// 红线: 任意逾期天数落入且仅落入一个桶(穷举 match 保证)
// 区间口径: CURRENT 覆盖 DPD=0, 其余为闭区间,
//           最后一档 [151, ∞) 开放
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgingBucket {
    Current,      // 未逾期(含到期日当天)
    Days1To30,    // 逾期 1-30 天
    Days31To60,   // 逾期 31-60 天
    Days61To90,   // 逾期 61-90 天
    Days91To120,  // 逾期 91-120 天
    Days121To150, // 逾期 121-150 天
    Days151Plus,  // 逾期 151 天及以上
}

impl fmt::Display for AgingBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl AgingBucket {
    /// 全部桶,按账龄升序
    pub const ALL: [AgingBucket; 7] = [
        AgingBucket::Current,
        AgingBucket::Days1To30,
        AgingBucket::Days31To60,
        AgingBucket::Days61To90,
        AgingBucket::Days91To120,
        AgingBucket::Days121To150,
        AgingBucket::Days151Plus,
    ];

    /// 按逾期天数分桶
    ///
    /// # 参数
    /// - `dpd`: 逾期天数,调用方保证已按 max(0, ..) 截断
    ///
    /// # 返回
    /// 唯一对应的账龄桶(全函数,任何输入都有结果)
    pub fn classify(dpd: i64) -> AgingBucket {
        match dpd {
            d if d <= 0 => AgingBucket::Current,
            1..=30 => AgingBucket::Days1To30,
            31..=60 => AgingBucket::Days31To60,
            61..=90 => AgingBucket::Days61To90,
            91..=120 => AgingBucket::Days91To120,
            121..=150 => AgingBucket::Days121To150,
            _ => AgingBucket::Days151Plus,
        }
    }

    /// 桶的起始逾期天数(含)
    pub fn dpd_floor(&self) -> i64 {
        match self {
            AgingBucket::Current => 0,
            AgingBucket::Days1To30 => 1,
            AgingBucket::Days31To60 => 31,
            AgingBucket::Days61To90 => 61,
            AgingBucket::Days91To120 => 91,
            AgingBucket::Days121To150 => 121,
            AgingBucket::Days151Plus => 151,
        }
    }

    /// 桶的结束逾期天数(含); 最后一档无上界
    pub fn dpd_ceiling(&self) -> Option<i64> {
        match self {
            AgingBucket::Current => Some(0),
            AgingBucket::Days1To30 => Some(30),
            AgingBucket::Days31To60 => Some(60),
            AgingBucket::Days61To90 => Some(90),
            AgingBucket::Days91To120 => Some(120),
            AgingBucket::Days121To150 => Some(150),
            AgingBucket::Days151Plus => None,
        }
    }

    /// 展示用中文标签
    pub fn label_cn(&self) -> &'static str {
        match self {
            AgingBucket::Current => "未逾期",
            AgingBucket::Days1To30 => "逾期1-30天",
            AgingBucket::Days31To60 => "逾期31-60天",
            AgingBucket::Days61To90 => "逾期61-90天",
            AgingBucket::Days91To120 => "逾期91-120天",
            AgingBucket::Days121To150 => "逾期121-150天",
            AgingBucket::Days151Plus => "逾期151天以上",
        }
    }

    /// 从字符串解析账龄桶
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "CURRENT" => Some(AgingBucket::Current),
            "DAYS1_TO30" => Some(AgingBucket::Days1To30),
            "DAYS31_TO60" => Some(AgingBucket::Days31To60),
            "DAYS61_TO90" => Some(AgingBucket::Days61To90),
            "DAYS91_TO120" => Some(AgingBucket::Days91To120),
            "DAYS121_TO150" => Some(AgingBucket::Days121To150),
            "DAYS151_PLUS" => Some(AgingBucket::Days151Plus),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            AgingBucket::Current => "CURRENT",
            AgingBucket::Days1To30 => "DAYS1_TO30",
            AgingBucket::Days31To60 => "DAYS31_TO60",
            AgingBucket::Days61To90 => "DAYS61_TO90",
            AgingBucket::Days91To120 => "DAYS91_TO120",
            AgingBucket::Days121To150 => "DAYS121_TO150",
            AgingBucket::Days151Plus => "DAYS151_PLUS",
        }
    }
}

// ==========================================
// 催收渠道 (Outreach Channel)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutreachChannel {
    Email, // 邮件
    Sms,   // 短信
}

impl fmt::Display for OutreachChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl OutreachChannel {
    /// 从字符串解析渠道
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "EMAIL" => Some(OutreachChannel::Email),
            "SMS" => Some(OutreachChannel::Sms),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            OutreachChannel::Email => "EMAIL",
            OutreachChannel::Sms => "SMS",
        }
    }
}

// ==========================================
// 文案语气 (Message Tone)
// ==========================================
// 步骤级配置,越靠后的步骤语气越强硬
// 顺序: Friendly < Neutral < Firm < Urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageTone {
    Friendly, // 友好提醒
    Neutral,  // 中性告知
    Firm,     // 严肃催告
    Urgent,   // 紧急追缴
}

impl fmt::Display for MessageTone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl MessageTone {
    /// 从字符串解析语气
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "FRIENDLY" => Some(MessageTone::Friendly),
            "NEUTRAL" => Some(MessageTone::Neutral),
            "FIRM" => Some(MessageTone::Firm),
            "URGENT" => Some(MessageTone::Urgent),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            MessageTone::Friendly => "FRIENDLY",
            MessageTone::Neutral => "NEUTRAL",
            MessageTone::Firm => "FIRM",
            MessageTone::Urgent => "URGENT",
        }
    }
}

// ==========================================
// 模板审批状态 (Template State)
// ==========================================
// 依据: Dunning_Engine_Specs_v1.0.md - 4. 模板生成与审批
// 状态机: PENDING_APPROVAL -> APPROVED | DISCARDED (单向)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateState {
    PendingApproval, // 待审批
    Approved,        // 已批准(可发送)
    Discarded,       // 已废弃
}

impl fmt::Display for TemplateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl TemplateState {
    /// 模板是否仍然"存活"(占用步骤槽位,阻止重复生成)
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            TemplateState::PendingApproval | TemplateState::Approved
        )
    }

    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PENDING_APPROVAL" => Some(TemplateState::PendingApproval),
            "APPROVED" => Some(TemplateState::Approved),
            "DISCARDED" => Some(TemplateState::Discarded),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            TemplateState::PendingApproval => "PENDING_APPROVAL",
            TemplateState::Approved => "APPROVED",
            TemplateState::Discarded => "DISCARDED",
        }
    }
}

// ==========================================
// 发送结果 (Dispatch Outcome)
// ==========================================
// 依据: Dunning_Engine_Specs_v1.0.md - 8. 发送记录幂等
// 幂等口径: 同一 (账款, 模板) 至多一条非 FAILED 记录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchOutcome {
    Delivered, // 已送达
    Failed,    // 发送失败(仅审计,不阻断重试)
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl DispatchOutcome {
    /// 从字符串解析结果
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "DELIVERED" => Some(DispatchOutcome::Delivered),
            "FAILED" => Some(DispatchOutcome::Failed),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Delivered => "DELIVERED",
            DispatchOutcome::Failed => "FAILED",
        }
    }
}

// ==========================================
// 引擎运行状态 (Run Status)
// ==========================================
// 用于 engine_run_log 审计表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,   // 执行中
    Completed, // 全部完成
    Partial,   // 部分完成(有分片失败或被取消)
    Failed,    // 整体失败
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl RunStatus {
    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "RUNNING" => RunStatus::Running,
            "COMPLETED" => RunStatus::Completed,
            "PARTIAL" => RunStatus::Partial,
            _ => RunStatus::Failed,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Partial => "PARTIAL",
            RunStatus::Failed => "FAILED",
        }
    }
}

// ==========================================
// 作用域 (Owner Scope)
// ==========================================
// 三个批量操作统一入参: 全量(定时任务)或单一债权人(手动触发)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerScope {
    /// 全量作用域: 覆盖所有债权人(每日定时任务)
    All,
    /// 单一债权人作用域(手动触发)
    Owner(String),
}

impl fmt::Display for OwnerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

impl OwnerScope {
    /// 作用域内的债权人 ID; 全量作用域返回 None
    pub fn owner_id(&self) -> Option<&str> {
        match self {
            OwnerScope::All => None,
            OwnerScope::Owner(id) => Some(id.as_str()),
        }
    }

    /// 审计日志用的描述串
    pub fn describe(&self) -> String {
        match self {
            OwnerScope::All => "ALL".to_string(),
            OwnerScope::Owner(id) => format!("OWNER:{}", id),
        }
    }
}
