// ==========================================
// 应收账款催收系统 - 消息投递边界
// ==========================================
// 职责: 定义外部投递服务 trait，实现依赖倒置
// 说明: Engine 层只依赖此 trait，邮件/短信供应商适配器在部署侧实现
// 约束: 投递服务可能缓慢且会失败;调用方自行裹超时,本次运行不做自动重试
// ==========================================

use crate::domain::obligation::Obligation;
use crate::domain::template::DraftTemplate;
use crate::domain::types::OutreachChannel;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ==========================================
// 投递请求与结果
// ==========================================

/// 投递请求(渲染完成后的最终消息)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRequest {
    /// 投递渠道
    pub channel: OutreachChannel,
    /// 收件人(EMAIL=邮箱地址, SMS=手机号)
    pub recipient: String,
    /// 邮件主题(SMS 为 None)
    pub subject: Option<String>,
    /// 渲染后的正文
    pub body: String,
}

/// 投递回执
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// 供应商侧消息 ID(供应商不提供时为 None)
    pub provider_message_id: Option<String>,
}

/// 投递失败
#[derive(Debug, Clone, Error)]
#[error("投递失败: {reason}")]
pub struct DeliveryError {
    pub reason: String,
}

impl DeliveryError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

// ==========================================
// 投递服务 Trait
// ==========================================

/// 消息投递服务
///
/// Engine 层定义,供应商适配器在部署侧实现
///
/// # 实现说明
/// - 单次调用对应一条消息,不做批量
/// - 失败通过 Err 返回原因,调用方据此写 FAILED 审计记录
/// - 超时控制在调用方(引擎按配置裹 tokio::time::timeout)
#[async_trait]
pub trait MessageDeliveryService: Send + Sync {
    /// 投递一条消息
    ///
    /// # 参数
    /// - `request`: 渲染完成的投递请求
    ///
    /// # 返回
    /// - `Ok(receipt)`: 已送达
    /// - `Err(e)`: 投递失败(含原因)
    async fn send(&self, request: &DeliveryRequest) -> Result<DeliveryReceipt, DeliveryError>;
}

/// 仅记日志的投递服务
///
/// 用于未接入真实供应商的环境(本地联调/演示):
/// 打印消息并视为送达
#[derive(Debug, Clone, Default)]
pub struct LogOnlyDeliveryService;

#[async_trait]
impl MessageDeliveryService for LogOnlyDeliveryService {
    async fn send(&self, request: &DeliveryRequest) -> Result<DeliveryReceipt, DeliveryError> {
        tracing::info!(
            channel = %request.channel,
            recipient = %request.recipient,
            subject = request.subject.as_deref().unwrap_or(""),
            body_len = request.body.len(),
            "LogOnlyDeliveryService: 模拟投递"
        );
        Ok(DeliveryReceipt {
            provider_message_id: Some(format!("log-{}", uuid::Uuid::new_v4())),
        })
    }
}

// ==========================================
// 文案渲染
// ==========================================

/// 渲染后的消息
#[derive(Debug, Clone)]
pub struct RenderedMessage {
    pub subject: Option<String>,
    pub body: String,
}

/// 按渠道取收件人
///
/// # 返回
/// - None: 该账款缺少此渠道的联系方式(发送时计 skipped)
pub fn recipient_for(obligation: &Obligation, channel: OutreachChannel) -> Option<String> {
    let raw = match channel {
        OutreachChannel::Email => obligation.contact_email.as_deref(),
        OutreachChannel::Sms => obligation.contact_phone.as_deref(),
    };
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// 金额格式化: 分 -> "1234.56 CNY"(负额保留负号,含 -100 分以内)
fn format_amount(amount_cents: i64, currency: &str) -> String {
    let sign = if amount_cents < 0 { "-" } else { "" };
    let magnitude = amount_cents.unsigned_abs();
    format!("{}{}.{:02} {}", sign, magnitude / 100, magnitude % 100, currency)
}

/// 填充模板占位符
///
/// 支持的占位符:
/// - {{customer_name}}: 债务人名称(缺失时用"贵方")
/// - {{amount}}: 未清金额(含币种)
/// - {{days_past_due}}: 截至 today 的逾期天数
/// - {{due_date}}: 应付日期(YYYY-MM-DD)
///
/// 渲染只做变量替换,不生成文案(文案在模板生成阶段固定)
pub fn render_template(
    template: &DraftTemplate,
    obligation: &Obligation,
    today: NaiveDate,
) -> RenderedMessage {
    let customer = obligation
        .customer_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("贵方");
    let amount = format_amount(obligation.amount_cents, &obligation.currency);
    let dpd = (today - obligation.due_date).num_days().max(0).to_string();
    let due = obligation.due_date.format("%Y-%m-%d").to_string();

    let fill = |text: &str| -> String {
        text.replace("{{customer_name}}", customer)
            .replace("{{amount}}", &amount)
            .replace("{{days_past_due}}", &dpd)
            .replace("{{due_date}}", &due)
    };

    RenderedMessage {
        subject: template.subject.as_deref().map(fill),
        body: fill(&template.body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{
        AgingBucket, MessageTone, ObligationStatus, TemplateState,
    };
    use chrono::NaiveDateTime;

    fn test_obligation() -> Obligation {
        Obligation {
            obligation_id: "INV-001".to_string(),
            owner_id: "u-1".to_string(),
            customer_name: Some("华东贸易有限公司".to_string()),
            contact_email: Some("ap@example.com".to_string()),
            contact_phone: None,
            contact_outreach_enabled: true,
            amount_cents: 1234_56,
            currency: "CNY".to_string(),
            due_date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
            status: ObligationStatus::Open,
            current_bucket: Some(AgingBucket::Days1To30),
            bucket_entered_on: Some(NaiveDate::from_ymd_opt(2026, 1, 11).unwrap()),
            created_at: NaiveDateTime::parse_from_str("2026-01-01 08:00:00", "%Y-%m-%d %H:%M:%S")
                .unwrap(),
            updated_at: NaiveDateTime::parse_from_str("2026-01-01 08:00:00", "%Y-%m-%d %H:%M:%S")
                .unwrap(),
        }
    }

    fn test_template() -> DraftTemplate {
        DraftTemplate {
            template_id: "TPL-1".to_string(),
            owner_id: "u-1".to_string(),
            bucket: AgingBucket::Days1To30,
            workflow_id: "WF-1".to_string(),
            step_id: "ST-1".to_string(),
            step_seq_no: 1,
            channel: OutreachChannel::Email,
            tone: MessageTone::Friendly,
            subject: Some("付款提醒: {{customer_name}}".to_string()),
            body: "{{customer_name}}您好, 贵司账款 {{amount}} 已逾期 {{days_past_due}} 天(应付日 {{due_date}})。".to_string(),
            state: TemplateState::Approved,
            created_at: NaiveDateTime::parse_from_str("2026-01-01 08:00:00", "%Y-%m-%d %H:%M:%S")
                .unwrap(),
            updated_at: NaiveDateTime::parse_from_str("2026-01-01 08:00:00", "%Y-%m-%d %H:%M:%S")
                .unwrap(),
        }
    }

    #[test]
    fn test_render_fills_all_placeholders() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 25).unwrap();
        let rendered = render_template(&test_template(), &test_obligation(), today);

        assert_eq!(
            rendered.subject.as_deref(),
            Some("付款提醒: 华东贸易有限公司")
        );
        assert!(rendered.body.contains("1234.56 CNY"));
        assert!(rendered.body.contains("逾期 15 天"));
        assert!(rendered.body.contains("2026-01-10"));
        assert!(!rendered.body.contains("{{"), "不应残留未替换的占位符");
    }

    #[test]
    fn test_render_missing_customer_name() {
        let mut obligation = test_obligation();
        obligation.customer_name = None;
        let today = NaiveDate::from_ymd_opt(2026, 1, 25).unwrap();
        let rendered = render_template(&test_template(), &obligation, today);
        assert!(rendered.body.starts_with("贵方您好"));
    }

    #[test]
    fn test_render_negative_amount_keeps_sign() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 25).unwrap();

        // 整数元部分为 0 时负号不能丢
        let mut obligation = test_obligation();
        obligation.amount_cents = -50;
        let rendered = render_template(&test_template(), &obligation, today);
        assert!(
            rendered.body.contains("-0.50 CNY"),
            "负 50 分应渲染为 -0.50, 实际: {}",
            rendered.body
        );

        obligation.amount_cents = -123_45;
        let rendered = render_template(&test_template(), &obligation, today);
        assert!(rendered.body.contains("-123.45 CNY"));
    }

    #[test]
    fn test_recipient_by_channel() {
        let obligation = test_obligation();
        assert_eq!(
            recipient_for(&obligation, OutreachChannel::Email).as_deref(),
            Some("ap@example.com")
        );
        assert_eq!(recipient_for(&obligation, OutreachChannel::Sms), None);
    }

    #[tokio::test]
    async fn test_log_only_service_delivers() {
        let svc = LogOnlyDeliveryService;
        let request = DeliveryRequest {
            channel: OutreachChannel::Email,
            recipient: "ap@example.com".to_string(),
            subject: Some("测试".to_string()),
            body: "正文".to_string(),
        };
        let receipt = svc.send(&request).await.expect("log-only 投递必成功");
        assert!(receipt.provider_message_id.is_some());
    }
}
