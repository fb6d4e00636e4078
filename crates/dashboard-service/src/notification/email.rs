//! SendGrid 邮件通知
//!
//! 通知钩子在聚合请求内同步调用，这里只组装邮件并 spawn 发送任务，不等待结果。
//! 发送失败只记录日志和指标，不影响接口响应。

use std::time::Duration;

use reqwest::Client;
use revenue_core::money::format_amount;
use revenue_core::{DailyReport, MilestoneEvent, RevenueNotifier};
use revenue_shared::config::NotificationConfig;
use revenue_shared::observability::metrics;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

/// 一封待发送的纯文本邮件
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
}

pub struct SendGridNotifier {
    http: Client,
    api_key: String,
    endpoint: String,
    recipient: String,
    from_address: String,
    from_name: String,
}

impl SendGridNotifier {
    /// 按配置创建；未启用或缺少 API Key、收件人时返回 None
    pub fn from_config(config: &NotificationConfig) -> anyhow::Result<Option<Self>> {
        if !config.enabled {
            info!("邮件通知已关闭");
            return Ok(None);
        }

        let (Some(api_key), Some(recipient)) = (
            config.sendgrid_api_key.as_deref().filter(|k| !k.trim().is_empty()),
            config.recipient.as_deref().filter(|r| !r.trim().is_empty()),
        ) else {
            warn!("SendGrid API Key 或收件人未配置，邮件通知不可用");
            return Ok(None);
        };

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .build()?;

        Ok(Some(Self {
            http,
            api_key: api_key.to_string(),
            endpoint: config.endpoint.clone(),
            recipient: recipient.to_string(),
            from_address: config.from_address.clone(),
            from_name: config.from_name.clone(),
        }))
    }

    /// SendGrid v3 `mail/send` 请求体
    pub fn payload(&self, message: &EmailMessage) -> Value {
        json!({
            "personalizations": [{
                "to": [{ "email": self.recipient }],
                "subject": message.subject
            }],
            "from": { "email": self.from_address, "name": self.from_name },
            "content": [{ "type": "text/plain", "value": message.body }]
        })
    }

    fn dispatch(&self, kind: &'static str, message: EmailMessage) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(kind, "没有可用的 tokio 运行时，跳过邮件发送");
            metrics::record_notification(kind, "skipped");
            return;
        };

        let request = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.payload(&message));

        runtime.spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    info!(kind, subject = %message.subject, "邮件通知已发送");
                    metrics::record_notification(kind, "sent");
                }
                Ok(response) => {
                    warn!(kind, status = response.status().as_u16(), "SendGrid 拒绝了邮件");
                    metrics::record_notification(kind, "failed");
                }
                Err(e) => {
                    warn!(kind, error = %e.without_url(), "邮件发送失败");
                    metrics::record_notification(kind, "failed");
                }
            }
        });
        debug!(kind, "邮件发送任务已提交");
    }
}

pub fn milestone_message(event: &MilestoneEvent) -> EmailMessage {
    let threshold = format_amount(event.threshold_minor_units, &event.currency);
    let amount = format_amount(event.amount_minor_units, &event.currency);
    EmailMessage {
        subject: format!("Revenue milestone reached: {}", threshold),
        body: format!(
            "{} has crossed {} this period.\n\nCurrent total: {}\nTime: {}\n\n\
             This is an automated alert from your revenue dashboard.",
            event.source.display_name(),
            threshold,
            amount,
            event.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        ),
    }
}

pub fn daily_report_message(report: &DailyReport) -> EmailMessage {
    let today = format_amount(report.today_minor_units, &report.currency);
    let total = format_amount(report.total_minor_units, &report.currency);
    EmailMessage {
        subject: format!("Daily revenue report for {}", report.date),
        body: format!(
            "Revenue today: {} across {} transaction(s)\nPeriod total: {}\n\n\
             This is an automated report from your revenue dashboard.",
            today, report.today_transaction_count, total,
        ),
    }
}

impl RevenueNotifier for SendGridNotifier {
    fn on_milestone(&self, event: &MilestoneEvent) {
        self.dispatch("milestone", milestone_message(event));
    }

    fn on_daily_report(&self, report: &DailyReport) {
        self.dispatch("daily_report", daily_report_message(report));
    }
}
