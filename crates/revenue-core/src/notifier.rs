//! 收入通知钩子
//!
//! 聚合器在收入跨过里程碑、或每天首次计算汇总时调用这里的钩子。
//! 钩子是同步的，实现方负责把实际投递放到后台任务，不能拖慢聚合响应。

use tracing::info;

use crate::models::{DailyReport, MilestoneEvent};
use crate::money::format_amount;

#[cfg_attr(test, mockall::automock)]
pub trait RevenueNotifier: Send + Sync {
    fn on_milestone(&self, event: &MilestoneEvent);

    fn on_daily_report(&self, report: &DailyReport);
}

/// 不做任何事
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl RevenueNotifier for NoopNotifier {
    fn on_milestone(&self, _event: &MilestoneEvent) {}

    fn on_daily_report(&self, _report: &DailyReport) {}
}

/// 只写日志，未配置邮件时使用
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

impl RevenueNotifier for LoggingNotifier {
    fn on_milestone(&self, event: &MilestoneEvent) {
        info!(
            source = %event.source,
            amount = event.amount_minor_units,
            threshold = event.threshold_minor_units,
            "收入里程碑达成: {} 来自 {}",
            format_amount(event.amount_minor_units, &event.currency),
            event.source.display_name()
        );
    }

    fn on_daily_report(&self, report: &DailyReport) {
        info!(
            date = %report.date,
            total = report.total_minor_units,
            today = report.today_minor_units,
            today_count = report.today_transaction_count,
            "每日收入报告"
        );
    }
}

/// 多个通知实现串联
pub struct FanoutNotifier {
    notifiers: Vec<std::sync::Arc<dyn RevenueNotifier>>,
}

impl FanoutNotifier {
    pub fn new(notifiers: Vec<std::sync::Arc<dyn RevenueNotifier>>) -> Self {
        Self { notifiers }
    }
}

impl RevenueNotifier for FanoutNotifier {
    fn on_milestone(&self, event: &MilestoneEvent) {
        for notifier in &self.notifiers {
            notifier.on_milestone(event);
        }
    }

    fn on_daily_report(&self, report: &DailyReport) {
        for notifier in &self.notifiers {
            notifier.on_daily_report(report);
        }
    }
}
