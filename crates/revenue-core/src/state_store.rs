//! 通知状态存储
//!
//! 记录哪些里程碑已经通知过、每日报告最后发送的日期。
//! 这份跨请求的记忆由聚合器显式持有，实现可以替换为外部持久化。

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;

use crate::models::ProviderId;

/// 里程碑去重键：同一数据源、同一周期、同一阈值只通知一次
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MilestoneKey {
    pub source: ProviderId,
    pub period_start: NaiveDate,
    pub threshold_minor_units: i64,
}

/// 通知状态存储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReportStateStore: Send + Sync {
    /// 首次登记返回 true，已登记过返回 false
    async fn claim_milestone(&self, key: &MilestoneKey) -> bool;

    /// 当天尚未发送过报告时登记并返回 true
    async fn claim_daily_report(&self, date: NaiveDate) -> bool;

    async fn last_daily_report(&self) -> Option<NaiveDate>;
}

/// 进程内实现
#[derive(Default)]
pub struct InMemoryReportStateStore {
    milestones: Mutex<HashSet<MilestoneKey>>,
    last_report: Mutex<Option<NaiveDate>>,
}

impl InMemoryReportStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportStateStore for InMemoryReportStateStore {
    async fn claim_milestone(&self, key: &MilestoneKey) -> bool {
        self.milestones.lock().insert(key.clone())
    }

    async fn claim_daily_report(&self, date: NaiveDate) -> bool {
        let mut last = self.last_report.lock();
        match *last {
            Some(previous) if previous >= date => false,
            _ => {
                *last = Some(date);
                true
            }
        }
    }

    async fn last_daily_report(&self) -> Option<NaiveDate> {
        *self.last_report.lock()
    }
}
