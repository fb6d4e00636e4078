//! 收入快照存储
//!
//! 自然月汇总得到非零收入时，每个有收入的数据源写入一条快照。
//! 同一数据源同一周期只保留最新一条，重复轮询不会产生重复行。
//! 进程内实现用于未配置数据库的部署，PostgreSQL 实现在服务层。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::StoreError;
use crate::models::{ProviderId, RevenueSummary};

/// 单个数据源在一个统计周期内的收入快照
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueRecord {
    pub source: ProviderId,
    pub amount_minor_units: i64,
    pub currency: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    /// 整体环比，取自同一次汇总
    pub growth_percent: f64,
    pub recorded_at: DateTime<Utc>,
}

impl RevenueRecord {
    /// 汇总中金额大于 0 的数据源各生成一条快照，按数据源顺序排列
    pub fn from_summary(summary: &RevenueSummary, recorded_at: DateTime<Utc>) -> Vec<Self> {
        summary
            .by_provider
            .iter()
            .filter(|(_, amount)| **amount > 0)
            .map(|(source, amount)| Self {
                source: *source,
                amount_minor_units: *amount,
                currency: summary.currency.clone(),
                period_start: summary.period_start,
                period_end: summary.period_end,
                growth_percent: summary.growth_percent,
                recorded_at,
            })
            .collect()
    }

    /// 覆盖写入的唯一键
    pub fn key(&self) -> (ProviderId, DateTime<Utc>, DateTime<Utc>) {
        (self.source, self.period_start, self.period_end)
    }
}

/// 收入快照存储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RevenueStore: Send + Sync {
    /// 后端名称，写入就绪检查和指标标签
    fn backend(&self) -> &'static str;

    /// 写入快照，键相同的旧快照被覆盖
    async fn save(&self, records: &[RevenueRecord]) -> Result<(), StoreError>;

    /// `since` 之后写入的快照，按写入时间倒序，最多 `limit` 条
    async fn recent(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RevenueRecord>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// 进程内实现，重启后清空
#[derive(Default)]
pub struct InMemoryRevenueStore {
    records: Mutex<HashMap<(ProviderId, DateTime<Utc>, DateTime<Utc>), RevenueRecord>>,
}

impl InMemoryRevenueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl RevenueStore for InMemoryRevenueStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn save(&self, records: &[RevenueRecord]) -> Result<(), StoreError> {
        let mut stored = self.records.lock();
        for record in records {
            stored.insert(record.key(), record.clone());
        }
        Ok(())
    }

    async fn recent(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RevenueRecord>, StoreError> {
        let mut records: Vec<RevenueRecord> = self
            .records
            .lock()
            .values()
            .filter(|r| r.recorded_at >= since)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.recorded_at
                .cmp(&a.recorded_at)
                .then_with(|| a.source.cmp(&b.source))
        });
        records.truncate(limit);
        Ok(records)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
