//! 收入快照仓储
//!
//! 表结构见工作区根目录 `migrations/`。`(source, period_start, period_end)` 唯一，
//! 重复写入同一周期时覆盖金额和写入时间。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use revenue_core::{RevenueRecord, RevenueStore, StoreError};
use sqlx::PgPool;
use tracing::instrument;

/// 数据库行
#[derive(Debug, sqlx::FromRow)]
struct RevenueRecordRow {
    source: String,
    amount_minor_units: i64,
    currency: String,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    growth_percent: f64,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<RevenueRecordRow> for RevenueRecord {
    type Error = StoreError;

    fn try_from(row: RevenueRecordRow) -> Result<Self, Self::Error> {
        let source = row
            .source
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("未知的数据源 {:?}", row.source)))?;
        if row.amount_minor_units < 0 {
            return Err(StoreError::Corrupt(format!(
                "{} 的金额为负: {}",
                row.source, row.amount_minor_units
            )));
        }

        Ok(Self {
            source,
            amount_minor_units: row.amount_minor_units,
            currency: row.currency.trim().to_string(),
            period_start: row.period_start,
            period_end: row.period_end,
            growth_percent: row.growth_percent,
            recorded_at: row.recorded_at,
        })
    }
}

fn unavailable(err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

/// PostgreSQL 收入快照存储
pub struct PgRevenueStore {
    pool: PgPool,
}

impl PgRevenueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RevenueStore for PgRevenueStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    /// 同一批快照在一个事务内写入
    #[instrument(skip_all, fields(records = records.len()))]
    async fn save(&self, records: &[RevenueRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO revenue_records
                    (source, amount_minor_units, currency, period_start, period_end, growth_percent, recorded_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (source, period_start, period_end) DO UPDATE SET
                    amount_minor_units = EXCLUDED.amount_minor_units,
                    currency = EXCLUDED.currency,
                    growth_percent = EXCLUDED.growth_percent,
                    recorded_at = EXCLUDED.recorded_at
                "#,
            )
            .bind(record.source.as_str())
            .bind(record.amount_minor_units)
            .bind(&record.currency)
            .bind(record.period_start)
            .bind(record.period_end)
            .bind(record.growth_percent)
            .bind(record.recorded_at)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;
        }
        tx.commit().await.map_err(unavailable)
    }

    #[instrument(skip(self))]
    async fn recent(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RevenueRecord>, StoreError> {
        let rows = sqlx::query_as::<_, RevenueRecordRow>(
            r#"
            SELECT source, amount_minor_units, currency, period_start, period_end,
                   growth_percent, recorded_at
            FROM revenue_records
            WHERE recorded_at >= $1
            ORDER BY recorded_at DESC, source
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.into_iter().map(RevenueRecord::try_from).collect()
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(unavailable)
    }
}
