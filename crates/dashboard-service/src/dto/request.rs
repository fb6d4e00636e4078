//! 请求 DTO 定义

use chrono::{DateTime, Duration, Utc};
use revenue_core::money::parse_major_units;
use revenue_core::{
    MAX_TRANSACTION_MINOR_UNITS, ProviderId, ReportPeriod, Transaction, TransactionStatus,
};
use serde::Deserialize;
use validator::Validate;

use crate::error::{ApiError, Result};

/// 最长可查询的天数
const MAX_PERIOD_DAYS: u32 = 366;

/// 收入汇总查询参数
///
/// `period` 取 `month`（默认，当前自然月）或 `{n}d`（最近 n 天）；
/// 同时给出 `from` 和 `to` 时使用自定义区间，优先于 `period`。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueQuery {
    pub period: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl RevenueQuery {
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<ReportPeriod> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => {
                let period = ReportPeriod::new(from, to)?;
                if period.length() > Duration::days(i64::from(MAX_PERIOD_DAYS)) {
                    return Err(ApiError::Validation(format!(
                        "自定义区间不能超过 {} 天",
                        MAX_PERIOD_DAYS
                    )));
                }
                return Ok(period);
            }
            (None, None) => {}
            _ => {
                return Err(ApiError::Validation(
                    "from 和 to 必须同时提供".to_string(),
                ));
            }
        }

        let period = self
            .period
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or("month");

        if period.eq_ignore_ascii_case("month") {
            return Ok(ReportPeriod::current_month(now)?);
        }

        let days = period
            .strip_suffix('d')
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| (1..=MAX_PERIOD_DAYS).contains(n))
            .ok_or_else(|| {
                ApiError::Validation(format!(
                    "无效的统计周期 {:?}，可选 month 或 1d-{}d",
                    period, MAX_PERIOD_DAYS
                ))
            })?;
        Ok(ReportPeriod::last_days(now, days)?)
    }
}

/// 收入快照历史查询参数
#[derive(Debug, Default, Deserialize, Validate)]
pub struct RevenueHistoryQuery {
    #[validate(range(min = 1, max = 366, message = "days 必须在 1-366 之间"))]
    pub days: Option<u32>,
    #[validate(range(min = 1, max = 500, message = "limit 必须在 1-500 之间"))]
    pub limit: Option<usize>,
}

impl RevenueHistoryQuery {
    pub const DEFAULT_DAYS: u32 = 30;
    pub const DEFAULT_LIMIT: usize = 100;
}

/// 动态流查询参数
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ActivityQuery {
    #[validate(range(min = 1, message = "limit 必须大于 0"))]
    pub limit: Option<usize>,
}

/// 支付核验请求
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, max = 100, message = "reference 长度必须在1-100个字符之间"))]
    pub reference: String,
}

/// 外部交易推送请求
///
/// 金额二选一：`amountMinorUnits`（最小单位整数）或 `amount`（主单位小数字符串）。
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct IngestTransactionRequest {
    #[validate(length(min = 1, max = 50, message = "source 不能为空"))]
    pub source: String,
    #[validate(length(min = 1, max = 200, message = "externalId 长度必须在1-200个字符之间"))]
    pub external_id: String,
    #[validate(range(
        min = 0,
        max = MAX_TRANSACTION_MINOR_UNITS,
        message = "金额必须在 0 到单笔上限之间"
    ))]
    pub amount_minor_units: Option<i64>,
    pub amount: Option<String>,
    #[validate(length(equal = 3, message = "currency 必须是 3 位币种代码"))]
    pub currency: String,
    #[serde(default = "default_status")]
    pub status: TransactionStatus,
    pub occurred_at: Option<DateTime<Utc>>,
    #[validate(length(max = 200))]
    pub customer_ref: Option<String>,
}

fn default_status() -> TransactionStatus {
    TransactionStatus::Succeeded
}

impl IngestTransactionRequest {
    /// 转换为归一化交易，缺少发生时间时使用 `now`
    pub fn into_transaction(self, now: DateTime<Utc>) -> Result<Transaction> {
        let source: ProviderId = self.source.parse()?;

        let amount = match (self.amount_minor_units, self.amount.as_deref()) {
            (Some(minor), None) => minor,
            (None, Some(major)) => parse_major_units(major, &self.currency)?,
            _ => {
                return Err(ApiError::Validation(
                    "amountMinorUnits 与 amount 必须且只能提供一个".to_string(),
                ));
            }
        };

        let transaction = Transaction::new(
            source,
            self.external_id,
            amount,
            &self.currency,
            self.status,
            self.occurred_at.unwrap_or(now),
        )?;
        Ok(transaction.with_customer_ref(self.customer_ref))
    }
}
