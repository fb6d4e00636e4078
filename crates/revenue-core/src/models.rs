//! 领域模型
//!
//! 所有实体都在单次请求内构造；汇总结果的持久化见 [`crate::revenue_store`]。
//! 序列化字段统一使用 camelCase，与前端轮询的 JSON 约定一致。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::status::NormalizedStatus;

// ==================== 数据源 ====================

/// 数据源标识
///
/// 声明顺序即固定查询顺序，`Ord` 派生保证 BTreeMap 按该顺序输出。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    Paystack,
    Stripe,
    Shopify,
    CommissionJunction,
    Clickbank,
    Shareasale,
    GoogleAnalytics,
}

impl ProviderId {
    pub const ALL: [ProviderId; 7] = [
        ProviderId::Paystack,
        ProviderId::Stripe,
        ProviderId::Shopify,
        ProviderId::CommissionJunction,
        ProviderId::Clickbank,
        ProviderId::Shareasale,
        ProviderId::GoogleAnalytics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paystack => "paystack",
            Self::Stripe => "stripe",
            Self::Shopify => "shopify",
            Self::CommissionJunction => "commission_junction",
            Self::Clickbank => "clickbank",
            Self::Shareasale => "shareasale",
            Self::GoogleAnalytics => "google_analytics",
        }
    }

    /// 展示名称，用于动态流文案
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Paystack => "Paystack",
            Self::Stripe => "Stripe",
            Self::Shopify => "Shopify",
            Self::CommissionJunction => "Commission Junction",
            Self::Clickbank => "ClickBank",
            Self::Shareasale => "ShareASale",
            Self::GoogleAnalytics => "Google Analytics",
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Paystack | Self::Stripe => ProviderKind::PaymentGateway,
            Self::Shopify => ProviderKind::Ecommerce,
            Self::CommissionJunction | Self::Clickbank | Self::Shareasale => {
                ProviderKind::Affiliate
            }
            Self::GoogleAnalytics => ProviderKind::Analytics,
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "paystack" => Ok(Self::Paystack),
            "stripe" => Ok(Self::Stripe),
            "shopify" => Ok(Self::Shopify),
            "commission_junction" | "cj" => Ok(Self::CommissionJunction),
            "clickbank" => Ok(Self::Clickbank),
            "shareasale" => Ok(Self::Shareasale),
            "google_analytics" | "ga" => Ok(Self::GoogleAnalytics),
            _ => Err(CoreError::UnknownProvider(s.to_string())),
        }
    }
}

/// 数据源类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    PaymentGateway,
    Ecommerce,
    Affiliate,
    Analytics,
}

impl ProviderKind {
    /// 分析类数据源不产生收入
    pub fn contributes_revenue(&self) -> bool {
        !matches!(self, Self::Analytics)
    }
}

// ==================== 交易 ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Succeeded,
    Failed,
    Pending,
}

/// 单笔交易金额上限（最小单位），约为主单位 10 万亿
pub const MAX_TRANSACTION_MINOR_UNITS: i64 = 1_000_000_000_000_000;

/// 归一化交易
///
/// 金额以最小货币单位存储，只能通过 [`Transaction::new`] 构造以保证非负。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub source: ProviderId,
    pub external_id: String,
    pub amount_minor_units: i64,
    pub currency: String,
    pub status: TransactionStatus,
    pub occurred_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_ref: Option<String>,
}

impl Transaction {
    pub fn new(
        source: ProviderId,
        external_id: impl Into<String>,
        amount_minor_units: i64,
        currency: &str,
        status: TransactionStatus,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self> {
        if amount_minor_units < 0 {
            return Err(CoreError::NegativeAmount(amount_minor_units));
        }
        if amount_minor_units > MAX_TRANSACTION_MINOR_UNITS {
            return Err(CoreError::InvalidAmount(format!(
                "金额 {} 超过单笔上限 {}",
                amount_minor_units, MAX_TRANSACTION_MINOR_UNITS
            )));
        }

        let external_id = external_id.into();
        if external_id.trim().is_empty() {
            return Err(CoreError::InvalidTransaction("externalId 不能为空".to_string()));
        }

        Ok(Self {
            source,
            external_id,
            amount_minor_units,
            currency: normalize_currency(currency)?,
            status,
            occurred_at,
            customer_ref: None,
        })
    }

    pub fn with_customer_ref(mut self, customer_ref: Option<String>) -> Self {
        self.customer_ref = customer_ref.filter(|c| !c.trim().is_empty());
        self
    }

    /// 只有成功的交易计入收入
    pub fn is_revenue(&self) -> bool {
        self.status == TransactionStatus::Succeeded
    }

    /// 去重键
    pub fn key(&self) -> (ProviderId, &str) {
        (self.source, self.external_id.as_str())
    }
}

/// 校验并统一为大写的 ISO 4217 币种代码
pub fn normalize_currency(currency: &str) -> Result<String> {
    let code = currency.trim().to_ascii_uppercase();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code)
    } else {
        Err(CoreError::InvalidCurrency(currency.to_string()))
    }
}

// ==================== 统计周期 ====================

/// 统计周期，左闭右开 `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    calendar_month: bool,
}

impl ReportPeriod {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(CoreError::InvalidPeriod(format!(
                "开始时间 {} 必须早于结束时间 {}",
                start, end
            )));
        }
        Ok(Self {
            start,
            end,
            calendar_month: false,
        })
    }

    /// `now` 所在的自然月
    pub fn current_month(now: DateTime<Utc>) -> Result<Self> {
        let start = month_start(now.year(), now.month())?;
        let (next_year, next_month) = next_month(now.year(), now.month());
        let end = month_start(next_year, next_month)?;
        Ok(Self {
            start,
            end,
            calendar_month: true,
        })
    }

    /// 截止到 `now` 的最近 `days` 天
    pub fn last_days(now: DateTime<Utc>, days: u32) -> Result<Self> {
        if days == 0 {
            return Err(CoreError::InvalidPeriod("天数必须大于 0".to_string()));
        }
        let start = now
            .checked_sub_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| CoreError::InvalidPeriod(format!("{} 天超出可表示的时间范围", days)))?;
        Self::new(start, now)
    }

    pub fn length(&self) -> Duration {
        self.end - self.start
    }

    pub fn is_calendar_month(&self) -> bool {
        self.calendar_month
    }

    /// 上一个可比较周期
    ///
    /// 自然月返回上一个自然月，其余返回紧邻的等长区间；
    /// 起点越过可表示的最早时间时截断到 `DateTime::<Utc>::MIN_UTC`。
    pub fn previous(&self) -> Self {
        if self.calendar_month {
            let (year, month) = previous_month(self.start.year(), self.start.month());
            if let Ok(start) = month_start(year, month) {
                return Self {
                    start,
                    end: self.start,
                    calendar_month: true,
                };
            }
        }

        Self {
            start: self
                .start
                .checked_sub_signed(self.length())
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            end: self.start,
            calendar_month: false,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

fn month_start(year: i32, month: u32) -> Result<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| CoreError::InvalidPeriod(format!("无效的月份 {}-{}", year, month)))
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

// ==================== 收入汇总 ====================

/// 收入汇总
///
/// 不变量：`total_minor_units == by_provider.values().sum()`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSummary {
    pub total_minor_units: i64,
    pub by_provider: BTreeMap<ProviderId, i64>,
    pub currency: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub previous_total_minor_units: i64,
    pub growth_percent: f64,
    pub configured_provider_count: usize,
    pub transaction_count: usize,
    pub skipped_foreign_currency: usize,
}

/// 环比增长率（百分比，保留两位小数）
///
/// 上期为 0 时：本期也为 0 返回 0，否则返回 100。
pub fn growth_percent(current: i64, previous: i64) -> f64 {
    if previous == 0 {
        return if current == 0 { 0.0 } else { 100.0 };
    }

    let current = Decimal::from(current);
    let previous = Decimal::from(previous);
    ((current - previous) / previous * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or(0.0)
}

// ==================== 数据源状态 ====================

/// 失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unavailable,
    Unauthorized,
    MalformedResponse,
    NotConfigured,
}

/// 数据源原始健康状态
///
/// `reachable` 仅在 `configured` 为 true 时有意义，`None` 表示尚未检测。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub provider_id: ProviderId,
    pub configured: bool,
    pub reachable: Option<bool>,
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProviderStatus {
    pub fn not_configured(provider_id: ProviderId) -> Self {
        Self {
            provider_id,
            configured: false,
            reachable: None,
            last_checked_at: None,
            failure: None,
            message: None,
        }
    }

    pub fn untested(provider_id: ProviderId) -> Self {
        Self {
            configured: true,
            ..Self::not_configured(provider_id)
        }
    }

    pub fn reachable(provider_id: ProviderId, checked_at: DateTime<Utc>) -> Self {
        Self {
            provider_id,
            configured: true,
            reachable: Some(true),
            last_checked_at: Some(checked_at),
            failure: None,
            message: None,
        }
    }

    pub fn unreachable(
        provider_id: ProviderId,
        checked_at: DateTime<Utc>,
        error: &crate::error::ProviderError,
    ) -> Self {
        Self {
            provider_id,
            configured: true,
            reachable: Some(false),
            last_checked_at: Some(checked_at),
            failure: Some(error.kind()),
            message: Some(error.to_string()),
        }
    }
}

/// 归一化状态与原始状态
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub status: NormalizedStatus,
    pub raw: ProviderStatus,
}

// ==================== 动态流 ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Revenue,
    Affiliate,
    System,
}

/// 动态事件，返回序列中按时间倒序排列
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub id: String,
    pub source: ProviderId,
    pub kind: ActivityKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_minor_units: Option<i64>,
}

// ==================== 流量 ====================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficMetrics {
    pub sessions: u64,
    pub users: u64,
    /// sessions / users * 100，保留两位小数
    pub conversion_rate: f64,
}

impl TrafficMetrics {
    pub fn new(sessions: u64, users: u64) -> Self {
        let conversion_rate = if users == 0 {
            0.0
        } else {
            (Decimal::from(sessions) / Decimal::from(users) * Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
                .to_f64()
                .unwrap_or(0.0)
        };
        Self {
            sessions,
            users,
            conversion_rate,
        }
    }
}

// ==================== 通知事件 ====================

/// 收入里程碑
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneEvent {
    pub amount_minor_units: i64,
    pub threshold_minor_units: i64,
    pub currency: String,
    pub source: ProviderId,
    pub timestamp: DateTime<Utc>,
}

/// 每日报告
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyReport {
    pub date: NaiveDate,
    pub currency: String,
    pub total_minor_units: i64,
    pub today_minor_units: i64,
    pub today_transaction_count: usize,
}
