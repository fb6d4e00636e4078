//! 测试工具模块
//!
//! 提供可编排的数据源桩、记录型通知器和交易构造函数，供本库和服务层的测试使用。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use crate::error::ProviderError;
use crate::models::{
    DailyReport, MilestoneEvent, ProviderId, TrafficMetrics, Transaction, TransactionStatus,
};
use crate::notifier::RevenueNotifier;
use crate::providers::{ProviderClient, RegisteredProvider};

// ==================== 交易构造 ====================

/// 固定时间点，便于断言
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// 报表币种为 NGN 的交易
pub fn ngn_transaction(
    source: ProviderId,
    external_id: &str,
    amount: i64,
    status: TransactionStatus,
    occurred_at: DateTime<Utc>,
) -> Transaction {
    Transaction::new(source, external_id, amount, "NGN", status, occurred_at)
        .unwrap_or_else(|e| panic!("测试交易构造失败: {}", e))
}

pub fn succeeded(source: ProviderId, external_id: &str, amount: i64, occurred_at: DateTime<Utc>) -> Transaction {
    ngn_transaction(source, external_id, amount, TransactionStatus::Succeeded, occurred_at)
}

// ==================== 数据源桩 ====================

enum StubResponse {
    Transactions(Vec<Transaction>),
    Error(ProviderError),
}

/// 可编排的数据源桩
///
/// 可设置返回的交易或错误、响应延迟以及流量指标，并记录被调用的次数。
pub struct StubProvider {
    id: ProviderId,
    configured: bool,
    delay: Duration,
    response: Mutex<StubResponse>,
    traffic: Option<TrafficMetrics>,
    verified: Mutex<Option<Transaction>>,
    calls: AtomicUsize,
}

impl StubProvider {
    pub fn new(id: ProviderId) -> Self {
        Self {
            id,
            configured: true,
            delay: Duration::ZERO,
            response: Mutex::new(StubResponse::Transactions(Vec::new())),
            traffic: None,
            verified: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unconfigured(id: ProviderId) -> Self {
        Self {
            configured: false,
            ..Self::new(id)
        }
    }

    pub fn with_transactions(self, transactions: Vec<Transaction>) -> Self {
        *self.response.lock() = StubResponse::Transactions(transactions);
        self
    }

    pub fn with_error(self, error: ProviderError) -> Self {
        *self.response.lock() = StubResponse::Error(error);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_traffic(mut self, traffic: TrafficMetrics) -> Self {
        self.traffic = Some(traffic);
        self
    }

    pub fn with_verified(self, transaction: Transaction) -> Self {
        *self.verified.lock() = Some(transaction);
        self
    }

    /// 运行中切换响应，用于模拟抖动
    pub fn set_error(&self, error: Option<ProviderError>) {
        let mut response = self.response.lock();
        *response = match error {
            Some(e) => StubResponse::Error(e),
            None => StubResponse::Transactions(Vec::new()),
        };
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn registered(self: Arc<Self>, timeout: Duration) -> RegisteredProvider {
        RegisteredProvider::new(self, timeout)
    }

    fn current(&self) -> Result<Vec<Transaction>, ProviderError> {
        match &*self.response.lock() {
            StubResponse::Transactions(txs) => Ok(txs.clone()),
            StubResponse::Error(e) => Err(e.clone()),
        }
    }
}

#[async_trait]
impl ProviderClient for StubProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn fetch_transactions(&self, limit: usize) -> Result<Vec<Transaction>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.current()
            .map(|mut txs| {
                txs.truncate(limit);
                txs
            })
    }

    async fn traffic_metrics(&self) -> Result<Option<TrafficMetrics>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.current().map(|_| self.traffic.clone())
    }

    async fn verify_transaction(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, ProviderError> {
        self.current()?;
        Ok(self
            .verified
            .lock()
            .clone()
            .filter(|tx| tx.external_id == reference))
    }
}

// ==================== 通知记录 ====================

/// 记录所有通知，便于断言
#[derive(Default)]
pub struct RecordingNotifier {
    pub milestones: Mutex<Vec<MilestoneEvent>>,
    pub reports: Mutex<Vec<DailyReport>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn milestone_count(&self) -> usize {
        self.milestones.lock().len()
    }

    pub fn report_count(&self) -> usize {
        self.reports.lock().len()
    }
}

impl RevenueNotifier for RecordingNotifier {
    fn on_milestone(&self, event: &MilestoneEvent) {
        self.milestones.lock().push(event.clone());
    }

    fn on_daily_report(&self, report: &DailyReport) {
        self.reports.lock().push(report.clone());
    }
}
