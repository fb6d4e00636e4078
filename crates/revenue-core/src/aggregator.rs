//! 收入聚合器
//!
//! 并发调用所有已配置的数据源，合并为统一的收入汇总、动态流和状态表。
//!
//! ## 设计说明
//!
//! - **扇出/扇入**：所有调用先创建再统一 `join_all`，总延迟取决于最慢的单个数据源
//! - **故障隔离**：每个调用都包在独立超时里（重试也在超时之内），失败的数据源贡献 0 并在状态中标记
//! - **无共享写入**：并发分支只返回本地结果，合并在全部完成后进行
//! - **零配置**：`configured_provider_count == 0` 时返回全零汇总，不编造数据
//! - **快照**：自然月汇总有收入时写入 [`RevenueStore`]，存储故障不影响汇总结果

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use revenue_shared::config::AggregatorConfig;
use revenue_shared::observability::metrics;
use revenue_shared::retry::{RetryPolicy, retry_with_policy};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::{CoreError, ProviderError, Result, StoreError};
use crate::models::{
    ActivityEvent, ActivityKind, DailyReport, MilestoneEvent, ProviderHealth, ProviderId,
    ProviderKind, ProviderStatus, ReportPeriod, RevenueSummary, TrafficMetrics, Transaction,
    growth_percent, normalize_currency,
};
use crate::notifier::{NoopNotifier, RevenueNotifier};
use crate::providers::{ProviderClient, RegisteredProvider};
use crate::revenue_store::{InMemoryRevenueStore, RevenueRecord, RevenueStore};
use crate::state_store::{InMemoryReportStateStore, MilestoneKey, ReportStateStore};
use crate::status::{NormalizedStatus, StatusNormalizer};

// ==================== 响应结构 ====================

/// 收入汇总与各数据源健康状态
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueReport {
    #[serde(flatten)]
    pub summary: RevenueSummary,
    pub providers: BTreeMap<ProviderId, ProviderHealth>,
}

/// 动态流
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityFeed {
    pub events: Vec<ActivityEvent>,
    pub configured_provider_count: usize,
    pub providers: BTreeMap<ProviderId, ProviderHealth>,
}

/// 整体状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// 所有已配置的数据源在线
    Healthy,
    /// 至少一个已配置的数据源不在线
    Degraded,
    /// 没有任何已配置的数据源
    Unconfigured,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub overall: OverallStatus,
    pub configured_provider_count: usize,
    pub checked_at: DateTime<Utc>,
    pub providers: BTreeMap<ProviderId, ProviderHealth>,
}

// ==================== 单个数据源的调用结果 ====================

enum Outcome {
    /// 凭证缺失，未调用
    NotConfigured,
    /// 本次操作不需要调用（如分析类数据源不参与收入汇总）
    Skipped,
    Fetched(Vec<Transaction>),
    Failed(ProviderError),
}

struct ProviderOutcome {
    id: ProviderId,
    checked_at: DateTime<Utc>,
    outcome: Outcome,
}

impl ProviderOutcome {
    fn raw_status(&self) -> ProviderStatus {
        match &self.outcome {
            Outcome::NotConfigured => ProviderStatus::not_configured(self.id),
            Outcome::Skipped => ProviderStatus::untested(self.id),
            Outcome::Fetched(_) => ProviderStatus::reachable(self.id, self.checked_at),
            Outcome::Failed(e) => ProviderStatus::unreachable(self.id, self.checked_at, e),
        }
    }

    fn transactions(&self) -> &[Transaction] {
        match &self.outcome {
            Outcome::Fetched(txs) => txs,
            _ => &[],
        }
    }
}

// ==================== 聚合器 ====================

/// 单次存储操作的超时
const STORE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Aggregator {
    providers: Vec<RegisteredProvider>,
    config: AggregatorConfig,
    reporting_currency: String,
    retry_policy: RetryPolicy,
    normalizer: Arc<StatusNormalizer>,
    notifier: Arc<dyn RevenueNotifier>,
    state_store: Arc<dyn ReportStateStore>,
    revenue_store: Arc<dyn RevenueStore>,
    /// 外部推送的交易，按到达顺序排列，超出容量时淘汰最旧的
    ingested: Mutex<VecDeque<Transaction>>,
}

impl Aggregator {
    /// 创建聚合器
    ///
    /// `providers` 的顺序即查询顺序，也是同一时间戳动态的排列顺序。
    pub fn new(providers: Vec<RegisteredProvider>, config: AggregatorConfig) -> Result<Self> {
        let reporting_currency = normalize_currency(&config.reporting_currency)?;
        let mut thresholds = config.milestone_thresholds.clone();
        thresholds.retain(|t| *t > 0);
        thresholds.sort_unstable();
        thresholds.dedup();

        Ok(Self {
            providers,
            config: AggregatorConfig {
                milestone_thresholds: thresholds,
                ..config
            },
            reporting_currency,
            retry_policy: RetryPolicy::default(),
            normalizer: Arc::new(StatusNormalizer::default()),
            notifier: Arc::new(NoopNotifier),
            state_store: Arc::new(InMemoryReportStateStore::new()),
            revenue_store: Arc::new(InMemoryRevenueStore::new()),
            ingested: Mutex::new(VecDeque::new()),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Arc<StatusNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn RevenueNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_state_store(mut self, store: Arc<dyn ReportStateStore>) -> Self {
        self.state_store = store;
        self
    }

    pub fn with_revenue_store(mut self, store: Arc<dyn RevenueStore>) -> Self {
        self.revenue_store = store;
        self
    }

    pub fn revenue_store_backend(&self) -> &'static str {
        self.revenue_store.backend()
    }

    pub fn reporting_currency(&self) -> &str {
        &self.reporting_currency
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// 凭证齐全的数据源数量
    pub fn configured_provider_count(&self) -> usize {
        self.providers
            .iter()
            .filter(|p| p.client.is_configured())
            .count()
    }

    pub fn provider_ids(&self) -> Vec<ProviderId> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    /// 是否有凭证齐全的某类数据源
    pub fn has_configured(&self, kind: ProviderKind) -> bool {
        self.providers
            .iter()
            .any(|p| p.id().kind() == kind && p.client.is_configured())
    }

    fn find(&self, id: ProviderId) -> Option<&RegisteredProvider> {
        self.providers.iter().find(|p| p.id() == id)
    }

    // ---------- 收入汇总 ----------

    /// 计算统计周期内的收入汇总
    #[instrument(skip(self), fields(period_start = %period.start, period_end = %period.end))]
    pub async fn get_revenue_summary(&self, period: ReportPeriod) -> RevenueReport {
        let start = Instant::now();
        let outcomes = self.fan_out("revenue_summary", self.config.fetch_limit).await;
        let configured = self.count_configured(&outcomes);

        let transactions = self.merge_with_ingested(&outcomes);
        let previous = period.previous();

        let mut by_provider: BTreeMap<ProviderId, i64> = outcomes
            .iter()
            .filter(|o| o.id.kind().contributes_revenue())
            .filter(|o| !matches!(o.outcome, Outcome::NotConfigured))
            .map(|o| (o.id, 0))
            .collect();
        let mut total = 0_i64;
        let mut previous_total = 0_i64;
        let mut transaction_count = 0;
        let mut skipped_foreign = 0;

        for tx in transactions.iter().filter(|tx| tx.is_revenue()) {
            let in_current = period.contains(tx.occurred_at);
            let in_previous = previous.contains(tx.occurred_at);
            if !in_current && !in_previous {
                continue;
            }

            if tx.currency != self.reporting_currency {
                if in_current {
                    skipped_foreign += 1;
                    warn!(
                        provider = %tx.source,
                        external_id = %tx.external_id,
                        currency = %tx.currency,
                        reporting_currency = %self.reporting_currency,
                        "币种与报表币种不一致，不计入汇总"
                    );
                }
                continue;
            }

            // 各数据源小计之和不超过 total，只需检查 total 是否溢出
            let running = if in_current { &mut total } else { &mut previous_total };
            let Some(next) = running.checked_add(tx.amount_minor_units) else {
                warn!(
                    provider = %tx.source,
                    external_id = %tx.external_id,
                    amount = tx.amount_minor_units,
                    "累计金额溢出，交易不计入汇总"
                );
                continue;
            };
            *running = next;
            if in_current {
                *by_provider.entry(tx.source).or_insert(0) += tx.amount_minor_units;
                transaction_count += 1;
            }
        }

        for (provider, amount) in &by_provider {
            metrics::set_provider_revenue(provider.as_str(), *amount);
        }

        let summary = RevenueSummary {
            total_minor_units: total,
            by_provider,
            currency: self.reporting_currency.clone(),
            period_start: period.start,
            period_end: period.end,
            previous_total_minor_units: previous_total,
            growth_percent: growth_percent(total, previous_total),
            configured_provider_count: configured,
            transaction_count,
            skipped_foreign_currency: skipped_foreign,
        };

        if configured > 0 {
            self.evaluate_milestones(&summary, period).await;
            self.emit_daily_report(&summary, &transactions).await;
            self.persist_snapshot(&summary, period).await;
        } else {
            info!("没有已配置的数据源，返回空汇总");
        }

        let providers = self.health_map(&outcomes);
        metrics::record_aggregation("revenue_summary", configured, start.elapsed().as_secs_f64());
        info!(
            total = summary.total_minor_units,
            growth = summary.growth_percent,
            configured,
            transactions = summary.transaction_count,
            "收入汇总完成"
        );

        RevenueReport { summary, providers }
    }

    // ---------- 动态流 ----------

    /// 合并各数据源的最新动态，按时间倒序，最多 `max_items` 条
    #[instrument(skip(self))]
    pub async fn get_activity_feed(&self, max_items: usize) -> ActivityFeed {
        let start = Instant::now();
        let max_items = max_items.min(self.config.max_activity_limit);
        let outcomes = self.fan_out("activity_feed", max_items.max(1)).await;
        let configured = self.count_configured(&outcomes);

        let ingested = self.ingested_snapshot();
        let mut events = Vec::new();

        // 按配置顺序拼接，稳定排序保证同一时间戳保持该顺序
        for (registered, outcome) in self.providers.iter().zip(&outcomes) {
            let client = &registered.client;
            match &outcome.outcome {
                Outcome::NotConfigured | Outcome::Skipped => continue,
                Outcome::Failed(err) => events.push(system_event(outcome.id, outcome.checked_at, err)),
                Outcome::Fetched(_) => {}
            }

            let mut seen = HashSet::new();
            for tx in outcome.transactions() {
                seen.insert(tx.external_id.as_str());
                events.push(transaction_event(client.as_ref(), tx));
            }
            for tx in ingested.iter().filter(|tx| tx.source == outcome.id) {
                if seen.insert(tx.external_id.as_str()) {
                    events.push(transaction_event(client.as_ref(), tx));
                }
            }
        }

        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(max_items);

        let providers = self.health_map(&outcomes);
        metrics::record_aggregation("activity_feed", configured, start.elapsed().as_secs_f64());
        debug!(count = events.len(), configured, "动态流合并完成");

        ActivityFeed {
            events,
            configured_provider_count: configured,
            providers,
        }
    }

    // ---------- 状态 ----------

    /// 对所有已配置的数据源做一次健康检查
    #[instrument(skip(self))]
    pub async fn get_status(&self) -> StatusReport {
        let start = Instant::now();

        let checks = self.providers.iter().map(|registered| {
            let client = registered.client.clone();
            let timeout = registered.timeout;
            async move {
                let id = client.id();
                if !client.is_configured() {
                    return ProviderStatus::not_configured(id);
                }

                let call_start = Instant::now();
                let status = match tokio::time::timeout(timeout, client.check_health()).await {
                    Ok(status) => status,
                    Err(_) => ProviderStatus::unreachable(
                        id,
                        Utc::now(),
                        &ProviderError::Unavailable(format!("{} 健康检查超时", id)),
                    ),
                };
                let outcome = match status.failure {
                    Some(kind) => failure_label(kind),
                    None => "ok",
                };
                metrics::record_provider_request(id.as_str(), outcome, call_start.elapsed().as_secs_f64());
                status
            }
        });

        let raw: Vec<ProviderStatus> = join_all(checks).await;
        let configured = raw.iter().filter(|s| s.configured).count();

        let providers: BTreeMap<ProviderId, ProviderHealth> = raw
            .into_iter()
            .map(|raw| {
                let status = self.normalizer.observe(&raw);
                (raw.provider_id, ProviderHealth { status, raw })
            })
            .collect();

        let overall = if configured == 0 {
            OverallStatus::Unconfigured
        } else if providers
            .values()
            .filter(|h| h.raw.configured)
            .all(|h| h.status == NormalizedStatus::Online)
        {
            OverallStatus::Healthy
        } else {
            OverallStatus::Degraded
        };

        metrics::record_aggregation("status", configured, start.elapsed().as_secs_f64());
        StatusReport {
            overall,
            configured_provider_count: configured,
            checked_at: Utc::now(),
            providers,
        }
    }

    // ---------- 收入快照 ----------

    /// 自然月汇总有收入时写入快照，失败只记录日志
    async fn persist_snapshot(&self, summary: &RevenueSummary, period: ReportPeriod) {
        if !period.is_calendar_month() || summary.total_minor_units == 0 {
            return;
        }

        let records = RevenueRecord::from_summary(summary, Utc::now());
        match self.store_call("save", self.revenue_store.save(&records)).await {
            Ok(()) => debug!(records = records.len(), "收入快照已写入"),
            Err(e) => warn!(error = %e, "收入快照写入失败"),
        }
    }

    /// 最近 `days` 天写入的收入快照，按写入时间倒序
    #[instrument(skip(self))]
    pub async fn revenue_history(&self, days: u32, limit: usize) -> Result<Vec<RevenueRecord>> {
        let since = Utc::now()
            .checked_sub_signed(ChronoDuration::days(i64::from(days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let records = self
            .store_call("recent", self.revenue_store.recent(since, limit))
            .await?;
        Ok(records)
    }

    /// 快照存储是否可用，供就绪检查使用
    pub async fn check_revenue_store(&self) -> std::result::Result<(), StoreError> {
        self.store_call("health", self.revenue_store.health_check())
            .await
    }

    async fn store_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = std::result::Result<T, StoreError>>,
    ) -> std::result::Result<T, StoreError> {
        let backend = self.revenue_store.backend();
        let (result, outcome) = match tokio::time::timeout(STORE_TIMEOUT, call).await {
            Ok(Ok(value)) => (Ok(value), "ok"),
            Ok(Err(e)) => (Err(e), "error"),
            Err(_) => (
                Err(StoreError::Unavailable(format!(
                    "{} {} 超时（{}ms）",
                    backend,
                    operation,
                    STORE_TIMEOUT.as_millis()
                ))),
                "timeout",
            ),
        };
        metrics::record_store_operation(backend, operation, outcome);
        result
    }

    // ---------- 外部推送 ----------

    /// 记录外部推送的交易（如 webhook）
    ///
    /// 同一 `(source, externalId)` 重复推送时替换旧记录并返回 false。
    pub fn record_external_transaction(&self, transaction: Transaction) -> Result<bool> {
        let configured = self
            .find(transaction.source)
            .is_some_and(|p| p.client.is_configured());
        if !configured {
            return Err(CoreError::ProviderNotConfigured(transaction.source));
        }

        let mut buffer = self.ingested.lock();
        if let Some(existing) = buffer.iter_mut().find(|t| t.key() == transaction.key()) {
            debug!(
                provider = %transaction.source,
                external_id = %transaction.external_id,
                "推送交易已存在，更新记录"
            );
            *existing = transaction;
            return Ok(false);
        }

        info!(
            provider = %transaction.source,
            external_id = %transaction.external_id,
            amount = transaction.amount_minor_units,
            "记录推送交易"
        );
        buffer.push_back(transaction);
        while buffer.len() > self.config.ingest_buffer_size.max(1) {
            if let Some(evicted) = buffer.pop_front() {
                debug!(external_id = %evicted.external_id, "推送缓冲区已满，淘汰最旧的交易");
            }
        }
        Ok(true)
    }

    pub fn ingested_count(&self) -> usize {
        self.ingested.lock().len()
    }

    fn ingested_snapshot(&self) -> Vec<Transaction> {
        self.ingested.lock().iter().cloned().collect()
    }

    // ---------- 流量与核验 ----------

    /// 第一个已配置的分析类数据源的流量指标
    #[instrument(skip(self))]
    pub async fn traffic_metrics(&self) -> Option<TrafficMetrics> {
        let registered = self.providers.iter().find(|p| {
            p.id().kind() == ProviderKind::Analytics && p.client.is_configured()
        })?;
        let id = registered.id();

        let call_start = Instant::now();
        let result = match tokio::time::timeout(registered.timeout, registered.client.traffic_metrics()).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Unavailable(format!("{} 请求超时", id))),
        };
        let elapsed = call_start.elapsed().as_secs_f64();

        match result {
            Ok(traffic) => {
                metrics::record_provider_request(id.as_str(), "ok", elapsed);
                self.normalizer.observe(&ProviderStatus::reachable(id, Utc::now()));
                traffic
            }
            Err(e) => {
                metrics::record_provider_request(id.as_str(), e.outcome_label(), elapsed);
                warn!(provider = %id, error = %e, "流量指标获取失败");
                self.normalizer
                    .observe(&ProviderStatus::unreachable(id, Utc::now(), &e));
                None
            }
        }
    }

    /// 通过 Paystack 核验支付流水号，成功的交易同时写入推送缓冲区
    #[instrument(skip(self))]
    pub async fn verify_payment(
        &self,
        reference: &str,
    ) -> std::result::Result<Option<Transaction>, ProviderError> {
        let registered = self
            .find(ProviderId::Paystack)
            .filter(|p| p.client.is_configured())
            .ok_or(ProviderError::NotConfigured(ProviderId::Paystack))?;

        let call_start = Instant::now();
        let result = match tokio::time::timeout(
            registered.timeout,
            registered.client.verify_transaction(reference),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Unavailable("paystack 核验超时".to_string())),
        };
        let outcome = result.as_ref().err().map_or("ok", |e| e.outcome_label());
        metrics::record_provider_request("paystack", outcome, call_start.elapsed().as_secs_f64());

        let transaction = result?;
        if let Some(tx) = transaction.as_ref().filter(|tx| tx.is_revenue()) {
            if let Err(e) = self.record_external_transaction(tx.clone()) {
                warn!(error = %e, "核验成功的交易写入缓冲区失败");
            }
        }
        Ok(transaction)
    }

    // ---------- 内部：扇出 ----------

    /// 并发拉取所有参与收入的数据源，结果按注册顺序返回
    async fn fan_out(&self, operation: &str, limit: usize) -> Vec<ProviderOutcome> {
        let calls = self.providers.iter().map(|registered| {
            let client = registered.client.clone();
            let timeout = registered.timeout;
            let policy = self.retry_policy.clone();
            async move {
                let id = client.id();
                if !client.is_configured() {
                    return ProviderOutcome {
                        id,
                        checked_at: Utc::now(),
                        outcome: Outcome::NotConfigured,
                    };
                }
                if !id.kind().contributes_revenue() {
                    return ProviderOutcome {
                        id,
                        checked_at: Utc::now(),
                        outcome: Outcome::Skipped,
                    };
                }

                let call_start = Instant::now();
                let op_name = format!("{}:{}", operation, id);
                let fetch = retry_with_policy(&policy, &op_name, ProviderError::is_retryable, || {
                    client.fetch_transactions(limit)
                });

                let result = match tokio::time::timeout(timeout, fetch).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Unavailable(format!(
                        "{} 请求超时（{}ms）",
                        id,
                        timeout.as_millis()
                    ))),
                };
                let elapsed = call_start.elapsed().as_secs_f64();

                let outcome = match result {
                    Ok(txs) => {
                        metrics::record_provider_request(id.as_str(), "ok", elapsed);
                        debug!(provider = %id, count = txs.len(), "数据源拉取成功");
                        Outcome::Fetched(txs)
                    }
                    Err(e) => {
                        metrics::record_provider_request(id.as_str(), e.outcome_label(), elapsed);
                        warn!(provider = %id, error = %e, "数据源拉取失败，按 0 计入");
                        Outcome::Failed(e)
                    }
                };

                ProviderOutcome {
                    id,
                    checked_at: Utc::now(),
                    outcome,
                }
            }
        });

        join_all(calls).await
    }

    fn count_configured(&self, outcomes: &[ProviderOutcome]) -> usize {
        outcomes
            .iter()
            .filter(|o| !matches!(o.outcome, Outcome::NotConfigured))
            .count()
    }

    fn health_map(&self, outcomes: &[ProviderOutcome]) -> BTreeMap<ProviderId, ProviderHealth> {
        outcomes
            .iter()
            .map(|o| {
                let raw = o.raw_status();
                let status = self.normalizer.observe(&raw);
                (o.id, ProviderHealth { status, raw })
            })
            .collect()
    }

    /// 拉取结果与推送缓冲区按 `(source, externalId)` 去重合并，拉取结果优先
    fn merge_with_ingested(&self, outcomes: &[ProviderOutcome]) -> Vec<Transaction> {
        let mut merged: Vec<Transaction> = outcomes
            .iter()
            .flat_map(|o| o.transactions().iter().cloned())
            .collect();

        let configured: HashSet<ProviderId> = outcomes
            .iter()
            .filter(|o| !matches!(o.outcome, Outcome::NotConfigured))
            .map(|o| o.id)
            .collect();
        let seen: HashSet<(ProviderId, String)> = merged
            .iter()
            .map(|tx| (tx.source, tx.external_id.clone()))
            .collect();

        for tx in self.ingested_snapshot() {
            if configured.contains(&tx.source)
                && !seen.contains(&(tx.source, tx.external_id.clone()))
            {
                merged.push(tx);
            }
        }
        merged
    }

    // ---------- 内部：通知 ----------

    async fn evaluate_milestones(&self, summary: &RevenueSummary, period: ReportPeriod) {
        let now = Utc::now();
        for (provider, amount) in &summary.by_provider {
            for threshold in &self.config.milestone_thresholds {
                if amount < threshold {
                    break;
                }

                let key = MilestoneKey {
                    source: *provider,
                    period_start: period.start.date_naive(),
                    threshold_minor_units: *threshold,
                };
                if !self.state_store.claim_milestone(&key).await {
                    continue;
                }

                info!(provider = %provider, amount, threshold, "收入跨过里程碑");
                self.notifier.on_milestone(&MilestoneEvent {
                    amount_minor_units: *amount,
                    threshold_minor_units: *threshold,
                    currency: summary.currency.clone(),
                    source: *provider,
                    timestamp: now,
                });
            }
        }
    }

    async fn emit_daily_report(&self, summary: &RevenueSummary, transactions: &[Transaction]) {
        let today = Utc::now().date_naive();
        if self.state_store.last_daily_report().await == Some(today) {
            return;
        }

        let todays: Vec<&Transaction> = transactions
            .iter()
            .filter(|tx| tx.is_revenue())
            .filter(|tx| tx.currency == self.reporting_currency)
            .filter(|tx| tx.occurred_at.date_naive() == today)
            .collect();

        if !self.state_store.claim_daily_report(today).await {
            return;
        }

        let report = DailyReport {
            date: today,
            currency: summary.currency.clone(),
            total_minor_units: summary.total_minor_units,
            today_minor_units: todays
                .iter()
                .fold(0_i64, |acc, tx| acc.saturating_add(tx.amount_minor_units)),
            today_transaction_count: todays.len(),
        };
        info!(date = %today, today = report.today_minor_units, "发送每日报告");
        self.notifier.on_daily_report(&report);
    }
}

fn transaction_event(client: &dyn ProviderClient, tx: &Transaction) -> ActivityEvent {
    let kind = match tx.source.kind() {
        ProviderKind::Affiliate => ActivityKind::Affiliate,
        _ => ActivityKind::Revenue,
    };
    ActivityEvent {
        id: format!("{}-{}", tx.source, tx.external_id),
        source: tx.source,
        kind,
        message: client.describe(tx),
        timestamp: tx.occurred_at,
        amount_minor_units: Some(tx.amount_minor_units),
    }
}

fn system_event(id: ProviderId, at: DateTime<Utc>, err: &ProviderError) -> ActivityEvent {
    let reason = match err {
        ProviderError::Unauthorized(_) => "credentials were rejected",
        ProviderError::Unavailable(_) => "is unreachable",
        ProviderError::MalformedResponse(_) => "returned an unexpected response",
        ProviderError::NotConfigured(_) => "is not configured",
    };
    ActivityEvent {
        id: format!("system-{}", id),
        source: id,
        kind: ActivityKind::System,
        message: format!("{} {}; data may be incomplete", id.display_name(), reason),
        timestamp: at,
        amount_minor_units: None,
    }
}

fn failure_label(kind: crate::models::FailureKind) -> &'static str {
    use crate::models::FailureKind;
    match kind {
        FailureKind::Unavailable => "unavailable",
        FailureKind::Unauthorized => "unauthorized",
        FailureKind::MalformedResponse => "malformed",
        FailureKind::NotConfigured => "not_configured",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::MockRevenueNotifier;
    use crate::providers::MockProviderClient;
    use crate::revenue_store::MockRevenueStore;
    use crate::state_store::MockReportStateStore;
    use crate::models::TransactionStatus;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    fn tx(source: ProviderId, id: &str, amount: i64, at: DateTime<Utc>) -> Transaction {
        Transaction::new(source, id, amount, "NGN", TransactionStatus::Succeeded, at).unwrap()
    }

    fn mock_provider(id: ProviderId, txs: Vec<Transaction>) -> RegisteredProvider {
        let mut mock = MockProviderClient::new();
        mock.expect_id().return_const(id);
        mock.expect_is_configured().return_const(true);
        mock.expect_fetch_transactions()
            .returning(move |_| Ok(txs.clone()));
        mock.expect_describe()
            .returning(|tx| format!("{} {}", tx.source, tx.external_id));
        RegisteredProvider::new(Arc::new(mock), Duration::from_millis(500))
    }

    fn aggregator(providers: Vec<RegisteredProvider>) -> Aggregator {
        Aggregator::new(providers, AggregatorConfig::default())
            .unwrap()
            .with_retry_policy(RetryPolicy::none())
    }

    #[tokio::test]
    async fn test_milestone_notifies_once_per_period() {
        let now = Utc::now();
        let provider = mock_provider(
            ProviderId::Paystack,
            vec![tx(ProviderId::Paystack, "big", 12_000_000, now)],
        );

        let mut notifier = MockRevenueNotifier::new();
        notifier
            .expect_on_milestone()
            .withf(|e| e.threshold_minor_units == 10_000_000 && e.source == ProviderId::Paystack)
            .times(1)
            .return_const(());
        notifier.expect_on_daily_report().times(1).return_const(());

        let agg = aggregator(vec![provider]).with_notifier(Arc::new(notifier));
        let period = ReportPeriod::new(now - ChronoDuration::hours(1), now + ChronoDuration::hours(1)).unwrap();

        agg.get_revenue_summary(period).await;
        agg.get_revenue_summary(period).await;
    }

    #[tokio::test]
    async fn test_daily_report_skipped_when_already_sent() {
        let now = Utc::now();
        let provider = mock_provider(ProviderId::Stripe, vec![]);

        let mut store = MockReportStateStore::new();
        store
            .expect_last_daily_report()
            .returning(move || Some(now.date_naive()));
        store.expect_claim_daily_report().never();
        store.expect_claim_milestone().never();

        let mut notifier = MockRevenueNotifier::new();
        notifier.expect_on_daily_report().never();
        notifier.expect_on_milestone().never();

        let agg = aggregator(vec![provider])
            .with_notifier(Arc::new(notifier))
            .with_state_store(Arc::new(store));
        let period = ReportPeriod::last_days(now, 1).unwrap();
        agg.get_revenue_summary(period).await;
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let mut mock = MockProviderClient::new();
        mock.expect_id().return_const(ProviderId::Stripe);
        mock.expect_is_configured().return_const(true);
        mock.expect_fetch_transactions()
            .times(1)
            .returning(|_| Err(ProviderError::Unauthorized("revoked".into())));

        let agg = Aggregator::new(
            vec![RegisteredProvider::new(Arc::new(mock), Duration::from_secs(1))],
            AggregatorConfig::default(),
        )
        .unwrap()
        .with_retry_policy(RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 1.0,
        });

        let report = agg.get_revenue_summary(ReportPeriod::last_days(Utc::now(), 30).unwrap()).await;
        assert_eq!(report.summary.total_minor_units, 0);
        assert_eq!(
            report.providers[&ProviderId::Stripe].status,
            NormalizedStatus::Offline
        );
    }

    #[tokio::test]
    async fn test_unavailable_is_retried_within_bound() {
        let mut mock = MockProviderClient::new();
        mock.expect_id().return_const(ProviderId::Stripe);
        mock.expect_is_configured().return_const(true);
        mock.expect_fetch_transactions()
            .times(2)
            .returning(|_| Err(ProviderError::Unavailable("503".into())));

        let agg = Aggregator::new(
            vec![RegisteredProvider::new(Arc::new(mock), Duration::from_secs(1))],
            AggregatorConfig::default(),
        )
        .unwrap()
        .with_retry_policy(RetryPolicy {
            max_retries: 1,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 1.0,
        });

        agg.get_revenue_summary(ReportPeriod::last_days(Utc::now(), 30).unwrap()).await;
    }

    fn month_report_store(expected_saves: usize) -> MockRevenueStore {
        let mut store = MockRevenueStore::new();
        store.expect_backend().return_const("mock");
        store
            .expect_save()
            .withf(|records| {
                records.len() == 1
                    && records[0].source == ProviderId::Paystack
                    && records[0].amount_minor_units == 750
            })
            .times(expected_saves)
            .returning(|_| Ok(()));
        store
    }

    #[tokio::test]
    async fn test_month_with_revenue_is_persisted() {
        let now = Utc::now();
        let provider = mock_provider(
            ProviderId::Paystack,
            vec![tx(ProviderId::Paystack, "a", 500, now), tx(ProviderId::Paystack, "b", 250, now)],
        );
        let agg = aggregator(vec![provider]).with_revenue_store(Arc::new(month_report_store(1)));

        let report = agg
            .get_revenue_summary(ReportPeriod::current_month(now).unwrap())
            .await;
        assert_eq!(report.summary.total_minor_units, 750);
    }

    #[tokio::test]
    async fn test_zero_revenue_and_rolling_periods_are_not_persisted() {
        let now = Utc::now();
        let empty = aggregator(vec![mock_provider(ProviderId::Paystack, vec![])])
            .with_revenue_store(Arc::new(month_report_store(0)));
        empty
            .get_revenue_summary(ReportPeriod::current_month(now).unwrap())
            .await;

        let rolling = aggregator(vec![mock_provider(
            ProviderId::Paystack,
            vec![tx(ProviderId::Paystack, "a", 750, now - ChronoDuration::minutes(1))],
        )])
        .with_revenue_store(Arc::new(month_report_store(0)));
        rolling
            .get_revenue_summary(ReportPeriod::last_days(now, 7).unwrap())
            .await;
    }

    #[tokio::test]
    async fn test_store_failure_does_not_fail_summary() {
        let now = Utc::now();
        let mut store = MockRevenueStore::new();
        store.expect_backend().return_const("mock");
        store
            .expect_save()
            .times(1)
            .returning(|_| Err(StoreError::Unavailable("connection refused".into())));
        store
            .expect_health_check()
            .returning(|| Err(StoreError::Unavailable("connection refused".into())));

        let agg = aggregator(vec![mock_provider(
            ProviderId::Paystack,
            vec![tx(ProviderId::Paystack, "a", 750, now)],
        )])
        .with_revenue_store(Arc::new(store));

        let report = agg
            .get_revenue_summary(ReportPeriod::current_month(now).unwrap())
            .await;
        assert_eq!(report.summary.total_minor_units, 750);
        assert!(agg.check_revenue_store().await.is_err());
    }

    #[tokio::test]
    async fn test_revenue_history_reads_back_snapshots() {
        let now = Utc::now();
        let agg = aggregator(vec![mock_provider(
            ProviderId::Paystack,
            vec![tx(ProviderId::Paystack, "a", 750, now)],
        )]);

        agg.get_revenue_summary(ReportPeriod::current_month(now).unwrap())
            .await;
        agg.get_revenue_summary(ReportPeriod::current_month(now).unwrap())
            .await;

        let history = agg.revenue_history(30, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].amount_minor_units, 750);
        assert_eq!(agg.revenue_store_backend(), "memory");
        assert!(agg.check_revenue_store().await.is_ok());
    }

    #[test]
    fn test_invalid_reporting_currency_is_rejected() {
        let config = AggregatorConfig {
            reporting_currency: "naira".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            Aggregator::new(vec![], config),
            Err(CoreError::InvalidCurrency(_))
        ));
    }

    #[test]
    fn test_thresholds_are_sorted_and_deduplicated() {
        let config = AggregatorConfig {
            milestone_thresholds: vec![500, 0, 100, 500],
            ..Default::default()
        };
        let agg = Aggregator::new(vec![], config).unwrap();
        assert_eq!(agg.config().milestone_thresholds, vec![100, 500]);
    }

    #[test]
    fn test_system_event_message() {
        let event = system_event(
            ProviderId::Shopify,
            Utc::now(),
            &ProviderError::MalformedResponse("x".into()),
        );
        assert_eq!(event.id, "system-shopify");
        assert_eq!(event.kind, ActivityKind::System);
        assert_eq!(
            event.message,
            "Shopify returned an unexpected response; data may be incomplete"
        );
    }
}
