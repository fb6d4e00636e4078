//! 数据源客户端
//!
//! 每个外部集成对应一个客户端，负责把原始响应转换成归一化的 [`Transaction`]。
//! 客户端边界之外只会看到 [`ProviderError`]，传输和解析错误不会以 panic 形式泄露。
//!
//! ## 已支持的数据源
//!
//! - **Paystack / Stripe**: 支付网关
//! - **Shopify**: 电商订单
//! - **Commission Junction / ClickBank / ShareASale**: 联盟佣金
//! - **Google Analytics**: 流量统计，不产生收入

mod affiliate;
mod analytics;
mod http;
mod paystack;
mod registry;
mod shopify;
mod stripe;

pub use affiliate::{AffiliateClient, AffiliateNetwork};
pub use analytics::GoogleAnalyticsClient;
pub use paystack::{PaystackClient, is_valid_reference};
pub use registry::{RegisteredProvider, build_providers, build_providers_with, credential_env_var};
pub use shopify::ShopifyClient;
pub use stripe::StripeClient;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::ProviderError;
use crate::models::{ProviderId, ProviderStatus, TrafficMetrics, Transaction, TransactionStatus};
use crate::money::format_amount;

/// 数据源客户端接口
///
/// 实现必须是无状态的（凭证只读），以便聚合器并发调用。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn id(&self) -> ProviderId;

    /// 只检查凭证是否存在，不发起网络请求
    fn is_configured(&self) -> bool;

    /// 拉取最近的交易，`limit` 为单次请求条数上限
    async fn fetch_transactions(&self, limit: usize) -> Result<Vec<Transaction>, ProviderError>;

    /// 一次最便宜的网络调用，结果映射为原始状态；本方法不会失败
    async fn check_health(&self) -> ProviderStatus {
        if !self.is_configured() {
            return ProviderStatus::not_configured(self.id());
        }

        match self.fetch_transactions(1).await {
            Ok(_) => ProviderStatus::reachable(self.id(), Utc::now()),
            Err(e) => ProviderStatus::unreachable(self.id(), Utc::now(), &e),
        }
    }

    /// 流量指标，只有分析类数据源返回 Some
    async fn traffic_metrics(&self) -> Result<Option<TrafficMetrics>, ProviderError> {
        Ok(None)
    }

    /// 按支付流水号核验交易，不支持的数据源返回 None
    async fn verify_transaction(
        &self,
        _reference: &str,
    ) -> Result<Option<Transaction>, ProviderError> {
        Ok(None)
    }

    /// 动态流文案
    fn describe(&self, transaction: &Transaction) -> String {
        describe_transaction(transaction)
    }
}

/// 默认动态文案
pub fn describe_transaction(transaction: &Transaction) -> String {
    let amount = format_amount(transaction.amount_minor_units, &transaction.currency);
    let name = transaction.source.display_name();
    let customer = transaction
        .customer_ref
        .as_deref()
        .map(|c| format!(" from {}", c))
        .unwrap_or_default();

    match transaction.status {
        TransactionStatus::Succeeded => format!("{}: payment of {} received{}", name, amount, customer),
        TransactionStatus::Pending => format!("{}: payment of {} pending{}", name, amount, customer),
        TransactionStatus::Failed => format!("{}: payment of {} failed{}", name, amount, customer),
    }
}
