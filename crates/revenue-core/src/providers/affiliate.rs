//! 联盟营销网络
//!
//! CJ 和 ShareASale 只返回佣金总额，每次拉取折算成一笔当天的成功交易；
//! ClickBank 返回订单列表，每个订单对应一笔交易。金额为主单位数字。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::ProviderClient;
use super::http::{self, parse_timestamp};
use crate::error::ProviderError;
use crate::models::{ProviderId, Transaction, TransactionStatus};
use crate::money::{self, format_amount};

/// 联盟网络
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffiliateNetwork {
    CommissionJunction,
    ClickBank,
    ShareASale,
}

impl AffiliateNetwork {
    pub fn provider_id(&self) -> ProviderId {
        match self {
            Self::CommissionJunction => ProviderId::CommissionJunction,
            Self::ClickBank => ProviderId::Clickbank,
            Self::ShareASale => ProviderId::Shareasale,
        }
    }

    pub fn from_provider(id: ProviderId) -> Option<Self> {
        match id {
            ProviderId::CommissionJunction => Some(Self::CommissionJunction),
            ProviderId::Clickbank => Some(Self::ClickBank),
            ProviderId::Shareasale => Some(Self::ShareASale),
            _ => None,
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Self::CommissionJunction => "https://commission-junction.com/api",
            Self::ClickBank => "https://api.clickbank.com",
            Self::ShareASale => "https://api.shareasale.com",
        }
    }

    /// 合成交易号前缀
    fn slug(&self) -> &'static str {
        match self {
            Self::CommissionJunction => "cj",
            Self::ClickBank => "clickbank",
            Self::ShareASale => "shareasale",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EarningsTotal {
    #[serde(default)]
    total_earnings: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClickBankOrders {
    #[serde(default)]
    order_data: Option<Vec<ClickBankOrder>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClickBankOrder {
    #[serde(default)]
    receipt: Option<String>,
    total_account_amount: Option<serde_json::Value>,
    #[serde(default)]
    transaction_time: Option<String>,
    #[serde(default)]
    transaction_type: Option<String>,
}

pub struct AffiliateClient {
    network: AffiliateNetwork,
    http: Client,
    api_key: Option<String>,
    base_url: String,
    currency: String,
}

impl AffiliateClient {
    pub fn new(
        network: AffiliateNetwork,
        http: Client,
        api_key: Option<String>,
        base_url: Option<String>,
        currency: Option<String>,
    ) -> Self {
        Self {
            network,
            http,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: http::trim_base(base_url.as_deref().unwrap_or(network.default_base_url())),
            currency: currency.unwrap_or_else(|| "USD".to_string()),
        }
    }

    fn amount(&self, value: &serde_json::Value) -> Result<i64, ProviderError> {
        money::json_major_units(value, &self.currency)
            .map_err(|e| http::malformed(self.network.provider_id(), e))
    }

    /// 佣金总额折算为一笔交易；总额为 0 时不产生交易
    fn earnings_transaction(
        &self,
        total: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, ProviderError> {
        let amount = match total {
            Some(value) => self.amount(&value)?,
            None => 0,
        };
        if amount == 0 {
            return Ok(Vec::new());
        }

        let external_id = format!("{}-earnings-{}", self.network.slug(), now.format("%Y-%m-%d"));
        let tx = Transaction::new(
            self.network.provider_id(),
            external_id,
            amount,
            &self.currency,
            TransactionStatus::Succeeded,
            now,
        )
        .map_err(|e| http::malformed(self.network.provider_id(), e))?;
        Ok(vec![tx])
    }

    fn clickbank_transactions(
        &self,
        orders: Vec<ClickBankOrder>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, ProviderError> {
        let provider = self.network.provider_id();
        orders
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(index, order)| {
                let amount = match order.total_account_amount {
                    Some(ref value) => self.amount(value)?,
                    None => 0,
                };
                let occurred_at = match order.transaction_time.as_deref() {
                    Some(raw) => parse_timestamp(provider, "transactionTime", raw)?,
                    None => now,
                };
                let status = match order.transaction_type.as_deref() {
                    Some("RFND") | Some("CGBK") => TransactionStatus::Failed,
                    _ => TransactionStatus::Succeeded,
                };
                let external_id = order
                    .receipt
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| format!("clickbank-{}-{}", now.format("%Y%m%d"), index));

                Transaction::new(provider, external_id, amount, &self.currency, status, occurred_at)
                    .map_err(|e| http::malformed(provider, e))
            })
            .collect()
    }
}

#[async_trait]
impl ProviderClient for AffiliateClient {
    fn id(&self) -> ProviderId {
        self.network.provider_id()
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip(self))]
    async fn fetch_transactions(&self, limit: usize) -> Result<Vec<Transaction>, ProviderError> {
        let provider = self.network.provider_id();
        let key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured(provider))?;
        let now = Utc::now();

        let transactions = match self.network {
            AffiliateNetwork::CommissionJunction => {
                let request = self
                    .http
                    .get(format!("{}/earnings", self.base_url))
                    .bearer_auth(key);
                let body: EarningsTotal = http::send_json(provider, request).await?;
                self.earnings_transaction(body.total_earnings, now)?
            }
            AffiliateNetwork::ClickBank => {
                let request = self
                    .http
                    .get(format!("{}/rest/1.3/orders", self.base_url))
                    .bearer_auth(key);
                let body: ClickBankOrders = http::send_json(provider, request).await?;
                self.clickbank_transactions(body.order_data.unwrap_or_default(), limit.max(1), now)?
            }
            AffiliateNetwork::ShareASale => {
                let request = self
                    .http
                    .get(format!("{}/w.cfm", self.base_url))
                    .query(&[("type", "earnings")])
                    .header("x-ShareASale-Date", now.format("%Y-%m-%d").to_string())
                    .header("x-ShareASale-Authentication", key);
                let body: EarningsTotal = http::send_json(provider, request).await?;
                self.earnings_transaction(body.total_earnings, now)?
            }
        };

        debug!(provider = %provider, count = transactions.len(), "联盟佣金拉取完成");
        Ok(transactions)
    }

    fn describe(&self, transaction: &Transaction) -> String {
        let amount = format_amount(transaction.amount_minor_units, &transaction.currency);
        match transaction.status {
            TransactionStatus::Failed => format!(
                "{}: commission of {} reversed",
                transaction.source.display_name(),
                amount
            ),
            _ => format!(
                "{}: commission of {} earned",
                transaction.source.display_name(),
                amount
            ),
        }
    }
}
