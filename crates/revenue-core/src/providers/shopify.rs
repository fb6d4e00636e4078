//! Shopify 订单
//!
//! `total_price` 是主单位的小数字符串，在这里按币种精度换算为最小单位。

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::ProviderClient;
use super::http::{self, missing_field, parse_timestamp};
use crate::error::ProviderError;
use crate::models::{ProviderId, Transaction, TransactionStatus};
use crate::money;

const API_VERSION: &str = "2023-10";
const MAX_PAGE_SIZE: usize = 250;
const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

#[derive(Debug, Deserialize)]
struct OrderList {
    orders: Option<Vec<RawOrder>>,
}

#[derive(Debug, Deserialize)]
struct RawOrder {
    id: Option<serde_json::Value>,
    #[serde(default)]
    name: Option<String>,
    total_price: Option<serde_json::Value>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    financial_status: Option<String>,
    created_at: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

pub struct ShopifyClient {
    http: Client,
    access_token: Option<String>,
    store_url: Option<String>,
    default_currency: String,
}

impl ShopifyClient {
    /// `store_url` 形如 `https://my-shop.myshopify.com`，缺失时视为未配置
    pub fn new(
        http: Client,
        access_token: Option<String>,
        store_url: Option<String>,
        default_currency: Option<String>,
    ) -> Self {
        Self {
            http,
            access_token: access_token.filter(|t| !t.trim().is_empty()),
            store_url: store_url
                .filter(|u| !u.trim().is_empty())
                .map(|u| http::trim_base(&u)),
            default_currency: default_currency.unwrap_or_else(|| "USD".to_string()),
        }
    }

    fn map_status(raw: Option<&str>) -> TransactionStatus {
        match raw {
            Some("paid") => TransactionStatus::Succeeded,
            Some("voided") | Some("refunded") => TransactionStatus::Failed,
            _ => TransactionStatus::Pending,
        }
    }

    fn convert(&self, raw: RawOrder) -> Result<Transaction, ProviderError> {
        let provider = ProviderId::Shopify;
        let id = match raw.id {
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(serde_json::Value::String(s)) if !s.is_empty() => s,
            _ => return Err(missing_field(provider, "id")),
        };
        let currency = raw.currency.unwrap_or_else(|| self.default_currency.clone());
        let price = raw.total_price.ok_or_else(|| missing_field(provider, "total_price"))?;
        let amount =
            money::json_major_units(&price, &currency).map_err(|e| http::malformed(provider, e))?;
        let created_at = raw
            .created_at
            .ok_or_else(|| missing_field(provider, "created_at"))?;

        Transaction::new(
            provider,
            id,
            amount,
            &currency,
            Self::map_status(raw.financial_status.as_deref()),
            parse_timestamp(provider, "created_at", &created_at)?,
        )
        .map(|tx| tx.with_customer_ref(raw.email.or(raw.name)))
        .map_err(|e| http::malformed(provider, e))
    }
}

#[async_trait]
impl ProviderClient for ShopifyClient {
    fn id(&self) -> ProviderId {
        ProviderId::Shopify
    }

    fn is_configured(&self) -> bool {
        self.access_token.is_some() && self.store_url.is_some()
    }

    #[instrument(skip(self), fields(provider = "shopify"))]
    async fn fetch_transactions(&self, limit: usize) -> Result<Vec<Transaction>, ProviderError> {
        let (Some(token), Some(store)) = (self.access_token.as_deref(), self.store_url.as_deref())
        else {
            return Err(ProviderError::NotConfigured(ProviderId::Shopify));
        };
        let limit = limit.clamp(1, MAX_PAGE_SIZE);

        let request = self
            .http
            .get(format!("{}/admin/api/{}/orders.json", store, API_VERSION))
            .header(ACCESS_TOKEN_HEADER, token)
            .query(&[("limit", limit.to_string()), ("status", "any".to_string())]);

        let list: OrderList = http::send_json(ProviderId::Shopify, request).await?;
        let orders = list.orders.ok_or_else(|| missing_field(ProviderId::Shopify, "orders"))?;

        let transactions = orders
            .into_iter()
            .take(limit)
            .map(|order| self.convert(order))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(count = transactions.len(), "Shopify 订单拉取完成");
        Ok(transactions)
    }
}
