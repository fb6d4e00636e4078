//! Stripe 支付

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::ProviderClient;
use super::http::{self, missing_field, parse_unix_seconds};
use crate::error::ProviderError;
use crate::models::{ProviderId, Transaction, TransactionStatus};

pub const DEFAULT_BASE_URL: &str = "https://api.stripe.com";
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct ChargeList {
    data: Option<Vec<RawCharge>>,
}

#[derive(Debug, Deserialize)]
struct RawCharge {
    id: Option<String>,
    amount: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    status: Option<String>,
    created: Option<i64>,
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    receipt_email: Option<String>,
}

pub struct StripeClient {
    http: Client,
    secret_key: Option<String>,
    base_url: String,
}

impl StripeClient {
    pub fn new(http: Client, secret_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            http,
            secret_key: secret_key.filter(|k| !k.trim().is_empty()),
            base_url: http::trim_base(base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)),
        }
    }

    fn convert(raw: RawCharge) -> Result<Transaction, ProviderError> {
        let provider = ProviderId::Stripe;
        let id = raw.id.ok_or_else(|| missing_field(provider, "id"))?;
        let amount = raw.amount.ok_or_else(|| missing_field(provider, "amount"))?;
        let currency = raw.currency.ok_or_else(|| missing_field(provider, "currency"))?;
        let created = raw.created.ok_or_else(|| missing_field(provider, "created"))?;

        let status = match raw.status.as_deref() {
            Some("succeeded") => TransactionStatus::Succeeded,
            Some("failed") => TransactionStatus::Failed,
            _ => TransactionStatus::Pending,
        };

        Transaction::new(
            provider,
            id,
            amount,
            &currency,
            status,
            parse_unix_seconds(provider, "created", created)?,
        )
        .map(|tx| tx.with_customer_ref(raw.receipt_email.or(raw.customer)))
        .map_err(|e| http::malformed(provider, e))
    }
}

#[async_trait]
impl ProviderClient for StripeClient {
    fn id(&self) -> ProviderId {
        ProviderId::Stripe
    }

    fn is_configured(&self) -> bool {
        self.secret_key.is_some()
    }

    #[instrument(skip(self), fields(provider = "stripe"))]
    async fn fetch_transactions(&self, limit: usize) -> Result<Vec<Transaction>, ProviderError> {
        let secret = self
            .secret_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured(ProviderId::Stripe))?;
        let limit = limit.clamp(1, MAX_PAGE_SIZE);

        let request = self
            .http
            .get(format!("{}/v1/charges", self.base_url))
            .bearer_auth(secret)
            .query(&[("limit", limit)]);

        let list: ChargeList = http::send_json(ProviderId::Stripe, request).await?;
        let charges = list.data.ok_or_else(|| missing_field(ProviderId::Stripe, "data"))?;

        let transactions = charges
            .into_iter()
            .take(limit)
            .map(Self::convert)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(count = transactions.len(), "Stripe 交易拉取完成");
        Ok(transactions)
    }
}
