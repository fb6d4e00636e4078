//! Paystack 支付网关
//!
//! 金额本身就是最小单位（kobo），无需换算。

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::ProviderClient;
use super::http::{self, missing_field, parse_timestamp};
use crate::error::ProviderError;
use crate::models::{ProviderId, Transaction, TransactionStatus};

pub const DEFAULT_BASE_URL: &str = "https://api.paystack.co";
const DEFAULT_CURRENCY: &str = "NGN";
/// Paystack 单页上限
const MAX_PAGE_SIZE: usize = 200;

/// 流水号只允许字母数字和少量符号，避免拼接进 URL 路径时出现歧义
pub fn is_valid_reference(reference: &str) -> bool {
    !reference.is_empty()
        && reference.len() <= 100
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '='))
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct RawCustomer {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    id: Option<i64>,
    #[serde(default)]
    reference: Option<String>,
    amount: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default, alias = "paidAt")]
    paid_at: Option<String>,
    #[serde(default)]
    customer: Option<RawCustomer>,
}

pub struct PaystackClient {
    http: Client,
    secret_key: Option<String>,
    base_url: String,
}

impl PaystackClient {
    pub fn new(http: Client, secret_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            http,
            secret_key: secret_key.filter(|k| !k.trim().is_empty()),
            base_url: http::trim_base(base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)),
        }
    }

    fn secret(&self) -> Result<&str, ProviderError> {
        self.secret_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured(ProviderId::Paystack))
    }

    /// 业务层失败：`status: false`
    fn envelope_error(message: Option<String>) -> ProviderError {
        let message = message.unwrap_or_else(|| "status=false".to_string());
        if message.to_ascii_lowercase().contains("key") {
            ProviderError::Unauthorized(message)
        } else {
            ProviderError::MalformedResponse(message)
        }
    }

    fn map_status(raw: Option<&str>) -> TransactionStatus {
        match raw {
            Some("success") => TransactionStatus::Succeeded,
            Some("failed") | Some("abandoned") | Some("reversed") => TransactionStatus::Failed,
            _ => TransactionStatus::Pending,
        }
    }

    fn convert(raw: RawTransaction) -> Result<Transaction, ProviderError> {
        let provider = ProviderId::Paystack;
        let id = raw.id.ok_or_else(|| missing_field(provider, "id"))?;
        let amount = raw.amount.ok_or_else(|| missing_field(provider, "amount"))?;
        let status = Self::map_status(raw.status.as_deref());

        let timestamp = match status {
            TransactionStatus::Succeeded => raw.paid_at.as_deref().or(raw.created_at.as_deref()),
            _ => raw.created_at.as_deref().or(raw.paid_at.as_deref()),
        }
        .ok_or_else(|| missing_field(provider, "created_at"))?;
        let occurred_at = parse_timestamp(provider, "created_at", timestamp)?;

        let external_id = raw
            .reference
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| id.to_string());

        Transaction::new(
            provider,
            external_id,
            amount,
            raw.currency.as_deref().unwrap_or(DEFAULT_CURRENCY),
            status,
            occurred_at,
        )
        .map(|tx| tx.with_customer_ref(raw.customer.and_then(|c| c.email)))
        .map_err(|e| http::malformed(provider, e))
    }
}

#[async_trait]
impl ProviderClient for PaystackClient {
    fn id(&self) -> ProviderId {
        ProviderId::Paystack
    }

    fn is_configured(&self) -> bool {
        self.secret_key.is_some()
    }

    #[instrument(skip(self), fields(provider = "paystack"))]
    async fn fetch_transactions(&self, limit: usize) -> Result<Vec<Transaction>, ProviderError> {
        let secret = self.secret()?;
        let per_page = limit.clamp(1, MAX_PAGE_SIZE);

        let request = self
            .http
            .get(format!("{}/transaction", self.base_url))
            .bearer_auth(secret)
            .query(&[("perPage", per_page)]);

        let envelope: Envelope<Vec<RawTransaction>> =
            http::send_json(ProviderId::Paystack, request).await?;
        if !envelope.status {
            return Err(Self::envelope_error(envelope.message));
        }

        let raw = envelope.data.ok_or_else(|| missing_field(ProviderId::Paystack, "data"))?;
        let transactions = raw
            .into_iter()
            .take(per_page)
            .map(Self::convert)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(count = transactions.len(), "Paystack 交易拉取完成");
        Ok(transactions)
    }

    #[instrument(skip(self), fields(provider = "paystack"))]
    async fn verify_transaction(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, ProviderError> {
        let secret = self.secret()?;
        if !is_valid_reference(reference) {
            return Ok(None);
        }

        let request = self
            .http
            .get(format!("{}/transaction/verify/{}", self.base_url, reference))
            .bearer_auth(secret);

        let response = http::execute(ProviderId::Paystack, request).await?;
        // 流水号不存在时 Paystack 返回 400 或 404
        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST) {
            return Ok(None);
        }
        http::check_status(ProviderId::Paystack, response.status())?;

        let envelope: Envelope<RawTransaction> =
            http::read_json(ProviderId::Paystack, response).await?;
        if !envelope.status {
            return Err(Self::envelope_error(envelope.message));
        }

        envelope.data.map(Self::convert).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(status: &str) -> RawTransaction {
        RawTransaction {
            id: Some(42),
            reference: Some("ref_42".to_string()),
            amount: Some(50_000),
            currency: Some("NGN".to_string()),
            status: Some(status.to_string()),
            created_at: Some("2024-01-15T10:00:00.000Z".to_string()),
            paid_at: Some("2024-01-15T10:05:00.000Z".to_string()),
            customer: Some(RawCustomer {
                email: Some("ada@example.com".to_string()),
            }),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(PaystackClient::map_status(Some("success")), TransactionStatus::Succeeded);
        assert_eq!(PaystackClient::map_status(Some("abandoned")), TransactionStatus::Failed);
        assert_eq!(PaystackClient::map_status(Some("reversed")), TransactionStatus::Failed);
        assert_eq!(PaystackClient::map_status(Some("ongoing")), TransactionStatus::Pending);
        assert_eq!(PaystackClient::map_status(None), TransactionStatus::Pending);
    }

    #[test]
    fn test_convert_uses_paid_at_for_success() {
        let tx = PaystackClient::convert(raw("success")).unwrap();
        assert_eq!(tx.external_id, "ref_42");
        assert_eq!(tx.amount_minor_units, 50_000);
        assert_eq!(tx.customer_ref.as_deref(), Some("ada@example.com"));
        assert_eq!(tx.occurred_at.to_rfc3339(), "2024-01-15T10:05:00+00:00");

        let tx = PaystackClient::convert(raw("failed")).unwrap();
        assert_eq!(tx.occurred_at.to_rfc3339(), "2024-01-15T10:00:00+00:00");
    }

    #[test]
    fn test_convert_rejects_missing_amount() {
        let mut r = raw("success");
        r.amount = None;
        assert!(matches!(
            PaystackClient::convert(r),
            Err(ProviderError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_convert_rejects_negative_amount() {
        let mut r = raw("success");
        r.amount = Some(-100);
        assert!(matches!(
            PaystackClient::convert(r),
            Err(ProviderError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_envelope_error() {
        assert!(matches!(
            PaystackClient::envelope_error(Some("Invalid key".into())),
            ProviderError::Unauthorized(_)
        ));
        assert!(matches!(
            PaystackClient::envelope_error(None),
            ProviderError::MalformedResponse(_)
        ));
    }

    #[test]
    fn test_reference_validation() {
        assert!(is_valid_reference("T1234_abc-9.0"));
        assert!(!is_valid_reference(""));
        assert!(!is_valid_reference("../admin"));
        assert!(!is_valid_reference("a b"));
    }

    #[test]
    fn test_blank_key_is_not_configured() {
        let client = PaystackClient::new(Client::new(), Some("  ".to_string()), None);
        assert!(!client.is_configured());
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
    }
}
