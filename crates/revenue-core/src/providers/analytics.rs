//! Google Analytics 流量统计
//!
//! 不产生收入，`fetch_transactions` 恒为空；健康检查和流量指标使用同一个 batchGet 调用。

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use super::ProviderClient;
use super::http;
use crate::error::ProviderError;
use crate::models::{ProviderId, ProviderStatus, TrafficMetrics, Transaction};

pub const DEFAULT_BASE_URL: &str = "https://analyticsreporting.googleapis.com";

#[derive(Debug, Deserialize)]
struct BatchGetResponse {
    #[serde(default)]
    reports: Vec<Report>,
}

#[derive(Debug, Deserialize)]
struct Report {
    #[serde(default)]
    data: Option<ReportData>,
}

#[derive(Debug, Deserialize)]
struct ReportData {
    #[serde(default)]
    totals: Vec<DateRangeValues>,
}

#[derive(Debug, Deserialize)]
struct DateRangeValues {
    #[serde(default)]
    values: Vec<String>,
}

pub struct GoogleAnalyticsClient {
    http: Client,
    api_key: Option<String>,
    view_id: Option<String>,
    base_url: String,
}

impl GoogleAnalyticsClient {
    pub fn new(
        http: Client,
        api_key: Option<String>,
        view_id: Option<String>,
        base_url: Option<String>,
    ) -> Self {
        Self {
            http,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            view_id: view_id.filter(|v| !v.trim().is_empty()),
            base_url: http::trim_base(base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)),
        }
    }

    /// 取第一个报表的 totals：values[0] 为 sessions，values[1] 为 users；缺失按 0 处理
    fn parse_metrics(body: BatchGetResponse) -> Result<TrafficMetrics, ProviderError> {
        let values = body
            .reports
            .into_iter()
            .next()
            .and_then(|r| r.data)
            .and_then(|d| d.totals.into_iter().next())
            .map(|t| t.values)
            .unwrap_or_default();

        let parse = |index: usize, name: &str| -> Result<u64, ProviderError> {
            match values.get(index) {
                None => Ok(0),
                Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                    ProviderError::MalformedResponse(format!(
                        "google_analytics 指标 {} 不是整数: {}",
                        name, raw
                    ))
                }),
            }
        };

        Ok(TrafficMetrics::new(parse(0, "sessions")?, parse(1, "users")?))
    }

    async fn batch_get(&self) -> Result<TrafficMetrics, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured(ProviderId::GoogleAnalytics))?;
        let view_id = self
            .view_id
            .as_deref()
            .ok_or(ProviderError::NotConfigured(ProviderId::GoogleAnalytics))?;

        let body = json!({
            "reportRequests": [{
                "viewId": view_id,
                "dateRanges": [{ "startDate": "30daysAgo", "endDate": "today" }],
                "metrics": [{ "expression": "ga:sessions" }, { "expression": "ga:users" }]
            }]
        });

        let request = self
            .http
            .post(format!("{}/v4/reports:batchGet", self.base_url))
            .bearer_auth(key)
            .json(&body);

        let response: BatchGetResponse = http::send_json(ProviderId::GoogleAnalytics, request).await?;
        Self::parse_metrics(response)
    }
}

#[async_trait]
impl ProviderClient for GoogleAnalyticsClient {
    fn id(&self) -> ProviderId {
        ProviderId::GoogleAnalytics
    }

    /// 缺少 viewId 的请求必然被拒绝，需要两者都配置
    fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.view_id.is_some()
    }

    async fn fetch_transactions(&self, _limit: usize) -> Result<Vec<Transaction>, ProviderError> {
        Ok(Vec::new())
    }

    async fn check_health(&self) -> ProviderStatus {
        if !self.is_configured() {
            return ProviderStatus::not_configured(ProviderId::GoogleAnalytics);
        }
        match self.batch_get().await {
            Ok(_) => ProviderStatus::reachable(ProviderId::GoogleAnalytics, Utc::now()),
            Err(e) => ProviderStatus::unreachable(ProviderId::GoogleAnalytics, Utc::now(), &e),
        }
    }

    #[instrument(skip(self))]
    async fn traffic_metrics(&self) -> Result<Option<TrafficMetrics>, ProviderError> {
        let metrics = self.batch_get().await?;
        debug!(sessions = metrics.sessions, users = metrics.users, "流量指标拉取完成");
        Ok(Some(metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(value: serde_json::Value) -> Result<TrafficMetrics, ProviderError> {
        GoogleAnalyticsClient::parse_metrics(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn test_parse_metrics() {
        let metrics = parse(json!({
            "reports": [{ "data": { "totals": [{ "values": ["1500", "1000"] }] } }]
        }))
        .unwrap();
        assert_eq!(metrics.sessions, 1500);
        assert_eq!(metrics.users, 1000);
        assert_eq!(metrics.conversion_rate, 150.0);
    }

    #[test]
    fn test_missing_values_default_to_zero() {
        let metrics = parse(json!({ "reports": [] })).unwrap();
        assert_eq!(metrics, TrafficMetrics::new(0, 0));
    }

    #[test]
    fn test_non_numeric_value_is_malformed() {
        let result = parse(json!({
            "reports": [{ "data": { "totals": [{ "values": ["many"] }] } }]
        }));
        assert!(matches!(result, Err(ProviderError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_contributes_no_transactions() {
        let client =
            GoogleAnalyticsClient::new(Client::new(), Some("k".into()), Some("123".into()), None);
        assert!(client.is_configured());
        assert!(client.fetch_transactions(50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_requires_view_id() {
        let client = GoogleAnalyticsClient::new(Client::new(), Some("k".into()), None, None);
        assert!(!client.is_configured());
        assert!(matches!(
            client.traffic_metrics().await,
            Err(ProviderError::NotConfigured(ProviderId::GoogleAnalytics))
        ));

        let blank = GoogleAnalyticsClient::new(Client::new(), Some("k".into()), Some(" ".into()), None);
        assert!(!blank.is_configured());
    }
}
