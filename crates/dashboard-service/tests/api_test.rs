//! 看板 HTTP API 测试
//!
//! 使用数据源桩构造聚合器，通过 `tower::ServiceExt::oneshot` 直接驱动路由。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Utc};
use revenue_core::test_utils::{StubProvider, succeeded};
use revenue_core::{
    Aggregator, ProviderError, ProviderId, RegisteredProvider, RevenueRecord, RevenueStore,
    StoreError, TrafficMetrics,
};
use revenue_dashboard::{routes, state::AppState};
use revenue_shared::config::AggregatorConfig;
use revenue_shared::retry::RetryPolicy;
use serde_json::{Value, json};
use tower::ServiceExt;

const API_KEY: &str = "ingest-secret";

fn provider(stub: StubProvider) -> RegisteredProvider {
    Arc::new(stub).registered(Duration::from_millis(500))
}

fn app_with(providers: Vec<RegisteredProvider>, api_key: Option<&str>) -> Router {
    let aggregator = Aggregator::new(providers, AggregatorConfig::default())
        .unwrap()
        .with_retry_policy(RetryPolicy::none());
    let state = AppState::new(Arc::new(aggregator)).with_ingest_api_key(api_key);
    routes::app(state)
}

/// 连接失败的快照存储
struct OfflineStore;

#[async_trait]
impl RevenueStore for OfflineStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn save(&self, _records: &[RevenueRecord]) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn recent(
        &self,
        _since: DateTime<Utc>,
        _limit: usize,
    ) -> Result<Vec<RevenueRecord>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

fn app_with_offline_store(providers: Vec<RegisteredProvider>) -> Router {
    let aggregator = Aggregator::new(providers, AggregatorConfig::default())
        .unwrap()
        .with_retry_policy(RetryPolicy::none())
        .with_revenue_store(Arc::new(OfflineStore));
    routes::app(AppState::new(Arc::new(aggregator)))
}

fn paystack_with_sales() -> RegisteredProvider {
    let now = Utc::now();
    provider(StubProvider::new(ProviderId::Paystack).with_transactions(vec![
        succeeded(ProviderId::Paystack, "ref_1", 500_000, now),
        succeeded(ProviderId::Paystack, "ref_2", 250_000, now - chrono::Duration::minutes(5)),
    ]))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn ingest_body(external_id: &str, amount: i64) -> Value {
    json!({
        "source": "paystack",
        "externalId": external_id,
        "amountMinorUnits": amount,
        "currency": "NGN"
    })
}

// ==================== 健康检查 ====================

#[tokio::test]
async fn test_health_and_security_headers() {
    let response = app_with(vec![], None).oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_readiness_reports_unconfigured() {
    let app = app_with(
        vec![provider(StubProvider::unconfigured(ProviderId::Stripe))],
        None,
    );
    let (status, body) = send(app, get("/ready")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "unconfigured");
    assert_eq!(body["checks"]["registeredProviders"], 1);
    assert_eq!(body["checks"]["ingest"], "disabled");
    assert_eq!(body["checks"]["revenueStore"]["backend"], "memory");
    assert_eq!(body["checks"]["revenueStore"]["status"], "ok");
}

#[tokio::test]
async fn test_readiness_reports_store_outage() {
    let app = app_with_offline_store(vec![paystack_with_sales()]);
    let (status, body) = send(app, get("/ready")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"]["revenueStore"]["backend"], "postgres");
    assert_eq!(body["checks"]["revenueStore"]["status"], "error");
}

#[tokio::test]
async fn test_slow_request_times_out_with_408() {
    let app = Router::new()
        .route(
            "/slow",
            axum::routing::get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        )
        .route("/fast", axum::routing::get(|| async { "ok" }))
        .layer(routes::request_timeout(Duration::from_millis(50)));

    let slow = app
        .clone()
        .oneshot(Request::get("/slow").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(slow.status(), StatusCode::REQUEST_TIMEOUT);

    let fast = app
        .oneshot(Request::get("/fast").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(fast.status(), StatusCode::OK);
}

// ==================== 收入汇总 ====================

#[tokio::test]
async fn test_revenue_summary() {
    let app = app_with(vec![paystack_with_sales()], None);
    let (status, body) = send(app, get("/api/revenue?period=7d")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let data = &body["data"];
    assert_eq!(data["totalMinorUnits"], 750_000);
    assert_eq!(data["byProvider"]["paystack"], 750_000);
    assert_eq!(data["currency"], "NGN");
    assert_eq!(data["configuredProviderCount"], 1);
    assert_eq!(data["providers"]["paystack"]["status"], "online");
}

#[tokio::test]
async fn test_revenue_with_zero_providers_is_not_an_error() {
    let (status, body) = send(app_with(vec![], None), get("/api/revenue")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["configuredProviderCount"], 0);
    assert_eq!(body["data"]["totalMinorUnits"], 0);
}

#[tokio::test]
async fn test_failing_provider_still_returns_200() {
    let broken = provider(
        StubProvider::new(ProviderId::Stripe)
            .with_error(ProviderError::Unauthorized("revoked".into())),
    );
    let app = app_with(vec![paystack_with_sales(), broken], None);
    let (status, body) = send(app, get("/api/revenue")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalMinorUnits"], 750_000);
    assert_eq!(body["data"]["byProvider"]["stripe"], 0);
    assert_eq!(body["data"]["providers"]["stripe"]["status"], "offline");
}

#[tokio::test]
async fn test_invalid_period_is_rejected() {
    let (status, body) = send(app_with(vec![], None), get("/api/revenue?period=fortnight")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_unbounded_custom_range_is_rejected() {
    let app = app_with(vec![paystack_with_sales()], None);
    let (status, body) = send(
        app,
        get("/api/revenue?from=-200000-01-01T00:00:00Z&to=0001-01-01T00:00:00Z"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

// ==================== 快照历史 ====================

#[tokio::test]
async fn test_month_summary_is_stored_and_listed() {
    let app = app_with(vec![paystack_with_sales()], None);

    let (status, _) = send(app.clone(), get("/api/revenue?period=month")).await;
    assert_eq!(status, StatusCode::OK);
    // 滚动周期不写快照
    send(app.clone(), get("/api/revenue?period=7d")).await;

    let (status, body) = send(app, get("/api/revenue/history?days=7")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["backend"], "memory");
    let records = body["data"]["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["source"], "paystack");
    assert_eq!(records[0]["amountMinorUnits"], 750_000);
    assert_eq!(records[0]["currency"], "NGN");
}

#[tokio::test]
async fn test_history_validation_and_store_outage() {
    let (status, body) = send(
        app_with(vec![], None),
        get("/api/revenue/history?days=0"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    // 存储故障不影响实时汇总，只影响历史查询
    let app = app_with_offline_store(vec![paystack_with_sales()]);
    let (status, body) = send(app.clone(), get("/api/revenue")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalMinorUnits"], 750_000);

    let (status, body) = send(app, get("/api/revenue/history")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "STORE_UNAVAILABLE");
    assert!(!body["message"].as_str().unwrap().contains("connection refused"));
}

// ==================== 动态流 ====================

#[tokio::test]
async fn test_activity_feed() {
    let app = app_with(vec![paystack_with_sales()], None);
    let (status, body) = send(app, get("/api/activities?limit=1")).await;

    assert_eq!(status, StatusCode::OK);
    let events = body["data"]["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["id"], "paystack-ref_1");
    assert_eq!(events[0]["kind"], "revenue");
    assert_eq!(events[0]["message"], "Paystack: payment of ₦5,000.00 received");
}

#[tokio::test]
async fn test_activity_limit_must_be_positive() {
    let (status, _) = send(app_with(vec![], None), get("/api/activities?limit=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ==================== 状态与流量 ====================

#[tokio::test]
async fn test_status_endpoint() {
    let app = app_with(
        vec![
            paystack_with_sales(),
            provider(StubProvider::unconfigured(ProviderId::Shopify)),
        ],
        None,
    );
    let (status, body) = send(app, get("/api/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["overall"], "healthy");
    assert_eq!(body["data"]["providers"]["shopify"]["status"], "not_configured");
}

#[tokio::test]
async fn test_traffic_endpoint() {
    let (_, body) = send(app_with(vec![], None), get("/api/analytics/traffic")).await;
    assert_eq!(body["data"]["configured"], false);
    assert!(body["data"]["traffic"].is_null());

    let ga = provider(
        StubProvider::new(ProviderId::GoogleAnalytics).with_traffic(TrafficMetrics::new(50, 40)),
    );
    let (_, body) = send(app_with(vec![ga], None), get("/api/analytics/traffic")).await;
    assert_eq!(body["data"]["configured"], true);
    assert_eq!(body["data"]["traffic"]["sessions"], 50);
    assert_eq!(body["data"]["traffic"]["conversionRate"], 125.0);
}

// ==================== 支付核验 ====================

#[tokio::test]
async fn test_verify_payment() {
    let verified = succeeded(ProviderId::Paystack, "T100", 42_000, Utc::now());
    let paystack = provider(StubProvider::new(ProviderId::Paystack).with_verified(verified));
    let app = app_with(vec![paystack], None);

    let (status, body) = send(
        app.clone(),
        post_json("/api/payments/verify", json!({ "reference": "T100" }), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["verified"], true);
    assert_eq!(body["data"]["transaction"]["amountMinorUnits"], 42_000);

    // 核验成功的交易计入汇总
    let (_, body) = send(app.clone(), get("/api/revenue")).await;
    assert_eq!(body["data"]["totalMinorUnits"], 42_000);

    let (status, body) = send(
        app,
        post_json("/api/payments/verify", json!({ "reference": "T999" }), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["verified"], false);
}

#[tokio::test]
async fn test_verify_payment_validation() {
    let app = app_with(vec![paystack_with_sales()], None);

    let (status, _) = send(
        app.clone(),
        post_json("/api/payments/verify", json!({ "reference": "" }), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        app,
        post_json("/api/payments/verify", json!({ "reference": "a/b" }), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_verify_payment_without_paystack() {
    let stripe = provider(StubProvider::new(ProviderId::Stripe));
    let (status, body) = send(
        app_with(vec![stripe], None),
        post_json("/api/payments/verify", json!({ "reference": "T1" }), None),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "PROVIDER_NOT_CONFIGURED");
}

// ==================== 交易推送 ====================

#[tokio::test]
async fn test_ingest_disabled_without_api_key() {
    let app = app_with(vec![paystack_with_sales()], None);
    let (status, body) = send(
        app,
        post_json("/api/transactions", ingest_body("w1", 100), Some(API_KEY)),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "INGEST_DISABLED");
}

#[tokio::test]
async fn test_ingest_requires_valid_api_key() {
    let app = app_with(vec![paystack_with_sales()], Some(API_KEY));

    let (status, _) = send(
        app.clone(),
        post_json("/api/transactions", ingest_body("w1", 100), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        app,
        post_json("/api/transactions", ingest_body("w1", 100), Some("wrong")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_ingest_and_deduplicate() {
    let app = app_with(vec![paystack_with_sales()], Some(API_KEY));

    let (status, body) = send(
        app.clone(),
        post_json("/api/transactions", ingest_body("w1", 10_000), Some(API_KEY)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["duplicate"], false);

    let (status, body) = send(
        app.clone(),
        post_json("/api/transactions", ingest_body("w1", 10_000), Some(API_KEY)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["duplicate"], true);

    let (_, body) = send(app, get("/api/revenue")).await;
    assert_eq!(body["data"]["totalMinorUnits"], 760_000);
}

#[tokio::test]
async fn test_ingest_rejects_invalid_transactions() {
    let app = app_with(
        vec![
            paystack_with_sales(),
            provider(StubProvider::unconfigured(ProviderId::Stripe)),
        ],
        Some(API_KEY),
    );

    // 负数金额
    let (status, _) = send(
        app.clone(),
        post_json("/api/transactions", ingest_body("w2", -1), Some(API_KEY)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // 未配置的数据源
    let mut body = ingest_body("w3", 100);
    body["source"] = json!("stripe");
    let (status, resp) = send(
        app,
        post_json("/api/transactions", body, Some(API_KEY)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(resp["code"], "PROVIDER_NOT_CONFIGURED");
}

#[tokio::test]
async fn test_ingest_rejects_oversized_amount() {
    let app = app_with(vec![paystack_with_sales()], Some(API_KEY));

    for id in ["big_1", "big_2"] {
        let (status, body) = send(
            app.clone(),
            post_json("/api/transactions", ingest_body(id, i64::MAX), Some(API_KEY)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    let (status, body) = send(app, get("/api/revenue?period=7d")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalMinorUnits"], 750_000);
}
