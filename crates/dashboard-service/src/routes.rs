//! 路由配置模块

use std::time::Duration;

use axum::{
    Router,
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use revenue_shared::observability::middleware as obs_middleware;
use tower_http::timeout::TimeoutLayer;

use crate::{
    handlers,
    middleware::{api_key_auth_middleware, security_headers},
    state::AppState,
};

/// 看板 API 路由
///
/// 只有交易推送需要 API Key，其余接口供前端直接轮询。
pub fn api_routes(state: AppState) -> Router<AppState> {
    let ingest = Router::new()
        .route("/transactions", post(handlers::ingest::ingest_transaction))
        .route_layer(middleware::from_fn_with_state(state, api_key_auth_middleware));

    Router::new()
        .route("/revenue", get(handlers::revenue::get_revenue))
        .route("/revenue/history", get(handlers::revenue::get_revenue_history))
        .route("/activities", get(handlers::revenue::get_activities))
        .route("/status", get(handlers::status::get_status))
        .route("/analytics/traffic", get(handlers::analytics::get_traffic))
        .route("/payments/verify", post(handlers::payment::verify_payment))
        .merge(ingest)
}

/// 完整应用：API、健康检查以及可观测性中间件
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api", api_routes(state.clone()))
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}

/// 请求超时层，超时返回 408
pub fn request_timeout(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}
