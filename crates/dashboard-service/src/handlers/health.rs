use axum::{Json, extract::State};
use tracing::warn;

use crate::state::AppState;

const SERVICE_NAME: &str = "revenue-dashboard-service";

/// 存活检查：服务进程正常即返回 ok
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": SERVICE_NAME
    }))
}

/// 就绪检查
///
/// 不访问外部数据源，只报告配置情况和快照存储连通性。
/// 没有任何已配置的数据源时为 `unconfigured`，存储不可用时为 `degraded`，两者都仍返回 200。
pub async fn readiness_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let aggregator = &state.aggregator;
    let configured = aggregator.configured_provider_count();

    let store = match aggregator.check_revenue_store().await {
        Ok(()) => serde_json::json!({
            "backend": aggregator.revenue_store_backend(),
            "status": "ok"
        }),
        Err(e) => {
            warn!(error = %e, "收入快照存储不可用");
            serde_json::json!({
                "backend": aggregator.revenue_store_backend(),
                "status": "error"
            })
        }
    };
    let store_ok = store["status"] == "ok";

    let status = match (configured > 0, store_ok) {
        (false, _) => "unconfigured",
        (true, false) => "degraded",
        (true, true) => "ok",
    };

    Json(serde_json::json!({
        "status": status,
        "service": SERVICE_NAME,
        "checks": {
            "registeredProviders": aggregator.provider_ids().len(),
            "configuredProviders": configured,
            "ingest": if state.ingest_key_hash.is_some() { "enabled" } else { "disabled" },
            "revenueStore": store
        }
    }))
}
