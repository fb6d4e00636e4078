use axum::{Json, extract::State};
use revenue_core::ProviderKind;
use tracing::instrument;

use crate::{
    dto::{ApiResponse, TrafficResponse},
    state::AppState,
};

/// 流量指标
///
/// GET /api/analytics/traffic
///
/// 未配置分析类数据源或拉取失败时 `traffic` 为 null。
#[instrument(skip(state))]
pub async fn get_traffic(State(state): State<AppState>) -> Json<ApiResponse<TrafficResponse>> {
    let configured = state.aggregator.has_configured(ProviderKind::Analytics);
    let traffic = if configured {
        state.aggregator.traffic_metrics().await
    } else {
        None
    };

    Json(ApiResponse::success(TrafficResponse { configured, traffic }))
}
