use axum::{Json, extract::State};
use revenue_core::StatusReport;
use tracing::instrument;

use crate::{dto::ApiResponse, state::AppState};

/// 数据源状态
///
/// GET /api/status
#[instrument(skip(state))]
pub async fn get_status(State(state): State<AppState>) -> Json<ApiResponse<StatusReport>> {
    Json(ApiResponse::success(state.aggregator.get_status().await))
}
