//! 收入汇总与动态流 API 处理器
//!
//! 汇总和动态流每次都重新向数据源拉取，数据源失败只体现在 `providers` 状态里，接口本身始终返回 200。
//! 快照历史只读存储，不访问数据源。

use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;
use revenue_core::{ActivityFeed, RevenueReport};
use tracing::instrument;
use validator::Validate;

use crate::{
    dto::{ActivityQuery, ApiResponse, RevenueHistoryQuery, RevenueHistoryResponse, RevenueQuery},
    error::Result,
    state::AppState,
};

/// 收入汇总
///
/// GET /api/revenue?period=month|7d|30d
/// GET /api/revenue?from=...&to=...
#[instrument(skip(state))]
pub async fn get_revenue(
    State(state): State<AppState>,
    Query(query): Query<RevenueQuery>,
) -> Result<Json<ApiResponse<RevenueReport>>> {
    let period = query.resolve(Utc::now())?;
    let report = state.aggregator.get_revenue_summary(period).await;
    Ok(Json(ApiResponse::success(report)))
}

/// 已存储的自然月收入快照
///
/// GET /api/revenue/history?days=30&limit=100
#[instrument(skip(state))]
pub async fn get_revenue_history(
    State(state): State<AppState>,
    Query(query): Query<RevenueHistoryQuery>,
) -> Result<Json<ApiResponse<RevenueHistoryResponse>>> {
    query.validate()?;

    let records = state
        .aggregator
        .revenue_history(
            query.days.unwrap_or(RevenueHistoryQuery::DEFAULT_DAYS),
            query.limit.unwrap_or(RevenueHistoryQuery::DEFAULT_LIMIT),
        )
        .await?;
    Ok(Json(ApiResponse::success(RevenueHistoryResponse {
        backend: state.aggregator.revenue_store_backend(),
        records,
    })))
}

/// 最新动态
///
/// GET /api/activities?limit=10
///
/// 未指定 limit 时使用配置的默认条数，超过上限时截断到上限。
#[instrument(skip(state))]
pub async fn get_activities(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<ApiResponse<ActivityFeed>>> {
    query.validate()?;

    let limit = query
        .limit
        .unwrap_or(state.aggregator.config().default_activity_limit);
    let feed = state.aggregator.get_activity_feed(limit).await;
    Ok(Json(ApiResponse::success(feed)))
}
