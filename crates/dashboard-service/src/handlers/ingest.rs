use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use tracing::instrument;
use validator::Validate;

use crate::{
    dto::{ApiResponse, IngestResponse, IngestTransactionRequest},
    error::Result,
    state::AppState,
};

/// 推送外部交易
///
/// POST /api/transactions（需要 X-API-Key）
///
/// 新交易返回 201；同一 `(source, externalId)` 重复推送时替换旧记录并返回 200。
#[instrument(skip(state, req), fields(source = %req.source, external_id = %req.external_id))]
pub async fn ingest_transaction(
    State(state): State<AppState>,
    Json(req): Json<IngestTransactionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<IngestResponse>>)> {
    req.validate()?;

    let transaction = req.into_transaction(Utc::now())?;
    let source = transaction.source;
    let external_id = transaction.external_id.clone();

    let inserted = state.aggregator.record_external_transaction(transaction)?;
    let status = if inserted {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(ApiResponse::success(IngestResponse {
            source,
            external_id,
            duplicate: !inserted,
        })),
    ))
}
