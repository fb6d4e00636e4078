use axum::{Json, extract::State};
use revenue_core::providers::is_valid_reference;
use tracing::{info, instrument};
use validator::Validate;

use crate::{
    dto::{ApiResponse, VerifyPaymentRequest, VerifyPaymentResponse},
    error::{ApiError, Result},
    state::AppState,
};

/// 核验支付
///
/// POST /api/payments/verify
///
/// 流水号在 Paystack 不存在时返回 `verified: false`；核验成功的交易会计入后续汇总。
#[instrument(skip(state, req), fields(reference = %req.reference))]
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(req): Json<VerifyPaymentRequest>,
) -> Result<Json<ApiResponse<VerifyPaymentResponse>>> {
    req.validate()?;
    let reference = req.reference.trim().to_string();
    if !is_valid_reference(&reference) {
        return Err(ApiError::Validation(format!("无效的支付流水号: {}", reference)));
    }

    let transaction = state.aggregator.verify_payment(&reference).await?;
    let verified = transaction.as_ref().is_some_and(|tx| tx.is_revenue());
    info!(verified, found = transaction.is_some(), "支付核验完成");

    Ok(Json(ApiResponse::success(VerifyPaymentResponse {
        reference,
        verified,
        transaction,
    })))
}
