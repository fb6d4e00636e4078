//! 看板服务错误类型定义

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use revenue_core::{CoreError, ProviderError};
use revenue_shared::observability::tracing::current_trace_id;
use serde_json::json;

/// 看板服务错误类型
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // 认证错误
    #[error("未授权: {0}")]
    Unauthorized(String),
    #[error("交易推送未启用")]
    IngestDisabled,

    // 验证错误
    #[error("参数验证失败: {0}")]
    Validation(String),

    // 业务错误
    #[error("数据源未配置: {0}")]
    ProviderNotConfigured(String),
    #[error("数据源暂时不可用: {0}")]
    ProviderUnavailable(String),
    #[error("收入快照存储不可用: {0}")]
    StoreUnavailable(String),

    // 系统错误
    #[error("内部错误: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::IngestDisabled => StatusCode::SERVICE_UNAVAILABLE,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::ProviderNotConfigured(_) => StatusCode::CONFLICT,
            Self::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::IngestDisabled => "INGEST_DISABLED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::ProviderNotConfigured(_) => "PROVIDER_NOT_CONFIGURED",
            Self::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 上游细节与系统错误只写日志，响应里给通用提示
        let message = match &self {
            Self::ProviderUnavailable(detail) => {
                tracing::warn!(error = %detail, "数据源调用失败");
                "数据源暂时不可用，请稍后重试".to_string()
            }
            Self::StoreUnavailable(detail) => {
                tracing::warn!(error = %detail, "收入快照存储调用失败");
                "历史数据暂时不可用，请稍后重试".to_string()
            }
            Self::Internal(detail) => {
                tracing::error!(
                    error = %detail,
                    trace_id = ?current_trace_id(),
                    "内部错误"
                );
                "服务内部错误，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProviderNotConfigured(id) => Self::ProviderNotConfigured(id.to_string()),
            CoreError::Provider(e) => e.into(),
            CoreError::HttpClient(msg) => Self::Internal(msg),
            CoreError::Store(e) => Self::StoreUnavailable(e.to_string()),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotConfigured(id) => Self::ProviderNotConfigured(id.to_string()),
            other => Self::ProviderUnavailable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
