//! API Key 认证中间件
//!
//! 保护交易推送接口。只在内存中保存 Key 的 SHA256 摘要，比较摘要而不是明文。

use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::{error::ApiError, state::AppState};

/// API Key Header 名称
pub const API_KEY_HEADER: &str = "X-API-Key";

/// 计算 API Key 的 SHA256 哈希
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// 逐字节比较，耗时与首个不同字节的位置无关
fn digest_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

/// API Key 认证中间件
///
/// 未配置 Key 时返回 503，缺失或不匹配时返回 401。
pub async fn api_key_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.ingest_key_hash.as_deref() else {
        warn!("交易推送 API Key 未配置，拒绝请求");
        return Err(ApiError::IngestDisabled);
    };

    let api_key = match headers.get(API_KEY_HEADER) {
        Some(value) => value.to_str().map_err(|_| {
            warn!("API Key header 编码无效");
            ApiError::Unauthorized("Invalid API Key header".to_string())
        })?,
        None => return Err(ApiError::Unauthorized("Missing API Key".to_string())),
    };

    if !digest_eq(&hash_api_key(api_key.trim()), expected) {
        warn!(
            key_prefix = &api_key[..api_key.len().min(4)],
            "API Key 校验失败"
        );
        return Err(ApiError::Unauthorized("Invalid API Key".to_string()));
    }

    debug!("API Key 校验通过");
    Ok(next.run(request).await)
}
