//! 中间件模块

mod api_key_auth;

pub use api_key_auth::{API_KEY_HEADER, api_key_auth_middleware, hash_api_key};

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};

/// 为所有响应注入 HTTP 安全头
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    // 看板数据按请求实时计算，禁止中间层缓存
    headers.insert("cache-control", HeaderValue::from_static("no-store"));
    response
}
