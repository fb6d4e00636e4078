//! 数据源 HTTP 调用的公共部分：状态码映射、传输错误映射、JSON 解码

use chrono::{DateTime, TimeZone, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::ProviderError;
use crate::models::ProviderId;

/// 发送请求，只处理传输层错误
pub(crate) async fn execute(
    provider: ProviderId,
    request: RequestBuilder,
) -> Result<Response, ProviderError> {
    request
        .send()
        .await
        .map_err(|e| transport_error(provider, e))
}

/// 状态码映射
///
/// 401/403 为认证失败；429 和 5xx 为暂时不可用，可重试；
/// 其余非 2xx 说明请求本身有误，按响应异常处理，不重试。
pub(crate) fn check_status(provider: ProviderId, status: StatusCode) -> Result<(), ProviderError> {
    if status.is_success() {
        return Ok(());
    }

    let detail = format!("{} 返回 HTTP {}", provider, status.as_u16());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProviderError::Unauthorized(detail)),
        StatusCode::TOO_MANY_REQUESTS => Err(ProviderError::Unavailable(detail)),
        s if s.is_server_error() => Err(ProviderError::Unavailable(detail)),
        _ => Err(ProviderError::MalformedResponse(detail)),
    }
}

/// 读取响应体并解码为 JSON
pub(crate) async fn read_json<T: DeserializeOwned>(
    provider: ProviderId,
    response: Response,
) -> Result<T, ProviderError> {
    let body = response
        .bytes()
        .await
        .map_err(|e| transport_error(provider, e))?;

    serde_json::from_slice(&body).map_err(|e| {
        ProviderError::MalformedResponse(format!("{} 响应无法解析: {}", provider, e))
    })
}

/// 发送请求并解码成功响应
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: ProviderId,
    request: RequestBuilder,
) -> Result<T, ProviderError> {
    let response = execute(provider, request).await?;
    check_status(provider, response.status())?;
    read_json(provider, response).await
}

/// 传输错误一律视为不可用，错误信息中去掉 URL 避免泄露查询参数
fn transport_error(provider: ProviderId, err: reqwest::Error) -> ProviderError {
    if err.is_decode() {
        return ProviderError::MalformedResponse(format!("{} 响应解码失败: {}", provider, err.without_url()));
    }

    let reason = if err.is_timeout() {
        "请求超时"
    } else if err.is_connect() {
        "连接失败"
    } else {
        "请求失败"
    };
    ProviderError::Unavailable(format!("{} {}: {}", provider, reason, err.without_url()))
}

/// 缺失必填字段
pub(crate) fn missing_field(provider: ProviderId, field: &str) -> ProviderError {
    ProviderError::MalformedResponse(format!("{} 响应缺少字段 {}", provider, field))
}

/// 解析 RFC 3339 时间戳
pub(crate) fn parse_timestamp(
    provider: ProviderId,
    field: &str,
    raw: &str,
) -> Result<DateTime<Utc>, ProviderError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            ProviderError::MalformedResponse(format!("{} 字段 {} 时间格式错误: {}", provider, field, raw))
        })
}

/// 解析 Unix 秒
pub(crate) fn parse_unix_seconds(
    provider: ProviderId,
    field: &str,
    secs: i64,
) -> Result<DateTime<Utc>, ProviderError> {
    Utc.timestamp_opt(secs, 0).single().ok_or_else(|| {
        ProviderError::MalformedResponse(format!("{} 字段 {} 时间戳越界: {}", provider, field, secs))
    })
}

/// 去掉 base URL 末尾的斜杠
pub(crate) fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// 把核心层的换算错误转换为响应格式错误
pub(crate) fn malformed(provider: ProviderId, err: crate::error::CoreError) -> ProviderError {
    ProviderError::MalformedResponse(format!("{}: {}", provider, err))
}
