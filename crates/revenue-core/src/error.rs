//! 核心库错误类型
//!
//! `ProviderError` 是数据源客户端边界上唯一的失败形式，传输和解析错误都在客户端内部
//! 转换成它；`StoreError` 是收入快照存储的失败；`CoreError` 描述调用核心操作时的非法输入。

use crate::models::{FailureKind, ProviderId};

/// 数据源调用失败
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// 网络错误、超时、5xx 或限流
    #[error("数据源不可用: {0}")]
    Unavailable(String),

    /// 凭证无效或已被吊销，不重试
    #[error("数据源认证失败: {0}")]
    Unauthorized(String),

    /// 响应无法解码或缺少必填字段
    #[error("数据源响应格式错误: {0}")]
    MalformedResponse(String),

    #[error("数据源未配置: {0}")]
    NotConfigured(ProviderId),
}

impl ProviderError {
    /// 只有瞬时故障值得重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unavailable(_) => FailureKind::Unavailable,
            Self::Unauthorized(_) => FailureKind::Unauthorized,
            Self::MalformedResponse(_) => FailureKind::MalformedResponse,
            Self::NotConfigured(_) => FailureKind::NotConfigured,
        }
    }

    /// 指标标签
    pub fn outcome_label(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Unauthorized(_) => "unauthorized",
            Self::MalformedResponse(_) => "malformed",
            Self::NotConfigured(_) => "not_configured",
        }
    }
}

/// 收入快照存储失败
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// 连接失败、超时或语句执行失败
    #[error("存储不可用: {0}")]
    Unavailable(String),

    /// 已存储的数据无法还原为快照
    #[error("存储数据无效: {0}")]
    Corrupt(String),
}

/// 核心操作错误
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("无效的统计周期: {0}")]
    InvalidPeriod(String),

    #[error("金额不能为负数: {0}")]
    NegativeAmount(i64),

    #[error("无效的金额: {0}")]
    InvalidAmount(String),

    #[error("无效的币种代码: {0}")]
    InvalidCurrency(String),

    #[error("无效的交易: {0}")]
    InvalidTransaction(String),

    #[error("未知的数据源: {0}")]
    UnknownProvider(String),

    #[error("数据源重复配置: {0}")]
    DuplicateProvider(ProviderId),

    #[error("数据源未配置: {0}")]
    ProviderNotConfigured(ProviderId),

    #[error("HTTP 客户端初始化失败: {0}")]
    HttpClient(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::Unavailable("连接超时".to_string());
        assert_eq!(err.to_string(), "数据源不可用: 连接超时");

        let err = ProviderError::NotConfigured(ProviderId::Stripe);
        assert_eq!(err.to_string(), "数据源未配置: stripe");

        let err = CoreError::NegativeAmount(-5);
        assert_eq!(err.to_string(), "金额不能为负数: -5");

        let err = CoreError::from(ProviderError::Unauthorized("Invalid key".to_string()));
        assert_eq!(err.to_string(), "数据源认证失败: Invalid key");
    }

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(ProviderError::Unavailable("503".into()).is_retryable());
        assert!(!ProviderError::Unauthorized("401".into()).is_retryable());
        assert!(!ProviderError::MalformedResponse("缺少 data".into()).is_retryable());
        assert!(!ProviderError::NotConfigured(ProviderId::Paystack).is_retryable());
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            ProviderError::MalformedResponse(String::new()).kind(),
            FailureKind::MalformedResponse
        );
        assert_eq!(
            ProviderError::Unauthorized(String::new()).outcome_label(),
            "unauthorized"
        );
    }
}
