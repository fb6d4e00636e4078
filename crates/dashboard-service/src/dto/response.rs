//! 响应 DTO 定义
//!
//! 聚合结果本身（汇总、动态流、状态）直接序列化核心库类型，这里只定义外层信封和少量服务层响应。

use revenue_core::{ProviderId, RevenueRecord, TrafficMetrics, Transaction};
use serde::Serialize;

/// API 统一响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: Some(data),
        }
    }
}

/// 流量指标
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficResponse {
    /// 是否配置了分析类数据源
    pub configured: bool,
    pub traffic: Option<TrafficMetrics>,
}

/// 支付核验结果
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub reference: String,
    pub verified: bool,
    pub transaction: Option<Transaction>,
}

/// 收入快照历史
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueHistoryResponse {
    /// 快照存储后端：memory 或 postgres
    pub backend: &'static str,
    pub records: Vec<RevenueRecord>,
}

/// 交易推送结果
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub source: ProviderId,
    pub external_id: String,
    /// 同一 `(source, externalId)` 已推送过时为 true，旧记录被替换
    pub duplicate: bool,
}
