//! 应用状态定义

use std::sync::Arc;

use revenue_core::Aggregator;

use crate::middleware::hash_api_key;

/// Axum 应用共享状态
///
/// 聚合器内部持有只读的数据源列表和并发安全的缓冲区，通过 Arc 在 handler 间共享
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    /// 推送接口 API Key 的 SHA256 摘要，未配置时推送接口返回 503
    pub ingest_key_hash: Option<Arc<str>>,
}

impl AppState {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self {
            aggregator,
            ingest_key_hash: None,
        }
    }

    /// 配置推送接口的 API Key，空字符串视为未配置
    pub fn with_ingest_api_key(mut self, api_key: Option<&str>) -> Self {
        self.ingest_key_hash = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| Arc::from(hash_api_key(k)));
        self
    }
}
