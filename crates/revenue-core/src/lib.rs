//! 收入聚合核心库
//!
//! 包含数据源客户端、聚合器、状态归一化、金额换算以及里程碑通知钩子。
//! 每次请求都重新计算汇总结果；自然月快照通过 [`RevenueStore`] 写出，存储实现可替换。

pub mod aggregator;
pub mod error;
pub mod models;
pub mod money;
pub mod notifier;
pub mod providers;
pub mod revenue_store;
pub mod state_store;
pub mod status;
pub mod test_utils;

pub use aggregator::{ActivityFeed, Aggregator, OverallStatus, RevenueReport, StatusReport};
pub use error::{CoreError, ProviderError, Result, StoreError};
pub use models::*;
pub use notifier::{FanoutNotifier, LoggingNotifier, NoopNotifier, RevenueNotifier};
pub use providers::{ProviderClient, RegisteredProvider, build_providers};
pub use revenue_store::{InMemoryRevenueStore, RevenueRecord, RevenueStore};
pub use state_store::{InMemoryReportStateStore, ReportStateStore};
pub use status::{NormalizedStatus, StatusNormalizer};
