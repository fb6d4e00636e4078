//! 收入看板服务
//!
//! 把收入聚合核心库暴露为 REST API，供看板前端轮询。
//!
//! ## 核心功能
//!
//! - **收入汇总**：按自然月或最近 N 天汇总各数据源的成功交易
//! - **动态流**：合并各数据源的最新交易，按时间倒序
//! - **状态**：各数据源的归一化健康状态
//! - **支付核验**：通过 Paystack 核验单笔支付
//! - **交易推送**：外部系统凭 API Key 推送交易
//! - **快照历史**：自然月收入快照写入 PostgreSQL（未配置时保存在进程内）
//!
//! ## 模块结构
//!
//! - `dto`: 请求和响应的数据传输对象
//! - `error`: 错误类型定义
//! - `handlers`: HTTP 请求处理器
//! - `middleware`: API Key 认证与安全响应头
//! - `notification`: 里程碑与每日报告的邮件通知
//! - `repository`: 收入快照的 PostgreSQL 仓储
//! - `routes`: 路由配置
//! - `state`: 应用状态

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod notification;
pub mod repository;
pub mod routes;
pub mod state;

pub use dto::ApiResponse;
pub use error::{ApiError, Result};
pub use state::AppState;
