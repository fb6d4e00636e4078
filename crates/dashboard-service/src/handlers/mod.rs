//! HTTP 请求处理器

pub mod analytics;
pub mod health;
pub mod ingest;
pub mod payment;
pub mod revenue;
pub mod status;
