//! 数据库仓储层
//!
//! 核心库只依赖 [`revenue_core::RevenueStore`] 接口，这里提供基于 SQLx 的 PostgreSQL 实现。

mod revenue_repo;

pub use revenue_repo::PgRevenueStore;
