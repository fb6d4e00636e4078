//! 请求与响应的数据传输对象

pub mod request;
pub mod response;

pub use request::{
    ActivityQuery, IngestTransactionRequest, RevenueHistoryQuery, RevenueQuery, VerifyPaymentRequest,
};
pub use response::{
    ApiResponse, IngestResponse, RevenueHistoryResponse, TrafficResponse, VerifyPaymentResponse,
};
