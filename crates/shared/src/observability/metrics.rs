//! Prometheus 指标
//!
//! 指标名和标签集中定义在这里，业务代码只调用 `record_*` / `set_*` 函数。
//! 未安装 recorder 时这些函数是空操作，测试里可以直接调用。

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::ObservabilityConfig;

/// 耗时直方图分桶（秒），覆盖从本地缓存命中到数据源超时的区间
const LATENCY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// 指标服务器任务，随守卫一起存活
pub struct MetricsHandle {
    _server: JoinHandle<()>,
}

/// 安装全局 recorder，并在 `metrics_port` 上单独暴露 `/metrics`
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )?
        .install_recorder()
        .context("安装 Prometheus recorder 失败")?;

    describe_metrics();
    metrics::counter!("service_starts_total", "service" => config.service_name.clone())
        .increment(1);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server = serve(addr, handle).await?;
    Ok(MetricsHandle { _server: server })
}

fn describe_metrics() {
    metrics::describe_counter!("http_requests_total", "Dashboard API requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "Dashboard API request latency in seconds"
    );
    metrics::describe_counter!(
        "provider_requests_total",
        "Provider API calls by outcome"
    );
    metrics::describe_histogram!(
        "provider_request_duration_seconds",
        "Provider API call latency in seconds, retries included"
    );
    metrics::describe_counter!("aggregations_total", "Aggregation runs by operation");
    metrics::describe_histogram!(
        "aggregation_duration_seconds",
        "End-to-end aggregation latency in seconds"
    );
    metrics::describe_gauge!(
        "revenue_period_total_minor_units",
        "Revenue of the last computed period per provider, in minor units"
    );
    metrics::describe_counter!("notifications_total", "Email notifications by kind and status");
    metrics::describe_counter!(
        "revenue_store_operations_total",
        "Revenue snapshot store operations by outcome"
    );
}

async fn serve(addr: SocketAddr, handle: PrometheusHandle) -> Result<JoinHandle<()>> {
    let app = Router::new().route(
        "/metrics",
        get(move || std::future::ready(handle.render())),
    );

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("指标端口 {} 绑定失败", addr))?;
    info!(%addr, "指标服务已启动");

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "指标服务异常退出");
        }
    }))
}

// ---------- 记录函数 ----------

/// 记录一次 API 请求，`path` 应为路由模板而非原始 URI
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_request_duration_seconds", &labels).record(duration_secs);
}

/// 记录一次数据源调用
///
/// outcome: ok / unauthorized / unavailable / malformed / timeout / not_configured
#[inline]
pub fn record_provider_request(provider: &str, outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "provider_requests_total",
        "provider" => provider.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "provider_request_duration_seconds",
        "provider" => provider.to_string()
    )
    .record(duration_secs);
}

/// 记录一次聚合
#[inline]
pub fn record_aggregation(operation: &str, configured_providers: usize, duration_secs: f64) {
    metrics::counter!(
        "aggregations_total",
        "operation" => operation.to_string(),
        "configured" => (configured_providers > 0).to_string()
    )
    .increment(1);

    metrics::histogram!(
        "aggregation_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

/// 更新数据源当期收入
#[inline]
pub fn set_provider_revenue(provider: &str, minor_units: i64) {
    metrics::gauge!(
        "revenue_period_total_minor_units",
        "provider" => provider.to_string()
    )
    .set(minor_units as f64);
}

/// 记录通知发送
#[inline]
pub fn record_notification(kind: &str, status: &str) {
    metrics::counter!(
        "notifications_total",
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录一次收入快照存储操作
///
/// operation: save / recent / health；outcome: ok / error / timeout
pub fn record_store_operation(backend: &str, operation: &str, outcome: &str) {
    metrics::counter!(
        "revenue_store_operations_total",
        "backend" => backend.to_string(),
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets_are_sorted() {
        assert!(LATENCY_BUCKETS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_record_functions_do_not_panic() {
        // 未安装 recorder 时这些函数也不应该 panic
        record_http_request("GET", "/api/revenue", 200, 0.1);
        record_provider_request("paystack", "ok", 0.05);
        record_aggregation("revenue_summary", 2, 0.2);
        set_provider_revenue("stripe", 125_000);
        record_notification("milestone", "sent");
        record_store_operation("postgres", "save", "ok");
    }
}
