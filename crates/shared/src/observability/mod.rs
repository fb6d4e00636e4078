//! 可观测性
//!
//! 日志、追踪和 Prometheus 指标共用一份配置，由服务在启动时调用 [`init`] 一次。
//! 数据源调用、聚合耗时和通知投递的指标名集中定义在 [`metrics`] 中。

pub mod metrics;
pub mod middleware;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;
use serde::Deserialize;

/// 可观测性配置，对应配置文件中的 `[observability]` 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// 写入日志、span 和 `service_starts_total` 标签
    pub service_name: String,

    /// OTLP gRPC 端点，未设置时只输出本地日志
    pub otlp_endpoint: Option<String>,

    pub metrics_enabled: bool,

    /// `/metrics` 独立监听的端口，与业务端口分开
    pub metrics_port: u16,

    /// RUST_LOG 未设置时使用的过滤指令
    pub log_level: String,

    pub json_logs: bool,

    /// 部署环境，写入追踪资源属性
    pub environment: String,

    /// 追踪采样率（0.0 ~ 1.0），只作用于根 span
    pub trace_sample_ratio: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "revenue-service".to_string(),
            otlp_endpoint: None,
            metrics_enabled: true,
            metrics_port: 9090,
            log_level: "info".to_string(),
            json_logs: false,
            environment: "development".to_string(),
            trace_sample_ratio: 1.0,
        }
    }
}

impl ObservabilityConfig {
    /// 配置文件不可用时，仅从环境变量读取
    pub fn from_env(service_name: &str) -> Self {
        let defaults = Self::default();
        let env_flag = |name: &str| {
            std::env::var(name)
                .map(|v| matches!(v.as_str(), "1" | "true"))
                .unwrap_or(false)
        };

        Self {
            service_name: service_name.to_string(),
            otlp_endpoint: std::env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            metrics_port: std::env::var("METRICS_PORT")
                .ok()
                .and_then(|port| port.parse().ok())
                .unwrap_or(defaults.metrics_port),
            json_logs: env_flag("JSON_LOGS"),
            environment: std::env::var("REVENUE_ENV").unwrap_or(defaults.environment.clone()),
            ..defaults
        }
    }

    /// 注入服务名和部署环境（配置文件中通常不单独填写）
    pub fn for_service(mut self, service_name: &str, environment: &str) -> Self {
        self.service_name = service_name.to_string();
        self.environment = environment.to_string();
        self
    }
}

/// 持有追踪导出器和指标服务器，drop 时刷新未导出的 span
pub struct ObservabilityGuard {
    _tracing: tracing::TracingGuard,
    _metrics: Option<metrics::MetricsHandle>,
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        info!("可观测性组件关闭");
    }
}

/// 初始化日志追踪，再按配置启动指标导出
///
/// 指标端口被占用时返回错误，由调用方决定是否终止启动。
pub async fn init(config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    let tracing = tracing::init(config)?;

    let metrics = if config.metrics_enabled {
        Some(metrics::init(config).await?)
    } else {
        None
    };

    info!(
        service = %config.service_name,
        environment = %config.environment,
        otlp = config.otlp_endpoint.is_some(),
        metrics_port = config.metrics_enabled.then_some(config.metrics_port),
        "可观测性初始化完成"
    );

    Ok(ObservabilityGuard {
        _tracing: tracing,
        _metrics: metrics,
    })
}
