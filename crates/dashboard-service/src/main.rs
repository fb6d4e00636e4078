//! 收入看板服务
//!
//! 启动时读取数据源配置，之后每个请求都实时向各数据源聚合。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::HeaderValue;
use revenue_core::{
    Aggregator, FanoutNotifier, LoggingNotifier, RevenueNotifier, StatusNormalizer, build_providers,
};
use revenue_dashboard::{
    notification::SendGridNotifier, repository::PgRevenueStore, routes, state::AppState,
};
use revenue_shared::database::Database;
use revenue_shared::observability::{self, ObservabilityConfig};
use revenue_shared::{config::AppConfig, retry::RetryPolicy};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const SERVICE_NAME: &str = "revenue-dashboard-service";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("配置加载失败，使用默认配置: {}", e);
        AppConfig {
            observability: ObservabilityConfig::from_env(SERVICE_NAME),
            ..Default::default()
        }
    });

    let obs_config = config
        .observability
        .clone()
        .for_service(SERVICE_NAME, &config.environment);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting {} on {}", SERVICE_NAME, config.server_addr());

    // 数据源：列表顺序即查询顺序
    let providers = build_providers(&config.providers).context("数据源配置无效")?;
    if providers.iter().all(|p| !p.client.is_configured()) {
        warn!("没有任何已配置凭证的数据源，接口将返回 configuredProviderCount = 0");
    }

    // 通知：日志始终开启，邮件按配置启用
    let mut notifiers: Vec<Arc<dyn RevenueNotifier>> = vec![Arc::new(LoggingNotifier)];
    if let Some(email) = SendGridNotifier::from_config(&config.notification)? {
        info!("邮件通知已启用");
        notifiers.push(Arc::new(email));
    }

    let mut aggregator = Aggregator::new(providers, config.aggregator.clone())?
        .with_retry_policy(RetryPolicy::from(&config.retry))
        .with_normalizer(Arc::new(StatusNormalizer::new(&config.status)))
        .with_notifier(Arc::new(FanoutNotifier::new(notifiers)));

    // 快照存储：配置了数据库时写入 PostgreSQL，否则保存在进程内
    let database = match config.database.resolved_url() {
        Some(url) => {
            let db = Database::connect(&config.database, &url).await?;
            if config.database.run_migrations {
                db.run_migrations().await?;
            }
            aggregator =
                aggregator.with_revenue_store(Arc::new(PgRevenueStore::new(db.pool().clone())));
            Some(db)
        }
        None => {
            info!("未配置数据库，收入快照仅保存在进程内");
            None
        }
    };

    info!(
        currency = aggregator.reporting_currency(),
        store = aggregator.revenue_store_backend(),
        providers = ?aggregator.provider_ids(),
        configured = aggregator.configured_provider_count(),
        "聚合器初始化完成"
    );

    let state = AppState::new(Arc::new(aggregator))
        .with_ingest_api_key(config.ingest.api_key.as_deref());
    if state.ingest_key_hash.is_none() {
        info!("未配置推送 API Key，POST /api/transactions 将返回 503");
    }

    // CORS：REVENUE_CORS_ORIGINS 为逗号分隔的来源列表，"*" 表示全部
    let allowed_origins = std::env::var("REVENUE_CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string());
    let cors = if allowed_origins == "*" {
        if config.is_production() {
            warn!("REVENUE_CORS_ORIGINS=\"*\" 在生产环境中不安全，请设置为具体域名");
        }
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        info!("CORS allowed_origins: {}", allowed_origins);
        let origins: Vec<_> = allowed_origins
            .split(',')
            .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let app = routes::app(state)
        .layer(cors)
        .layer(routes::request_timeout(Duration::from_secs(
            config.server.request_timeout_secs.max(1),
        )))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(db) = database {
        db.close().await;
    }
    info!("Server shutdown complete");
    Ok(())
}

/// 监听关闭信号（Ctrl+C 或 SIGTERM）
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
