//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。
//! 数据源凭证只在进程启动时读取一次，之后作为只读配置在请求间共享。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::observability::ObservabilityConfig;

/// 服务配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 单个 HTTP 请求的整体超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
        }
    }
}

/// 数据库配置
///
/// `url` 为空时不连接数据库，收入快照只保存在进程内。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    /// 启动时执行内置迁移
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
            min_connections: 1,
            connect_timeout_seconds: 5,
            idle_timeout_seconds: 600,
            run_migrations: true,
        }
    }
}

impl DatabaseConfig {
    /// 配置中的地址优先，其次是 DATABASE_URL
    pub fn resolved_url(&self) -> Option<String> {
        self.url
            .clone()
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .filter(|url| !url.trim().is_empty())
    }
}

/// 聚合器配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// 报表币种，其他币种的交易不计入总额
    pub reporting_currency: String,
    /// 每个数据源单次拉取的交易条数上限
    pub fetch_limit: usize,
    /// 动态流默认条数
    pub default_activity_limit: usize,
    /// 动态流最大条数
    pub max_activity_limit: usize,
    /// 收入里程碑阈值（最小货币单位），升序
    pub milestone_thresholds: Vec<i64>,
    /// 外部推送交易缓冲区容量
    pub ingest_buffer_size: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            reporting_currency: "NGN".to_string(),
            fetch_limit: 200,
            default_activity_limit: 10,
            max_activity_limit: 100,
            // ₦100,000 = 10,000,000 kobo
            milestone_thresholds: vec![10_000_000],
            ingest_buffer_size: 1000,
        }
    }
}

/// 状态归一化配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// 抖动检测窗口（秒）
    pub flap_window_secs: u64,
    /// 窗口内可达性切换次数达到该值即判定为 degraded
    pub flap_threshold: u32,
    /// 每个数据源保留的最多观测条数
    pub max_observations: usize,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            flap_window_secs: 300,
            flap_threshold: 2,
            max_observations: 32,
        }
    }
}

/// 数据源调用的重试配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_delay_ms: 200,
            max_delay_ms: 2000,
            multiplier: 2.0,
        }
    }
}

/// 通知配置（邮件告警）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub sendgrid_api_key: Option<String>,
    pub endpoint: String,
    pub recipient: Option<String>,
    pub from_address: String,
    pub from_name: String,
    pub timeout_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sendgrid_api_key: None,
            endpoint: "https://api.sendgrid.com/v3/mail/send".to_string(),
            recipient: None,
            from_address: "alerts@revenue-dashboard.local".to_string(),
            from_name: "Revenue Dashboard".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// 外部交易推送配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct IngestConfig {
    /// 推送接口的 API Key，未配置时推送接口不可用
    pub api_key: Option<String>,
}

/// 单个数据源配置
///
/// `id` 在 revenue-core 中解析为枚举，列表顺序即查询顺序，
/// 同一时间戳的动态按该顺序排列。
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEntry {
    pub id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 凭证；为空时回退到该数据源约定的环境变量
    #[serde(default)]
    pub secret_key: Option<String>,
    /// API 根地址；为空时使用官方地址
    #[serde(default)]
    pub base_url: Option<String>,
    /// Shopify 店铺地址
    #[serde(default)]
    pub store_url: Option<String>,
    /// Google Analytics 视图 ID
    #[serde(default)]
    pub view_id: Option<String>,
    /// 金额币种；仅用于不在响应中携带币种的数据源（联盟网络、Shopify 兜底）
    #[serde(default)]
    pub currency: Option<String>,
    /// 单次调用超时（毫秒），包含重试
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_provider_timeout_ms() -> u64 {
    5000
}

impl ProviderEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            secret_key: None,
            base_url: None,
            store_url: None,
            view_id: None,
            currency: None,
            timeout_ms: default_provider_timeout_ms(),
        }
    }

    pub fn with_secret_key(mut self, key: impl Into<String>) -> Self {
        self.secret_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_store_url(mut self, url: impl Into<String>) -> Self {
        self.store_url = Some(url.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub observability: ObservabilityConfig,
    pub aggregator: AggregatorConfig,
    pub status: StatusConfig,
    pub retry: RetryConfig,
    pub notification: NotificationConfig,
    pub ingest: IngestConfig,
    pub providers: Vec<ProviderEntry>,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（REVENUE_ 前缀，双下划线分隔层级，如 REVENUE_SERVER__PORT -> server.port）
    /// 5. 服务端口环境变量（如 REVENUE_DASHBOARD_PORT）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        // 本地开发时从 .env 读取凭证，文件不存在则忽略
        let _ = dotenvy::dotenv();

        let env = std::env::var("REVENUE_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
            )
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("REVENUE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut config: Self = builder.build()?.try_deserialize()?;

        if let Some(port) = Self::get_service_port_from_env(service_name) {
            config.server.port = port;
        }

        Ok(config)
    }

    /// 从环境变量获取服务特定端口
    ///
    /// - revenue-dashboard-service -> REVENUE_DASHBOARD_PORT
    /// - 其他服务：服务名大写下划线 + _PORT
    fn get_service_port_from_env(service_name: &str) -> Option<u16> {
        let env_var_name = match service_name {
            "revenue-dashboard-service" => "REVENUE_DASHBOARD_PORT".to_string(),
            _ => format!("{}_PORT", service_name.to_uppercase().replace('-', "_")),
        };

        std::env::var(&env_var_name)
            .ok()
            .and_then(|v| v.parse().ok())
    }

    /// 获取服务地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
