//! 数据源注册表
//!
//! 按配置中显式的 `[[providers]]` 列表构造客户端，列表顺序即查询顺序。
//! 凭证优先取配置项，其次取该数据源约定的唯一环境变量，不做环境变量模式扫描。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use revenue_shared::config::ProviderEntry;
use tracing::{info, warn};

use super::{
    AffiliateClient, AffiliateNetwork, GoogleAnalyticsClient, PaystackClient, ProviderClient,
    ShopifyClient, StripeClient,
};
use crate::error::{CoreError, Result};
use crate::models::ProviderId;

/// 已注册的数据源及其单次调用超时
#[derive(Clone)]
pub struct RegisteredProvider {
    pub client: Arc<dyn ProviderClient>,
    pub timeout: Duration,
}

impl RegisteredProvider {
    pub fn new(client: Arc<dyn ProviderClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn id(&self) -> ProviderId {
        self.client.id()
    }
}

/// 各数据源的凭证环境变量
pub fn credential_env_var(id: ProviderId) -> &'static str {
    match id {
        ProviderId::Paystack => "PAYSTACK_SECRET_KEY",
        ProviderId::Stripe => "STRIPE_SECRET_KEY",
        ProviderId::Shopify => "SHOPIFY_ACCESS_TOKEN",
        ProviderId::CommissionJunction => "CJ_API_KEY",
        ProviderId::Clickbank => "CLICKBANK_API_KEY",
        ProviderId::Shareasale => "SHAREASALE_API_KEY",
        ProviderId::GoogleAnalytics => "GOOGLE_ANALYTICS_KEY",
    }
}

const SHOPIFY_STORE_URL_ENV: &str = "SHOPIFY_STORE_URL";
const GA_VIEW_ID_ENV: &str = "GA_VIEW_ID";

/// 从进程环境读取凭证
pub fn build_providers(entries: &[ProviderEntry]) -> Result<Vec<RegisteredProvider>> {
    build_providers_with(entries, |name| std::env::var(name).ok())
}

/// 使用自定义的环境变量查找函数构造数据源
pub fn build_providers_with(
    entries: &[ProviderEntry],
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Vec<RegisteredProvider>> {
    let http = Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .user_agent(concat!("revenue-core/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| CoreError::HttpClient(e.to_string()))?;

    let mut seen = HashSet::new();
    let mut providers = Vec::with_capacity(entries.len());

    for entry in entries {
        let id: ProviderId = entry.id.parse()?;
        if !seen.insert(id) {
            return Err(CoreError::DuplicateProvider(id));
        }

        // 禁用的数据源仍然注册，以 not_configured 状态出现在状态表中
        let secret = if entry.enabled {
            entry
                .secret_key
                .clone()
                .or_else(|| lookup(credential_env_var(id)))
        } else {
            None
        };

        let client = build_client(id, entry, secret, http.clone(), &lookup);
        if entry.enabled && !client.is_configured() {
            warn!(provider = %id, env = credential_env_var(id), "数据源缺少凭证，将以未配置状态运行");
        }

        info!(
            provider = %id,
            enabled = entry.enabled,
            configured = client.is_configured(),
            timeout_ms = entry.timeout_ms,
            "注册数据源"
        );
        providers.push(RegisteredProvider::new(
            client,
            Duration::from_millis(entry.timeout_ms.max(1)),
        ));
    }

    Ok(providers)
}

fn build_client(
    id: ProviderId,
    entry: &ProviderEntry,
    secret: Option<String>,
    http: Client,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Arc<dyn ProviderClient> {
    let base_url = entry.base_url.clone();
    match id {
        ProviderId::Paystack => Arc::new(PaystackClient::new(http, secret, base_url)),
        ProviderId::Stripe => Arc::new(StripeClient::new(http, secret, base_url)),
        ProviderId::Shopify => {
            let store_url = entry
                .store_url
                .clone()
                .or(base_url)
                .or_else(|| lookup(SHOPIFY_STORE_URL_ENV));
            Arc::new(ShopifyClient::new(http, secret, store_url, entry.currency.clone()))
        }
        ProviderId::CommissionJunction | ProviderId::Clickbank | ProviderId::Shareasale => {
            let network = match id {
                ProviderId::CommissionJunction => AffiliateNetwork::CommissionJunction,
                ProviderId::Clickbank => AffiliateNetwork::ClickBank,
                _ => AffiliateNetwork::ShareASale,
            };
            Arc::new(AffiliateClient::new(
                network,
                http,
                secret,
                base_url,
                entry.currency.clone(),
            ))
        }
        ProviderId::GoogleAnalytics => {
            let view_id = entry.view_id.clone().or_else(|| lookup(GA_VIEW_ID_ENV));
            Arc::new(GoogleAnalyticsClient::new(http, secret, view_id, base_url))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_builds_in_configured_order() {
        let entries = vec![
            ProviderEntry::new("stripe").with_secret_key("sk_test"),
            ProviderEntry::new("paystack"),
        ];
        let providers = build_providers_with(&entries, env(&[])).unwrap();

        let ids: Vec<_> = providers.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec![ProviderId::Stripe, ProviderId::Paystack]);
        assert!(providers[0].client.is_configured());
        assert!(!providers[1].client.is_configured());
    }

    #[test]
    fn test_secret_falls_back_to_fixed_env_var() {
        let entries = vec![ProviderEntry::new("paystack").with_timeout_ms(750)];
        let providers =
            build_providers_with(&entries, env(&[("PAYSTACK_SECRET_KEY", "sk_live")])).unwrap();

        assert!(providers[0].client.is_configured());
        assert_eq!(providers[0].timeout, Duration::from_millis(750));
    }

    #[test]
    fn test_disabled_entry_is_registered_unconfigured() {
        let entries = vec![ProviderEntry::new("stripe").with_secret_key("sk").disabled()];
        let providers = build_providers_with(&entries, env(&[])).unwrap();
        assert_eq!(providers.len(), 1);
        assert!(!providers[0].client.is_configured());
    }

    #[test]
    fn test_shopify_needs_store_url() {
        let entries = vec![ProviderEntry::new("shopify")];
        let providers = build_providers_with(
            &entries,
            env(&[
                ("SHOPIFY_ACCESS_TOKEN", "shpat"),
                ("SHOPIFY_STORE_URL", "https://demo.myshopify.com"),
            ]),
        )
        .unwrap();
        assert!(providers[0].client.is_configured());

        let providers =
            build_providers_with(&entries, env(&[("SHOPIFY_ACCESS_TOKEN", "shpat")])).unwrap();
        assert!(!providers[0].client.is_configured());
    }

    #[test]
    fn test_google_analytics_needs_view_id() {
        let entries = vec![ProviderEntry::new("google_analytics")];
        let providers =
            build_providers_with(&entries, env(&[("GOOGLE_ANALYTICS_KEY", "ga")])).unwrap();
        assert!(!providers[0].client.is_configured());

        let providers = build_providers_with(
            &entries,
            env(&[("GOOGLE_ANALYTICS_KEY", "ga"), ("GA_VIEW_ID", "12345")]),
        )
        .unwrap();
        assert!(providers[0].client.is_configured());
    }

    #[test]
    fn test_unknown_and_duplicate_ids_are_rejected() {
        let unknown = vec![ProviderEntry::new("amazon")];
        assert!(matches!(
            build_providers_with(&unknown, env(&[])),
            Err(CoreError::UnknownProvider(_))
        ));

        let duplicate = vec![ProviderEntry::new("stripe"), ProviderEntry::new("STRIPE")];
        assert!(matches!(
            build_providers_with(&duplicate, env(&[])),
            Err(CoreError::DuplicateProvider(ProviderId::Stripe))
        ));
    }

    #[test]
    fn test_credential_env_vars_are_unique() {
        let names: HashSet<_> = ProviderId::ALL.iter().map(|id| credential_env_var(*id)).collect();
        assert_eq!(names.len(), ProviderId::ALL.len());
    }
}
