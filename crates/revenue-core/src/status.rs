//! 数据源状态归一化
//!
//! 把"是否配置、是否可达"的原始检测结果收敛到一个封闭的状态集合，供前端统一渲染。
//! 每个数据源保留一段有界的观测历史，用于抖动检测。

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use revenue_shared::config::StatusConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{FailureKind, ProviderId, ProviderStatus};

/// 归一化状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizedStatus {
    NotConfigured,
    ConfiguredUntested,
    Online,
    Degraded,
    Offline,
    Error,
}

impl NormalizedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::ConfiguredUntested => "configured_untested",
            Self::Online => "online",
            Self::Degraded => "degraded",
            Self::Offline => "offline",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    at: DateTime<Utc>,
    reachable: bool,
    malformed: bool,
}

/// 状态归一化器
///
/// 观测历史按数据源存放在 DashMap 中，由应用状态持有，跨请求共享。
pub struct StatusNormalizer {
    flap_window: Duration,
    flap_threshold: u32,
    max_observations: usize,
    history: DashMap<ProviderId, VecDeque<Observation>>,
}

/// 超出 `TimeDelta` 可表示范围的窗口回退到默认值
fn flap_window(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or_else(|| {
            warn!(flap_window_secs = secs, "抖动窗口超出范围，使用默认值");
            Duration::seconds(StatusConfig::default().flap_window_secs as i64)
        })
}

impl Default for StatusNormalizer {
    fn default() -> Self {
        Self::new(&StatusConfig::default())
    }
}

impl StatusNormalizer {
    pub fn new(config: &StatusConfig) -> Self {
        Self {
            flap_window: flap_window(config.flap_window_secs),
            flap_threshold: config.flap_threshold.max(1),
            max_observations: config.max_observations.max(2),
            history: DashMap::new(),
        }
    }

    /// 归一化一批原始状态
    pub fn normalize(&self, raw: &[ProviderStatus]) -> BTreeMap<ProviderId, NormalizedStatus> {
        raw.iter()
            .map(|status| (status.provider_id, self.observe(status)))
            .collect()
    }

    /// 记录一次观测并返回归一化状态
    ///
    /// `reachable == None` 不写入历史，返回最近一次已知状态。
    pub fn observe(&self, raw: &ProviderStatus) -> NormalizedStatus {
        if !raw.configured {
            self.history.remove(&raw.provider_id);
            return NormalizedStatus::NotConfigured;
        }

        let Some(reachable) = raw.reachable else {
            return self
                .current(raw.provider_id)
                .unwrap_or(NormalizedStatus::ConfiguredUntested);
        };

        let observation = Observation {
            at: raw.last_checked_at.unwrap_or_else(Utc::now),
            reachable,
            malformed: raw.failure == Some(FailureKind::MalformedResponse),
        };

        let mut entry = self.history.entry(raw.provider_id).or_default();
        let history = entry.value_mut();
        history.push_back(observation);
        self.prune(history, observation.at);

        let status = self.classify(history);
        debug!(
            provider = %raw.provider_id,
            status = status.as_str(),
            observations = history.len(),
            "数据源状态已更新"
        );
        status
    }

    /// 最近一次已知状态，不写入新观测
    pub fn current(&self, provider_id: ProviderId) -> Option<NormalizedStatus> {
        self.history
            .get(&provider_id)
            .filter(|h| !h.is_empty())
            .map(|h| self.classify(h.value()))
    }

    fn window_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        at.checked_sub_signed(self.flap_window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn prune(&self, history: &mut VecDeque<Observation>, now: DateTime<Utc>) {
        let cutoff = self.window_start(now);
        while history.len() > 1 && history.front().is_some_and(|o| o.at < cutoff) {
            history.pop_front();
        }
        while history.len() > self.max_observations {
            history.pop_front();
        }
    }

    fn classify(&self, history: &VecDeque<Observation>) -> NormalizedStatus {
        let Some(last) = history.back() else {
            return NormalizedStatus::ConfiguredUntested;
        };

        if last.malformed {
            return NormalizedStatus::Error;
        }

        let cutoff = self.window_start(last.at);
        let transitions = history
            .iter()
            .filter(|o| o.at >= cutoff)
            .collect::<Vec<_>>()
            .windows(2)
            .filter(|pair| pair[0].reachable != pair[1].reachable)
            .count();

        if transitions as u32 >= self.flap_threshold {
            NormalizedStatus::Degraded
        } else if last.reachable {
            NormalizedStatus::Online
        } else {
            NormalizedStatus::Offline
        }
    }
}
