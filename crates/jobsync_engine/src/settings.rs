use std::time::Duration;

use jobsync_core::{CoreConfig, ReconnectPolicy, SubscriptionFilter, DEFAULT_PONG};

use crate::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// `ws://` or `wss://` job-events endpoint.
    pub events_url: String,
    pub reconnect_base: Duration,
    pub reconnect_cap: Duration,
    /// `type` of the frame sent back for each server `ping`.
    pub pong_kind: String,
    pub connect_timeout: Duration,
    pub filter: SubscriptionFilter,
}

impl Default for SyncSettings {
    fn default() -> Self {
        let policy = ReconnectPolicy::default();
        Self {
            events_url: "ws://127.0.0.1:8000/ws/jobs".to_string(),
            reconnect_base: policy.base,
            reconnect_cap: policy.cap,
            pong_kind: DEFAULT_PONG.to_string(),
            connect_timeout: Duration::from_secs(10),
            filter: SubscriptionFilter::default(),
        }
    }
}

impl SyncSettings {
    pub fn with_url(events_url: impl Into<String>) -> Self {
        Self {
            events_url: events_url.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |reason: String| EngineError::InvalidUrl {
            url: self.events_url.clone(),
            reason,
        };
        let parsed = url::Url::parse(&self.events_url).map_err(|err| invalid(err.to_string()))?;
        match parsed.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(invalid(format!("unsupported scheme {other}"))),
        }
    }

    pub fn core_config(&self) -> CoreConfig {
        CoreConfig {
            reconnect: ReconnectPolicy::new(self.reconnect_base, self.reconnect_cap),
            pong_kind: self.pong_kind.clone(),
            filter: self.filter.clone(),
        }
    }
}
