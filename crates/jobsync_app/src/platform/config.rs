//! Watcher configuration read from a RON file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jobsync_core::SubscriptionFilter;
use jobsync_engine::{RestSettings, SyncSettings};
use jobsync_logging::sync_info;
use serde::Deserialize;
use thiserror::Error;

use super::logging::LogSettings;

pub const DEFAULT_CONFIG_PATH: &str = "jobsync.ron";
pub const DEFAULT_TOKEN_ENV: &str = "JOBSYNC_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
}

/// Every field is optional in the file; absent ones take the defaults below.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub events_url: String,
    /// REST API root used for the initial job list; no prefetch when unset.
    pub rest_base_url: Option<String>,
    /// Environment variable holding the access token.
    pub token_env: String,
    pub reconnect_base_ms: u64,
    pub reconnect_cap_ms: u64,
    pub connect_timeout_ms: u64,
    pub pong_kind: String,
    pub render_interval_ms: u64,
    pub log: LogSettings,
    pub filter: SubscriptionFilter,
}

impl Default for AppConfig {
    fn default() -> Self {
        let sync = SyncSettings::default();
        Self {
            events_url: sync.events_url,
            rest_base_url: None,
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            reconnect_base_ms: millis(sync.reconnect_base),
            reconnect_cap_ms: millis(sync.reconnect_cap),
            connect_timeout_ms: millis(sync.connect_timeout),
            pong_kind: sync.pong_kind,
            render_interval_ms: 500,
            log: LogSettings::default(),
            filter: sync.filter,
        }
    }
}

impl AppConfig {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                sync_info!("No config at {:?}; using defaults", path);
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        ron::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            events_url: self.events_url.clone(),
            reconnect_base: Duration::from_millis(self.reconnect_base_ms),
            reconnect_cap: Duration::from_millis(self.reconnect_cap_ms),
            pong_kind: self.pong_kind.clone(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            filter: self.filter.clone(),
        }
    }

    pub fn rest_settings(&self) -> Option<RestSettings> {
        let base_url = self.rest_base_url.as_ref()?;
        Some(RestSettings {
            base_url: base_url.clone(),
            ..RestSettings::default()
        })
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms.max(50))
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::logging::LogSink;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_config(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(text.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = AppConfig::load(&dir.path().join("absent.ron")).expect("defaults");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.sync_settings(), SyncSettings::default());
        assert!(config.rest_settings().is_none());
    }

    #[test]
    fn partial_file_overrides_named_fields() {
        let file = write_config(
            r#"(
                events_url: "wss://jobs.example.com/ws/jobs",
                rest_base_url: Some("https://jobs.example.com/api"),
                reconnect_cap_ms: 5000,
                log: (sink: Both, level: "debug"),
                filter: (video_ids: Some([7, 9])),
            )"#,
        );

        let config = AppConfig::load(file.path()).expect("valid config");

        assert_eq!(config.events_url, "wss://jobs.example.com/ws/jobs");
        assert_eq!(config.log.sink, LogSink::Both);
        assert_eq!(config.log.level_filter(), log::LevelFilter::Debug);
        assert_eq!(config.log.file, LogSettings::default().file);
        assert_eq!(config.token_env, DEFAULT_TOKEN_ENV);
        let sync = config.sync_settings();
        assert_eq!(sync.reconnect_cap, Duration::from_secs(5));
        assert_eq!(sync.reconnect_base, Duration::from_secs(1));
        assert_eq!(sync.filter.video_ids, Some(vec![7, 9]));
        assert!(sync.filter.include_active_state);
        assert_eq!(
            config.rest_settings().map(|rest| rest.base_url),
            Some("https://jobs.example.com/api".to_string())
        );
    }

    #[test]
    fn invalid_file_is_an_error() {
        let file = write_config("(events_url: 42)");
        let err = AppConfig::load(file.path()).expect_err("must not parse");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
