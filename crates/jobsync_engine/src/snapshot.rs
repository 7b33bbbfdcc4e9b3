use std::time::Duration;

use jobsync_core::JobRecord;
use jobsync_logging::{sync_debug, sync_warn};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::Value;

use crate::{SnapshotError, SnapshotFailure};

#[derive(Debug, Clone)]
pub struct RestSettings {
    /// API root; jobs are read from `{base_url}/jobs`.
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for RestSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Either a bare list of jobs or the list wrapped as `{"jobs": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum JobsBody {
    List(Vec<Value>),
    Wrapped { jobs: Vec<Value> },
}

/// Fetches the initial job list over REST for a faster first paint. The
/// connection manager never calls this; callers merge the result themselves.
#[derive(Debug, Clone)]
pub struct RestSnapshotClient {
    settings: RestSettings,
    client: reqwest::Client,
}

impl RestSnapshotClient {
    pub fn new(settings: RestSettings) -> Result<Self, SnapshotError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| SnapshotError::new(SnapshotFailure::Network, err.to_string()))?;
        Ok(Self { settings, client })
    }

    fn jobs_url(&self) -> Result<reqwest::Url, SnapshotError> {
        let raw = format!("{}/jobs", self.settings.base_url.trim_end_matches('/'));
        reqwest::Url::parse(&raw)
            .map_err(|err| SnapshotError::new(SnapshotFailure::InvalidUrl, err.to_string()))
    }

    pub async fn fetch_jobs(&self, token: &str) -> Result<Vec<JobRecord>, SnapshotError> {
        let url = self.jobs_url()?;
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SnapshotError::new(
                SnapshotFailure::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        let body: JobsBody = serde_json::from_slice(&bytes)
            .map_err(|err| SnapshotError::new(SnapshotFailure::Decode, err.to_string()))?;
        let entries = match body {
            JobsBody::List(entries) | JobsBody::Wrapped { jobs: entries } => entries,
        };

        let total = entries.len();
        let records: Vec<JobRecord> = entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<JobRecord>(entry) {
                Ok(record) => Some(record),
                Err(err) => {
                    sync_warn!("Skipping malformed REST job: {}", err);
                    None
                }
            })
            .collect();
        sync_debug!("REST snapshot returned {} of {} jobs", records.len(), total);
        Ok(records)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> SnapshotError {
    if err.is_timeout() {
        return SnapshotError::new(SnapshotFailure::Timeout, err.to_string());
    }
    SnapshotError::new(SnapshotFailure::Network, err.to_string())
}
