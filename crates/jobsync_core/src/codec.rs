//! Wire codec for the job-events socket.
//!
//! Inbound frames come in two shapes: control frames tagged with `type`
//! (`{"type": "auth_success"}`) and job lifecycle frames tagged with
//! `event_type` (`{"event_type": "job_progress", "timestamp": ..., "payload": {...}}`).
//! Both decode into an [`EventEnvelope`].

use std::fmt;

use jobsync_logging::sync_warn;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::filter::SubscribeRequest;
use crate::timestamp::{deserialize_lenient, parse_timestamp, Timestamp};
use crate::types::{JobId, JobRecord, JobStatus, Metadata};

pub const AUTH: &str = "auth";
pub const SUBSCRIBE_JOBS: &str = "subscribe_jobs";
pub const DEFAULT_PONG: &str = "pong";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Ping,
    AuthSuccess,
    AuthError,
    SubscribeSuccess,
    JobState,
    JobStarted,
    JobProgress,
    JobCompleted,
    JobFailed,
    JobCancelled,
    JobTimeout,
    /// A tag this client does not know; accepted and ignored.
    Unknown(String),
}

impl EventKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "ping" => EventKind::Ping,
            "auth_success" => EventKind::AuthSuccess,
            "auth_error" => EventKind::AuthError,
            "subscribe_jobs_success" => EventKind::SubscribeSuccess,
            "job_state" => EventKind::JobState,
            "job_started" => EventKind::JobStarted,
            "job_progress" => EventKind::JobProgress,
            "job_completed" => EventKind::JobCompleted,
            "job_failed" => EventKind::JobFailed,
            "job_cancelled" => EventKind::JobCancelled,
            "job_timeout" => EventKind::JobTimeout,
            other => EventKind::Unknown(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Ping => "ping",
            EventKind::AuthSuccess => "auth_success",
            EventKind::AuthError => "auth_error",
            EventKind::SubscribeSuccess => "subscribe_jobs_success",
            EventKind::JobState => "job_state",
            EventKind::JobStarted => "job_started",
            EventKind::JobProgress => "job_progress",
            EventKind::JobCompleted => "job_completed",
            EventKind::JobFailed => "job_failed",
            EventKind::JobCancelled => "job_cancelled",
            EventKind::JobTimeout => "job_timeout",
            EventKind::Unknown(tag) => tag,
        }
    }

    /// Status a terminal lifecycle kind finalizes a job with.
    pub fn terminal_status(&self) -> Option<JobStatus> {
        match self {
            EventKind::JobCompleted => Some(JobStatus::Completed),
            EventKind::JobFailed => Some(JobStatus::Failed),
            EventKind::JobCancelled => Some(JobStatus::Cancelled),
            EventKind::JobTimeout => Some(JobStatus::Timeout),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields a lifecycle event may carry. Everything except `job_id` is optional;
/// absent fields leave the stored record untouched.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct JobPayload {
    pub job_id: JobId,
    #[serde(default)]
    pub job_type: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub processed_items: Option<u64>,
    #[serde(default)]
    pub total_items: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub created_at: Option<Timestamp>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub started_at: Option<Timestamp>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub completed_at: Option<Timestamp>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default, alias = "error_message")]
    pub error: Option<String>,
    #[serde(default)]
    pub result: Option<Metadata>,
    #[serde(default, alias = "download_speed")]
    pub speed: Option<f64>,
    #[serde(default, alias = "eta")]
    pub eta_seconds: Option<f64>,
    /// Anything else the server sent; kept for forward compatibility.
    #[serde(flatten)]
    pub extra: Metadata,
}

impl JobPayload {
    pub fn new(job_id: impl Into<JobId>) -> Self {
        Self {
            job_id: job_id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeBody {
    Empty,
    AuthError { message: Option<String> },
    Snapshot(Vec<JobRecord>),
    Job(JobPayload),
    Other(Metadata),
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub kind: EventKind,
    pub timestamp: Option<Timestamp>,
    pub body: EnvelopeBody,
}

impl EventEnvelope {
    pub fn job(kind: EventKind, timestamp: Option<Timestamp>, payload: JobPayload) -> Self {
        Self {
            kind,
            timestamp,
            body: EnvelopeBody::Job(payload),
        }
    }

    pub fn snapshot(jobs: Vec<JobRecord>) -> Self {
        Self {
            kind: EventKind::JobState,
            timestamp: None,
            body: EnvelopeBody::Snapshot(jobs),
        }
    }

    pub fn job_payload(&self) -> Option<&JobPayload> {
        match &self.body {
            EnvelopeBody::Job(payload) => Some(payload),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Malformed(String),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("frame has no event kind tag")]
    MissingKind,
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: String, reason: String },
}

/// Decode one inbound text frame.
pub fn decode(raw: &str) -> Result<EventEnvelope, DecodeError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| DecodeError::Malformed(err.to_string()))?;
    let Value::Object(mut frame) = value else {
        return Err(DecodeError::NotAnObject);
    };

    let tag = ["event_type", "type"]
        .iter()
        .find_map(|key| frame.get(*key).and_then(Value::as_str))
        .map(ToOwned::to_owned)
        .ok_or(DecodeError::MissingKind)?;
    let kind = EventKind::from_tag(&tag);
    let timestamp = frame
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(parse_timestamp);

    let body = match &kind {
        EventKind::Ping | EventKind::AuthSuccess | EventKind::SubscribeSuccess => {
            EnvelopeBody::Empty
        }
        EventKind::AuthError => EnvelopeBody::AuthError {
            message: ["message", "error"]
                .iter()
                .find_map(|key| frame.get(*key).and_then(Value::as_str))
                .map(ToOwned::to_owned),
        },
        EventKind::JobState => EnvelopeBody::Snapshot(decode_snapshot_jobs(&kind, &mut frame)?),
        EventKind::Unknown(_) => EnvelopeBody::Other(frame),
        job_kind => {
            // Nested `payload` object, or the fields inline next to the tag.
            let payload = match frame.remove("payload") {
                Some(Value::Object(payload)) => payload,
                Some(_) => {
                    return Err(invalid(job_kind, "payload is not an object"));
                }
                None => {
                    frame.remove("type");
                    frame.remove("event_type");
                    frame.remove("timestamp");
                    frame
                }
            };
            let payload: JobPayload = serde_json::from_value(Value::Object(payload))
                .map_err(|err| invalid(job_kind, err))?;
            EnvelopeBody::Job(payload)
        }
    };

    Ok(EventEnvelope {
        kind,
        timestamp,
        body,
    })
}

fn decode_snapshot_jobs(
    kind: &EventKind,
    frame: &mut Metadata,
) -> Result<Vec<JobRecord>, DecodeError> {
    let jobs = match frame.remove("jobs") {
        Some(Value::Array(jobs)) => jobs,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => return Err(invalid(kind, "jobs is not an array")),
    };

    // A single bad entry drops that entry, not the whole snapshot.
    let records = jobs
        .into_iter()
        .filter_map(|job| match serde_json::from_value::<JobRecord>(job) {
            Ok(record) => Some(record),
            Err(err) => {
                sync_warn!("Dropping malformed job in snapshot: {}", err);
                None
            }
        })
        .collect();
    Ok(records)
}

fn invalid(kind: &EventKind, reason: impl fmt::Display) -> DecodeError {
    DecodeError::InvalidPayload {
        kind: kind.as_str().to_owned(),
        reason: reason.to_string(),
    }
}

/// Frames this client sends.
#[derive(Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Auth { token: String },
    Subscribe(SubscribeRequest),
    /// Liveness acknowledgement; `kind` is the `type` the deployment expects.
    Pong { kind: String },
}

impl OutboundFrame {
    pub fn kind(&self) -> &str {
        match self {
            OutboundFrame::Auth { .. } => AUTH,
            OutboundFrame::Subscribe(_) => SUBSCRIBE_JOBS,
            OutboundFrame::Pong { kind } => kind,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            OutboundFrame::Auth { token } => json!({ "type": AUTH, "token": token }),
            OutboundFrame::Subscribe(request) => {
                let mut frame = json!({
                    "type": SUBSCRIBE_JOBS,
                    "include_active_state": request.include_active_state,
                });
                if let Some(job_types) = &request.job_types {
                    frame["job_types"] = json!(job_types);
                }
                if let Some(job_ids) = &request.job_ids {
                    frame["job_ids"] = json!(job_ids);
                }
                frame
            }
            OutboundFrame::Pong { kind } => json!({ "type": kind }),
        }
        .to_string()
    }
}

// Keeps the credential out of logs.
impl fmt::Debug for OutboundFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboundFrame::Auth { .. } => f.debug_struct("Auth").field("token", &"<redacted>").finish(),
            OutboundFrame::Subscribe(request) => f.debug_tuple("Subscribe").field(request).finish(),
            OutboundFrame::Pong { kind } => f.debug_struct("Pong").field("kind", kind).finish(),
        }
    }
}
