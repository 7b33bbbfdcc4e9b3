use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid events url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("failed to start engine runtime: {0}")]
    Runtime(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct SnapshotError {
    pub kind: SnapshotFailure,
    pub message: String,
}

impl SnapshotError {
    pub(crate) fn new(kind: SnapshotFailure, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotFailure {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    Network,
    Decode,
}

impl fmt::Display for SnapshotFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotFailure::InvalidUrl => write!(f, "invalid url"),
            SnapshotFailure::HttpStatus(code) => write!(f, "http status {code}"),
            SnapshotFailure::Timeout => write!(f, "timeout"),
            SnapshotFailure::Network => write!(f, "network error"),
            SnapshotFailure::Decode => write!(f, "undecodable response"),
        }
    }
}
