//! Jobsync engine: transports, REST snapshot and the connection manager.
mod credential;
mod manager;
mod settings;
mod snapshot;
mod transport;
mod types;

pub use credential::{CredentialSource, EnvCredential, StaticCredential};
pub use manager::ConnectionManager;
pub use settings::SyncSettings;
pub use snapshot::{RestSettings, RestSnapshotClient};
pub use transport::{Connector, Link, TransportEvent, WsConnector};
pub use types::{EngineError, SnapshotError, SnapshotFailure, TransportError};
