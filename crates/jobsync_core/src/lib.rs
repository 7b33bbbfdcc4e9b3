//! Jobsync core: pure job-event state machine, codec and job store.
mod codec;
mod effect;
mod filter;
mod msg;
mod reconnect;
mod state;
mod store;
mod timestamp;
mod types;
mod update;
mod view_model;

pub use codec::{
    decode, DecodeError, EnvelopeBody, EventEnvelope, EventKind, JobPayload, OutboundFrame,
    DEFAULT_PONG,
};
pub use effect::Effect;
pub use filter::{SubscribeRequest, SubscriptionController, SubscriptionFilter};
pub use msg::Msg;
pub use reconnect::ReconnectPolicy;
pub use state::{CoreConfig, SyncState};
pub use store::{payload_video_id, ApplyOutcome, DiscardReason, JobStateStore};
pub use timestamp::{parse_timestamp, Timestamp};
pub use types::{
    video_id_from_metadata, ConnectionState, JobId, JobRecord, JobStatus, Metadata, VideoId,
    VIDEO_ID_KEY,
};
pub use update::update;
pub use view_model::{JobRowView, SyncViewModel};
