use crate::{JobId, JobRecord, SubscriptionFilter};

/// Inputs to the sync state machine. Transport-originated messages carry the
/// generation of the transport that produced them.
#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Caller asked to connect with an access credential.
    Connect { credential: String },
    /// Caller asked to disconnect; suppresses reconnects until the next connect.
    Disconnect,
    /// Caller replaced the subscription filter.
    UpdateSubscription(SubscriptionFilter),
    /// The transport finished opening.
    TransportOpened { generation: u64 },
    /// One inbound text frame.
    FrameReceived { generation: u64, text: String },
    /// The transport closed without an error.
    TransportClosed {
        generation: u64,
        reason: Option<String>,
    },
    /// The transport failed to open or broke while open.
    TransportError { generation: u64, message: String },
    /// A scheduled reconnect delay elapsed.
    ReconnectTimerFired { token: u64 },
    /// Records fetched out-of-band; tracked records take precedence.
    MergeRestSnapshot(Vec<JobRecord>),
    /// Consumer removed a job from the view.
    RemoveJob(JobId),
    /// Consumer cleared the view.
    ClearJobs,
}
