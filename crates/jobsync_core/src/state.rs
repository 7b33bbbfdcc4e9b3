use crate::codec::DEFAULT_PONG;
use crate::{
    ConnectionState, Effect, JobStateStore, ReconnectPolicy, SubscriptionController,
    SubscriptionFilter,
};

/// Static knobs of the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub reconnect: ReconnectPolicy,
    /// `type` of the frame answering a server `ping`.
    pub pong_kind: String,
    pub filter: SubscriptionFilter,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            pong_kind: DEFAULT_PONG.to_string(),
            filter: SubscriptionFilter::default(),
        }
    }
}

/// Everything the sync engine knows: connection lifecycle, subscription and
/// the job map. Mutated only through [`crate::update`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyncState {
    pub(crate) connection: ConnectionState,
    pub(crate) last_error: Option<String>,
    pub(crate) credential: Option<String>,
    pub(crate) manual_disconnect: bool,
    pub(crate) auth_rejected: bool,
    pub(crate) transport_open: bool,
    pub(crate) subscribed: bool,
    pub(crate) generation: u64,
    pub(crate) reconnect_attempt: u32,
    pub(crate) pending_timer: Option<u64>,
    pub(crate) next_timer_token: u64,
    pub(crate) subscription: SubscriptionController,
    pub(crate) store: JobStateStore,
    pub(crate) policy: ReconnectPolicy,
    pub(crate) pong_kind: String,
    dirty: bool,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new(CoreConfig::default())
    }
}

impl SyncState {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            connection: ConnectionState::Idle,
            last_error: None,
            credential: None,
            manual_disconnect: false,
            auth_rejected: false,
            transport_open: false,
            subscribed: false,
            generation: 0,
            reconnect_attempt: 0,
            pending_timer: None,
            next_timer_token: 0,
            subscription: SubscriptionController::new(config.filter),
            store: JobStateStore::new(),
            policy: config.reconnect,
            pong_kind: config.pong_kind,
            dirty: false,
        }
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Message of the last configuration, auth or transport failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn store(&self) -> &JobStateStore {
        &self.store
    }

    pub fn filter(&self) -> &SubscriptionFilter {
        self.subscription.filter()
    }

    pub fn subscription(&self) -> &SubscriptionController {
        &self.subscription
    }

    /// Consecutive reconnects scheduled since the last successful auth.
    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt
    }

    pub fn is_manually_disconnected(&self) -> bool {
        self.manual_disconnect
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub fn reconnect_pending(&self) -> bool {
        self.pending_timer.is_some()
    }

    /// Generation of the current (or last) transport.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns whether anything visible changed since the last call.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn set_connection(&mut self, next: ConnectionState) {
        if self.connection != next {
            self.connection = next;
            self.dirty = true;
        }
    }

    pub(crate) fn set_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
        self.set_connection(ConnectionState::Error);
        self.dirty = true;
    }

    /// Frames are only acted on while they come from the live transport.
    pub(crate) fn is_live(&self, generation: u64) -> bool {
        self.transport_open && generation == self.generation
    }

    pub(crate) fn open_transport(&mut self, effects: &mut Vec<Effect>) {
        if self.transport_open {
            effects.push(Effect::CloseTransport);
        }
        self.generation += 1;
        self.transport_open = true;
        self.subscribed = false;
        self.set_connection(ConnectionState::Connecting);
        effects.push(Effect::OpenTransport {
            generation: self.generation,
        });
    }

    pub(crate) fn close_transport(&mut self, effects: &mut Vec<Effect>) {
        if self.transport_open {
            self.transport_open = false;
            self.subscribed = false;
            effects.push(Effect::CloseTransport);
        }
    }

    pub(crate) fn cancel_reconnect(&mut self, effects: &mut Vec<Effect>) {
        if self.pending_timer.take().is_some() {
            effects.push(Effect::CancelReconnect);
        }
    }

    /// Schedule the next reconnect unless one is already pending.
    pub(crate) fn schedule_reconnect(&mut self, effects: &mut Vec<Effect>) {
        if self.pending_timer.is_some() {
            return;
        }
        let delay = self.policy.delay_for_attempt(self.reconnect_attempt);
        self.reconnect_attempt = self.reconnect_attempt.saturating_add(1);
        self.next_timer_token += 1;
        self.pending_timer = Some(self.next_timer_token);
        effects.push(Effect::ScheduleReconnect {
            token: self.next_timer_token,
            delay,
        });
    }
}
