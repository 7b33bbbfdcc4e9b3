//! Connection manager: owns one sync state machine and runs its effects.
//!
//! All state changes go through a single actor task on a dedicated runtime
//! thread. The public handle, transport readers and reconnect timers only
//! push messages into its mailbox; readers copy what they need out of the
//! shared state under a short lock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use jobsync_core::{
    update, ConnectionState, Effect, JobId, JobRecord, Msg, SubscriptionFilter, SyncState,
    SyncViewModel, VideoId,
};
use jobsync_logging::{sync_debug, sync_info, sync_warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::credential::CredentialSource;
use crate::transport::{Connector, Link, TransportEvent, WsConnector};
use crate::{EngineError, SyncSettings};

enum Input {
    Msg(Msg),
    LinkReady { generation: u64, link: Link },
    Shutdown,
}

/// Handle to a running sync engine. Commands are applied asynchronously by
/// the engine thread; use [`ConnectionManager::changes`] to wait for them.
///
/// Reconnects after transport failures continue indefinitely with capped
/// backoff until [`ConnectionManager::disconnect`] is called. Callers wanting
/// a retry ceiling can watch [`ConnectionManager::reconnect_attempt`].
pub struct ConnectionManager {
    input_tx: mpsc::UnboundedSender<Input>,
    shared: Arc<Mutex<SyncState>>,
    changes_rx: watch::Receiver<u64>,
}

impl ConnectionManager {
    /// Starts an engine that talks WebSocket to `settings.events_url`.
    pub fn new(settings: SyncSettings) -> Result<Self, EngineError> {
        let connector = Arc::new(WsConnector::new(settings.connect_timeout));
        Self::with_connector(settings, connector)
    }

    pub fn with_connector(
        settings: SyncSettings,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, EngineError> {
        settings.validate()?;

        let shared = Arc::new(Mutex::new(SyncState::new(settings.core_config())));
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (changes_tx, changes_rx) = watch::channel(0u64);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let actor = Actor {
            shared: shared.clone(),
            connector,
            url: settings.events_url,
            input_tx: input_tx.clone(),
            changes_tx,
            opening: None,
            link: None,
            timer: None,
        };
        thread::Builder::new()
            .name("jobsync-engine".to_string())
            .spawn(move || runtime.block_on(actor.run(input_rx)))?;

        Ok(Self {
            input_tx,
            shared,
            changes_rx,
        })
    }

    fn send(&self, msg: Msg) {
        let _ = self.input_tx.send(Input::Msg(msg));
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connect with an access token. An empty token puts the manager into
    /// the error state without opening anything.
    pub fn connect(&self, credential: impl Into<String>) {
        self.send(Msg::Connect {
            credential: credential.into(),
        });
    }

    pub fn connect_with(&self, source: &dyn CredentialSource) {
        self.connect(source.access_token().unwrap_or_default());
    }

    /// Close the transport and stop reconnecting until the next `connect`.
    /// Safe to call in any state.
    pub fn disconnect(&self) {
        self.send(Msg::Disconnect);
    }

    pub fn update_subscription(&self, filter: SubscriptionFilter) {
        self.send(Msg::UpdateSubscription(filter));
    }

    /// Merge records fetched over REST; jobs already known from the socket
    /// keep their socket state.
    pub fn merge_rest_snapshot(&self, records: Vec<JobRecord>) {
        self.send(Msg::MergeRestSnapshot(records));
    }

    pub fn remove_job(&self, job_id: impl Into<JobId>) {
        self.send(Msg::RemoveJob(job_id.into()));
    }

    pub fn clear_jobs(&self) {
        self.send(Msg::ClearJobs);
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state().connection()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state().last_error().map(ToOwned::to_owned)
    }

    pub fn reconnect_attempt(&self) -> u32 {
        self.state().reconnect_attempt()
    }

    pub fn filter(&self) -> SubscriptionFilter {
        self.state().filter().clone()
    }

    pub fn jobs(&self) -> Vec<JobRecord> {
        self.state().store().iter().cloned().collect()
    }

    pub fn job(&self, job_id: &str) -> Option<JobRecord> {
        self.state().store().get(job_id).cloned()
    }

    pub fn jobs_for_video(&self, video_id: VideoId) -> Vec<JobRecord> {
        self.state()
            .store()
            .jobs_for_video(video_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn active_jobs(&self) -> Vec<JobRecord> {
        self.state()
            .store()
            .active_jobs()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn view(&self) -> SyncViewModel {
        self.state().view()
    }

    /// Revision counter bumped after every visible change.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changes_rx.clone()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let _ = self.input_tx.send(Input::Shutdown);
    }
}

struct OpenLink {
    generation: u64,
    outbound: mpsc::UnboundedSender<String>,
    shutdown: tokio_util::sync::CancellationToken,
    reader: JoinHandle<()>,
}

struct Opening {
    generation: u64,
    task: JoinHandle<()>,
}

struct Actor {
    shared: Arc<Mutex<SyncState>>,
    connector: Arc<dyn Connector>,
    url: String,
    input_tx: mpsc::UnboundedSender<Input>,
    changes_tx: watch::Sender<u64>,
    opening: Option<Opening>,
    link: Option<OpenLink>,
    timer: Option<JoinHandle<()>>,
}

impl Actor {
    async fn run(mut self, mut input_rx: mpsc::UnboundedReceiver<Input>) {
        while let Some(input) = input_rx.recv().await {
            match input {
                Input::Msg(msg) => self.dispatch(msg),
                Input::LinkReady { generation, link } => self.attach(generation, link),
                Input::Shutdown => break,
            }
        }
        self.close_link();
        self.cancel_timer();
        sync_debug!("Engine actor stopped");
    }

    fn dispatch(&mut self, msg: Msg) {
        let (effects, changed) = {
            let mut guard = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
            let state = std::mem::take(&mut *guard);
            let (mut state, effects) = update(state, msg);
            let changed = state.consume_dirty();
            *guard = state;
            (effects, changed)
        };

        if changed {
            self.changes_tx.send_modify(|revision| *revision += 1);
        }
        for effect in effects {
            self.run_effect(effect);
        }
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::OpenTransport { generation } => self.open(generation),
            Effect::CloseTransport => self.close_link(),
            Effect::Send(frame) => match &self.link {
                Some(link) => {
                    sync_debug!("Sending {} frame", frame.kind());
                    if link.outbound.send(frame.encode()).is_err() {
                        sync_debug!("Dropped {} frame: link already closed", frame.kind());
                    }
                }
                None => sync_debug!("Dropped {} frame: no open link", frame.kind()),
            },
            Effect::ScheduleReconnect { token, delay } => {
                self.cancel_timer();
                sync_info!("Reconnecting in {:?}", delay);
                let input_tx = self.input_tx.clone();
                self.timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = input_tx.send(Input::Msg(Msg::ReconnectTimerFired { token }));
                }));
            }
            Effect::CancelReconnect => self.cancel_timer(),
        }
    }

    fn open(&mut self, generation: u64) {
        // Never two transports at once.
        self.close_link();

        let connector = self.connector.clone();
        let url = self.url.clone();
        let input_tx = self.input_tx.clone();
        let task = tokio::spawn(async move {
            let input = match connector.connect(&url).await {
                Ok(link) => Input::LinkReady { generation, link },
                Err(err) => Input::Msg(Msg::TransportError {
                    generation,
                    message: err.to_string(),
                }),
            };
            let _ = input_tx.send(input);
        });
        self.opening = Some(Opening { generation, task });
    }

    fn attach(&mut self, generation: u64, link: Link) {
        if self.opening.as_ref().map(|opening| opening.generation) != Some(generation) {
            sync_debug!("Discarding link for abandoned transport {}", generation);
            link.shutdown.cancel();
            return;
        }
        self.opening = None;

        let Link {
            outbound,
            mut inbound,
            shutdown,
        } = link;
        let input_tx = self.input_tx.clone();
        let reader = tokio::spawn(async move {
            let mut finished = false;
            while let Some(event) = inbound.recv().await {
                let msg = match event {
                    TransportEvent::Frame(text) => Msg::FrameReceived { generation, text },
                    TransportEvent::Closed { reason } => {
                        finished = true;
                        Msg::TransportClosed { generation, reason }
                    }
                    TransportEvent::Error(message) => {
                        finished = true;
                        Msg::TransportError {
                            generation,
                            message,
                        }
                    }
                };
                if input_tx.send(Input::Msg(msg)).is_err() || finished {
                    return;
                }
            }
            let _ = input_tx.send(Input::Msg(Msg::TransportClosed {
                generation,
                reason: None,
            }));
        });

        self.link = Some(OpenLink {
            generation,
            outbound,
            shutdown,
            reader,
        });
        self.dispatch(Msg::TransportOpened { generation });
    }

    fn close_link(&mut self) {
        if let Some(opening) = self.opening.take() {
            opening.task.abort();
        }
        if let Some(link) = self.link.take() {
            sync_debug!("Closing transport {}", link.generation);
            link.shutdown.cancel();
            link.reader.abort();
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for Actor {
    fn drop(&mut self) {
        if self.link.is_some() || self.opening.is_some() {
            sync_warn!("Engine actor dropped with a live transport");
            self.close_link();
        }
    }
}
