use jobsync_logging::{sync_debug, sync_info, sync_warn};

use crate::codec::{decode, EnvelopeBody, EventEnvelope, EventKind, OutboundFrame};
use crate::store::{ApplyOutcome, DiscardReason};
use crate::{ConnectionState, Effect, Msg, SyncState};

const MISSING_CREDENTIAL: &str = "missing credential";
const AUTH_REJECTED: &str = "authentication rejected";

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: SyncState, msg: Msg) -> (SyncState, Vec<Effect>) {
    let mut effects = Vec::new();
    match msg {
        Msg::Connect { credential } => {
            state.cancel_reconnect(&mut effects);
            if credential.trim().is_empty() {
                sync_warn!("Connect refused: {}", MISSING_CREDENTIAL);
                state.close_transport(&mut effects);
                state.credential = None;
                state.set_error(MISSING_CREDENTIAL);
                return (state, effects);
            }
            state.credential = Some(credential);
            state.manual_disconnect = false;
            state.auth_rejected = false;
            state.reconnect_attempt = 0;
            state.last_error = None;
            state.open_transport(&mut effects);
            sync_info!("Connecting (transport generation {})", state.generation);
        }
        Msg::Disconnect => {
            state.manual_disconnect = true;
            state.cancel_reconnect(&mut effects);
            state.close_transport(&mut effects);
            if state.connection != ConnectionState::Disconnected {
                sync_info!("Disconnected by caller");
            }
            state.set_connection(ConnectionState::Disconnected);
        }
        Msg::UpdateSubscription(filter) => {
            state.subscription.set_filter(filter);
            state.mark_dirty();
            if state.connection == ConnectionState::Connected && state.transport_open {
                effects.push(subscribe_frame(&state));
            }
        }
        Msg::TransportOpened { generation } => {
            if !state.is_live(generation) || state.connection != ConnectionState::Connecting {
                sync_debug!("Ignoring open of stale transport {}", generation);
                return (state, effects);
            }
            match state.credential.clone() {
                Some(token) => effects.push(Effect::Send(OutboundFrame::Auth { token })),
                None => {
                    state.close_transport(&mut effects);
                    state.set_error(MISSING_CREDENTIAL);
                }
            }
        }
        Msg::FrameReceived { generation, text } => {
            if !state.is_live(generation) {
                sync_debug!("Ignoring frame from stale transport {}", generation);
                return (state, effects);
            }
            match decode(&text) {
                Ok(envelope) => handle_envelope(&mut state, envelope, &mut effects),
                Err(err) => sync_warn!("Dropping inbound frame: {}", err),
            }
        }
        Msg::TransportClosed { generation, reason } => {
            if !state.is_live(generation) {
                return (state, effects);
            }
            state.transport_open = false;
            state.subscribed = false;
            sync_info!(
                "Transport {} closed: {}",
                generation,
                reason.as_deref().unwrap_or("no reason")
            );
            state.set_connection(ConnectionState::Disconnected);
            if !state.manual_disconnect && !state.auth_rejected {
                state.schedule_reconnect(&mut effects);
            }
        }
        Msg::TransportError {
            generation,
            message,
        } => {
            if !state.is_live(generation) {
                return (state, effects);
            }
            sync_warn!("Transport {} error: {}", generation, message);
            state.close_transport(&mut effects);
            state.set_error(message);
            if !state.manual_disconnect && !state.auth_rejected {
                state.schedule_reconnect(&mut effects);
            }
        }
        Msg::ReconnectTimerFired { token } => {
            if state.pending_timer != Some(token) {
                return (state, effects);
            }
            state.pending_timer = None;
            if state.manual_disconnect || state.auth_rejected {
                return (state, effects);
            }
            state.open_transport(&mut effects);
            sync_info!(
                "Reconnecting (attempt {}, transport generation {})",
                state.reconnect_attempt,
                state.generation
            );
        }
        Msg::MergeRestSnapshot(records) => {
            let inserted = state
                .store
                .merge_records(records, state.subscription.filter());
            sync_debug!("Merged {} REST job records", inserted);
            if inserted > 0 {
                state.mark_dirty();
            }
        }
        Msg::RemoveJob(job_id) => {
            if state.store.remove(&job_id).is_some() {
                state.mark_dirty();
            }
        }
        Msg::ClearJobs => {
            if !state.store.is_empty() {
                state.store.clear();
                state.mark_dirty();
            }
        }
    }

    (state, effects)
}

fn handle_envelope(state: &mut SyncState, envelope: EventEnvelope, effects: &mut Vec<Effect>) {
    match envelope.kind.clone() {
        EventKind::Ping => effects.push(Effect::Send(OutboundFrame::Pong {
            kind: state.pong_kind.clone(),
        })),
        EventKind::AuthSuccess => {
            if state.connection != ConnectionState::Connecting {
                sync_debug!("Ignoring auth_success while {}", state.connection);
                return;
            }
            sync_info!("Authenticated; subscribing");
            state.reconnect_attempt = 0;
            state.last_error = None;
            state.set_connection(ConnectionState::Connected);
            effects.push(subscribe_frame(state));
        }
        EventKind::AuthError => {
            let message = match &envelope.body {
                EnvelopeBody::AuthError {
                    message: Some(message),
                } => message.clone(),
                _ => AUTH_REJECTED.to_string(),
            };
            sync_warn!("Credential rejected: {}", message);
            state.auth_rejected = true;
            state.cancel_reconnect(effects);
            state.close_transport(effects);
            state.set_error(message);
        }
        EventKind::SubscribeSuccess => {
            sync_debug!("Subscription acknowledged");
            state.subscribed = true;
        }
        EventKind::Unknown(tag) => {
            sync_debug!("Ignoring unknown event kind {}", tag);
        }
        kind => {
            if state.connection != ConnectionState::Connected {
                sync_debug!("Ignoring {} before authentication", kind);
                return;
            }
            let outcome = state
                .store
                .apply_event(envelope, state.subscription.filter());
            match outcome {
                ApplyOutcome::Discarded(DiscardReason::OutOfScope) => {
                    sync_debug!("{} outside subscription filter", kind);
                }
                ApplyOutcome::Discarded(reason) => {
                    sync_debug!("Discarded {}: {:?}", kind, reason);
                }
                ApplyOutcome::Replaced { count } => {
                    sync_info!("Applied job snapshot with {} jobs", count);
                    state.mark_dirty();
                }
                ApplyOutcome::Created | ApplyOutcome::Updated | ApplyOutcome::Finalized => {
                    state.mark_dirty();
                }
            }
        }
    }
}

fn subscribe_frame(state: &SyncState) -> Effect {
    Effect::Send(OutboundFrame::Subscribe(
        state.subscription.current_subscribe_request(),
    ))
}
