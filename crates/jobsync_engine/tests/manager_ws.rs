use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use jobsync_core::{ConnectionState, JobStatus};
use jobsync_engine::{ConnectionManager, SyncSettings};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

fn init_logging() {
    jobsync_logging::initialize_for_tests();
}

type ServerSocket = WebSocketStream<TcpStream>;

/// Accepts WebSocket clients on a loopback port and runs `script` for each.
async fn serve<F, Fut>(script: F) -> (String, Arc<AtomicUsize>)
where
    F: Fn(usize, ServerSocket) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("ws://{}/ws/jobs", listener.local_addr().expect("addr"));
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let Ok(socket) = accept_async(stream).await else {
                continue;
            };
            tokio::spawn(script(index, socket));
        }
    });
    (url, accepted)
}

async fn recv_json(socket: &mut ServerSocket) -> Option<Value> {
    while let Some(Ok(message)) = socket.next().await {
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).ok();
        }
    }
    None
}

async fn send_json(socket: &mut ServerSocket, frame: Value) {
    let _ = socket.send(Message::text(frame.to_string())).await;
}

/// Checks the auth frame and accepts it; returns false when the token is wrong.
async fn handshake(socket: &mut ServerSocket) -> bool {
    let Some(auth) = recv_json(socket).await else {
        return false;
    };
    if auth != json!({"type": "auth", "token": "tok"}) {
        send_json(socket, json!({"type": "auth_error", "message": "invalid token"})).await;
        return false;
    }
    send_json(socket, json!({"type": "auth_success"})).await;
    let _subscribe = recv_json(socket).await;
    send_json(socket, json!({"type": "subscribe_jobs_success"})).await;
    true
}

async fn drain(socket: &mut ServerSocket) {
    while recv_json(socket).await.is_some() {}
}

fn settings(url: String) -> SyncSettings {
    SyncSettings {
        reconnect_base: Duration::from_millis(20),
        reconnect_cap: Duration::from_millis(100),
        connect_timeout: Duration::from_secs(2),
        ..SyncSettings::with_url(url)
    }
}

async fn wait_for(manager: &ConnectionManager, mut done: impl FnMut(&ConnectionManager) -> bool) {
    let mut changes = manager.changes();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !done(manager) {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached");
        let _ = tokio::time::timeout(Duration::from_millis(25), changes.changed()).await;
    }
}

#[tokio::test]
async fn streams_job_lifecycle_over_websocket() {
    init_logging();
    let (url, _accepted) = serve(|_, mut socket| async move {
        if !handshake(&mut socket).await {
            return;
        }
        send_json(
            &mut socket,
            json!({"type": "job_state", "jobs": [
                {"id": "j1", "job_type": "transcode", "status": "pending"}
            ]}),
        )
        .await;
        send_json(
            &mut socket,
            json!({
                "event_type": "job_started",
                "timestamp": "2026-01-05T10:00:00Z",
                "payload": {"job_id": "j1"}
            }),
        )
        .await;
        send_json(
            &mut socket,
            json!({"type": "job_progress", "job_id": "j1", "progress": 0.5}),
        )
        .await;
        send_json(
            &mut socket,
            json!({"type": "job_completed", "payload": {"job_id": "j1", "result": {"ok": true}}}),
        )
        .await;
        drain(&mut socket).await;
    })
    .await;

    let manager = ConnectionManager::new(settings(url)).expect("manager");
    manager.connect("tok");

    wait_for(&manager, |m| {
        m.job("j1")
            .is_some_and(|job| job.status == JobStatus::Completed)
    })
    .await;
    let job = manager.job("j1").expect("job tracked");
    assert_eq!(job.progress, 1.0);
    assert!(job.started_at.is_some());
    assert_eq!(manager.connection_state(), ConnectionState::Connected);

    manager.disconnect();
    wait_for(&manager, |m| m.connection_state() == ConnectionState::Disconnected).await;
}

#[tokio::test]
async fn answers_server_ping() {
    init_logging();
    let (pong_tx, mut pong_rx) = tokio::sync::mpsc::unbounded_channel();
    let (url, _accepted) = serve(move |_, mut socket| {
        let pong_tx = pong_tx.clone();
        async move {
            if !handshake(&mut socket).await {
                return;
            }
            send_json(&mut socket, json!({"type": "ping"})).await;
            if let Some(reply) = recv_json(&mut socket).await {
                let _ = pong_tx.send(reply);
            }
            drain(&mut socket).await;
        }
    })
    .await;

    let manager = ConnectionManager::new(settings(url)).expect("manager");
    manager.connect("tok");

    let reply = tokio::time::timeout(Duration::from_secs(5), pong_rx.recv())
        .await
        .expect("pong in time");
    assert_eq!(reply, Some(json!({"type": "pong"})));
}

#[tokio::test]
async fn reconnects_after_server_drops_connection() {
    init_logging();
    let (url, accepted) = serve(|index, mut socket| async move {
        if !handshake(&mut socket).await {
            return;
        }
        if index == 0 {
            let _ = socket.close(None).await;
            return;
        }
        drain(&mut socket).await;
    })
    .await;

    let manager = ConnectionManager::new(settings(url)).expect("manager");
    manager.connect("tok");

    wait_for(&manager, |_| accepted.load(Ordering::SeqCst) >= 2).await;
    wait_for(&manager, |m| m.connection_state() == ConnectionState::Connected).await;
    assert_eq!(manager.reconnect_attempt(), 0);
}

#[tokio::test]
async fn rejected_token_stops_reconnecting() {
    init_logging();
    let (url, accepted) = serve(|_, mut socket| async move {
        handshake(&mut socket).await;
        drain(&mut socket).await;
    })
    .await;

    let manager = ConnectionManager::new(settings(url)).expect("manager");
    manager.connect("stale");

    wait_for(&manager, |m| m.connection_state() == ConnectionState::Error).await;
    assert_eq!(manager.last_error().as_deref(), Some("invalid token"));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(manager.connection_state(), ConnectionState::Error);
}

#[tokio::test]
async fn unreachable_server_reports_error_and_keeps_retrying() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("ws://{}/ws/jobs", listener.local_addr().expect("addr"));
    drop(listener);

    let manager = ConnectionManager::new(settings(url)).expect("manager");
    manager.connect("tok");

    wait_for(&manager, |m| m.reconnect_attempt() >= 2).await;
    assert!(manager.last_error().is_some());

    manager.disconnect();
    wait_for(&manager, |m| m.connection_state() == ConnectionState::Disconnected).await;
}
