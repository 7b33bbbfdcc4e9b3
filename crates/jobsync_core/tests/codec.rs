use jobsync_core::{
    decode, parse_timestamp, DecodeError, EnvelopeBody, EventKind, JobStatus, OutboundFrame,
    SubscriptionController, SubscriptionFilter,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn init_logging() {
    jobsync_logging::initialize_for_tests();
}

#[test]
fn rejects_frames_that_are_not_json_objects() {
    init_logging();
    assert!(matches!(decode("{not json"), Err(DecodeError::Malformed(_))));
    assert_eq!(decode("[1, 2]"), Err(DecodeError::NotAnObject));
    assert_eq!(decode("\"ping\""), Err(DecodeError::NotAnObject));
}

#[test]
fn rejects_objects_without_kind_tag() {
    init_logging();
    assert_eq!(decode(r#"{"payload": {"job_id": "a"}}"#), Err(DecodeError::MissingKind));
    assert_eq!(decode(r#"{"type": 5}"#), Err(DecodeError::MissingKind));
}

#[test]
fn decodes_control_frames() {
    init_logging();
    assert_eq!(decode(r#"{"type":"ping"}"#).unwrap().kind, EventKind::Ping);
    assert_eq!(
        decode(r#"{"type":"auth_success"}"#).unwrap().kind,
        EventKind::AuthSuccess
    );
    assert_eq!(
        decode(r#"{"type":"subscribe_jobs_success"}"#).unwrap().kind,
        EventKind::SubscribeSuccess
    );

    let rejected = decode(r#"{"type":"auth_error","message":"token expired"}"#).unwrap();
    assert_eq!(rejected.kind, EventKind::AuthError);
    assert_eq!(
        rejected.body,
        EnvelopeBody::AuthError {
            message: Some("token expired".to_string())
        }
    );
}

#[test]
fn unknown_kinds_are_accepted_without_payload_checks() {
    init_logging();
    let envelope = decode(r#"{"type":"server_notice","text":"maintenance"}"#).unwrap();
    assert_eq!(envelope.kind, EventKind::Unknown("server_notice".to_string()));
    match envelope.body {
        EnvelopeBody::Other(fields) => assert_eq!(fields["text"], json!("maintenance")),
        other => panic!("unexpected body {other:?}"),
    }
}

#[test]
fn decodes_nested_job_event() {
    init_logging();
    let raw = json!({
        "event_type": "job_progress",
        "timestamp": "2024-05-01T10:00:00Z",
        "payload": {
            "job_id": "dl-1",
            "job_type": "download",
            "progress": 0.5,
            "current_step": "fetching",
            "processed_items": 5,
            "total_items": 10,
            "speed": 2048.0,
            "metadata": {"video_id": 7},
            "shard": "eu-1"
        }
    })
    .to_string();

    let envelope = decode(&raw).unwrap();
    assert_eq!(envelope.kind, EventKind::JobProgress);
    assert_eq!(envelope.timestamp, parse_timestamp("2024-05-01T10:00:00Z"));

    let payload = envelope.job_payload().unwrap();
    assert_eq!(payload.job_id, "dl-1");
    assert_eq!(payload.job_type.as_deref(), Some("download"));
    assert_eq!(payload.progress, Some(0.5));
    assert_eq!(payload.processed_items, Some(5));
    assert_eq!(payload.total_items, Some(10));
    assert_eq!(payload.speed, Some(2048.0));
    assert_eq!(payload.extra.get("shard"), Some(&json!("eu-1")));
}

#[test]
fn accepts_inline_job_fields_next_to_type() {
    init_logging();
    let envelope = decode(r#"{"type":"job_completed","job_id":"x","result":{"files":3}}"#).unwrap();
    assert_eq!(envelope.kind, EventKind::JobCompleted);
    let payload = envelope.job_payload().unwrap();
    assert_eq!(payload.job_id, "x");
    assert_eq!(payload.result.as_ref().unwrap()["files"], json!(3));
    assert!(!payload.extra.contains_key("type"));
}

#[test]
fn rejects_job_event_without_job_id() {
    init_logging();
    let err = decode(r#"{"event_type":"job_started","payload":{"progress":0}}"#).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidPayload { ref kind, .. } if kind == "job_started"));

    let err = decode(r#"{"event_type":"job_failed","payload":"boom"}"#).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidPayload { .. }));
}

#[test]
fn snapshot_drops_malformed_entries_only() {
    init_logging();
    let raw = json!({
        "type": "job_state",
        "jobs": [
            {"id": "j1", "job_type": "scan", "status": "running", "progress": 0.2},
            {"status": "running"},
            {"job_id": "j2", "status": "mystery", "processed_items": null}
        ]
    })
    .to_string();

    let envelope = decode(&raw).unwrap();
    let EnvelopeBody::Snapshot(jobs) = envelope.body else {
        panic!("expected snapshot");
    };
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].id, "j1");
    assert_eq!(jobs[0].kind, "scan");
    assert_eq!(jobs[0].status, JobStatus::Running);
    assert_eq!(jobs[0].progress, 0.2);
    assert_eq!(jobs[1].id, "j2");
    assert_eq!(jobs[1].status, JobStatus::Pending);
    assert_eq!(jobs[1].processed_items, 0);
}

#[test]
fn timestamps_are_lenient() {
    init_logging();
    assert!(parse_timestamp("2024-05-01T10:00:00.250+02:00").is_some());
    assert_eq!(
        parse_timestamp("2024-05-01T10:00:00"),
        parse_timestamp("2024-05-01T10:00:00Z")
    );
    assert_eq!(parse_timestamp("yesterday"), None);

    // A bad timestamp does not reject the frame.
    let envelope =
        decode(r#"{"event_type":"job_started","timestamp":"soon","payload":{"job_id":"a","started_at":"later"}}"#)
            .unwrap();
    assert_eq!(envelope.timestamp, None);
    assert_eq!(envelope.job_payload().unwrap().started_at, None);
}

#[test]
fn outbound_frames_encode_to_wire_shape() {
    init_logging();
    let auth: Value = serde_json::from_str(
        &OutboundFrame::Auth {
            token: "tok".to_string(),
        }
        .encode(),
    )
    .unwrap();
    assert_eq!(auth, json!({"type": "auth", "token": "tok"}));

    let controller = SubscriptionController::new(
        SubscriptionFilter::new()
            .with_job_types(["download"])
            .with_job_ids(Vec::<String>::new())
            .with_video_ids([7]),
    );
    let subscribe: Value =
        serde_json::from_str(&OutboundFrame::Subscribe(controller.current_subscribe_request()).encode())
            .unwrap();
    assert_eq!(
        subscribe,
        json!({"type": "subscribe_jobs", "job_types": ["download"], "include_active_state": true})
    );

    let pong: Value = serde_json::from_str(
        &OutboundFrame::Pong {
            kind: "heartbeat_ack".to_string(),
        }
        .encode(),
    )
    .unwrap();
    assert_eq!(pong, json!({"type": "heartbeat_ack"}));
}

#[test]
fn auth_frame_debug_hides_token() {
    let frame = OutboundFrame::Auth {
        token: "secret-token".to_string(),
    };
    assert!(!format!("{frame:?}").contains("secret-token"));
}
