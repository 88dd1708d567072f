//! Relay behavior over in-memory sockets
//!
//! Each test wires a MemorySessionStore to one or more Connections whose
//! outbound side is a ChannelSink, then drives them with raw JSON frames.

use filedrop_core::{MemorySessionStore, RecordId, SessionStore};
use filedrop_signal::mock::{recv_envelope, ChannelSink};
use filedrop_signal::{Connection, Envelope, Frame, MessageType, Role};
use futures::channel::mpsc as fmpsc;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(150);

struct Session {
    store: Arc<MemorySessionStore>,
    files_id: RecordId,
    signaling_id: RecordId,
}

async fn session() -> Session {
    let store = Arc::new(MemorySessionStore::new());
    let files_id = store
        .create_files_record(
            "user-secret".into(),
            "files-secret".into(),
            Vec::new(),
            Duration::from_secs(3600),
        )
        .await
        .unwrap();
    let signaling_id = store
        .create_signaling_record(files_id.as_str())
        .await
        .unwrap();
    Session {
        store,
        files_id,
        signaling_id,
    }
}

fn connect(
    store: &Arc<MemorySessionStore>,
    role: Role,
    bound_id: &RecordId,
) -> (Connection, mpsc::UnboundedReceiver<String>) {
    let (sink, rx) = ChannelSink::new();
    let store: Arc<dyn SessionStore> = store.clone();
    (Connection::new(role, bound_id.as_str(), store, sink), rx)
}

/// Dispatch one frame and wait until it has been processed
async fn send(conn: &Connection, frame: serde_json::Value) {
    conn.dispatch(frame.to_string().into_bytes()).await.unwrap();
}

async fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> Envelope {
    tokio::time::timeout(TIMEOUT, recv_envelope(rx))
        .await
        .expect("timed out waiting for an envelope")
        .expect("sink closed")
}

async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<String>) {
    if let Ok(Some(text)) = tokio::time::timeout(QUIET, rx.recv()).await {
        panic!("unexpected frame: {}", text);
    }
}

async fn listen_host(s: &Session) -> (Connection, mpsc::UnboundedReceiver<String>) {
    let (host, rx) = connect(&s.store, Role::Host, &s.files_id);
    send(
        &host,
        json!({"type": 0, "data": {"url": s.files_id.as_str(), "passwordFiles": "files-secret"}}),
    )
    .await;
    (host, rx)
}

#[tokio::test]
async fn unknown_type_yields_one_error_and_connection_stays_open() {
    let s = session().await;
    let (conn, mut rx) = connect(&s.store, Role::Connector, &s.signaling_id);
    let (tx, frames) = fmpsc::unbounded::<Result<Frame, Infallible>>();
    let serve = tokio::spawn(conn.serve(frames));

    tx.unbounded_send(Ok(Frame::Text(json!({"type": 99, "data": {}}).to_string())))
        .unwrap();
    let err = next(&mut rx).await;
    assert_eq!(err.message_type(), Some(MessageType::Error));
    assert!(err.data["msg"].as_str().unwrap().contains("unknown message type 99"));
    assert_quiet(&mut rx).await;

    // Still open: a later answer is applied
    tx.unbounded_send(Ok(Frame::Text(
        json!({"type": 4, "data": {"sdp": "v=0 later"}}).to_string(),
    )))
    .unwrap();
    tokio::time::timeout(TIMEOUT, async {
        loop {
            let record = s
                .store
                .signaling_record(s.signaling_id.as_str())
                .await
                .unwrap()
                .unwrap();
            if record.answer.is_some() {
                break record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(!serve.is_finished());

    drop(tx);
    tokio::time::timeout(TIMEOUT, serve).await.unwrap().unwrap();
}

#[tokio::test]
async fn malformed_frames_are_reported_per_stage() {
    let s = session().await;
    let (conn, mut rx) = connect(&s.store, Role::Connector, &s.signaling_id);

    conn.dispatch(b"{not json".to_vec()).await.unwrap();
    let msg = next(&mut rx).await.data["msg"].as_str().unwrap().to_string();
    assert!(msg.starts_with("error decoding message:"), "{}", msg);

    send(&conn, json!({"type": 2, "data": {"candidate": "wrong"}})).await;
    let msg = next(&mut rx).await.data["msg"].as_str().unwrap().to_string();
    assert!(msg.starts_with("error decoding message data:"), "{}", msg);

    send(&conn, json!({"type": 6, "data": {"msg": "spoofed"}})).await;
    let msg = next(&mut rx).await.data["msg"].as_str().unwrap().to_string();
    assert!(msg.starts_with("error getting message kind:"), "{}", msg);
}

#[tokio::test]
async fn host_mutation_without_signaling_id_is_a_storage_error() {
    let s = session().await;
    let (host, mut rx) = connect(&s.store, Role::Host, &s.files_id);

    send(&host, json!({"type": 4, "data": {"sdp": "v=0"}})).await;
    let err = next(&mut rx).await;
    assert_eq!(err.message_type(), Some(MessageType::Error));
    assert!(err.data["msg"]
        .as_str()
        .unwrap()
        .starts_with("error processing message:"));
}

#[tokio::test]
async fn offer_candidates_reach_host_in_append_order() {
    let s = session().await;
    let (_host, mut host_rx) = listen_host(&s).await;
    let (conn, _conn_rx) = connect(&s.store, Role::Connector, &s.signaling_id);

    let candidates: Vec<String> = (0..5).map(|i| format!("candidate:{}", i)).collect();
    for c in &candidates {
        send(&conn, json!({"type": 2, "data": {"ice": c}})).await;
    }

    for c in &candidates {
        let env = next(&mut host_rx).await;
        assert_eq!(env.message_type(), Some(MessageType::OfferIceCandidate));
        assert_eq!(env.signaling_id.as_deref(), Some(s.signaling_id.as_str()));
        assert_eq!(env.data, json!({"ice": c}));
    }
    assert_quiet(&mut host_rx).await;

    let record = s
        .store
        .signaling_record(s.signaling_id.as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.offer_ice, candidates);
}

#[tokio::test]
async fn answer_candidates_reach_connector_in_append_order() {
    let s = session().await;
    let (conn, mut conn_rx) = connect(&s.store, Role::Connector, &s.signaling_id);
    send(&conn, json!({"type": 1, "data": {}})).await;

    let (host, _host_rx) = connect(&s.store, Role::Host, &s.files_id);
    for i in 0..4 {
        send(
            &host,
            json!({"type": 3, "signalingId": s.signaling_id.as_str(), "data": {"ice": format!("a{}", i)}}),
        )
        .await;
    }

    for i in 0..4 {
        let env = next(&mut conn_rx).await;
        assert_eq!(env.message_type(), Some(MessageType::AnswerIceCandidate));
        assert_eq!(env.signaling_id, None);
        assert_eq!(env.data["ice"], format!("a{}", i));
    }
    assert_quiet(&mut conn_rx).await;
}

#[tokio::test]
async fn connector_never_sees_offer_side_events() {
    let s = session().await;
    let (conn, mut conn_rx) = connect(&s.store, Role::Connector, &s.signaling_id);
    send(&conn, json!({"type": 1, "data": {}})).await;

    send(&conn, json!({"type": 5, "data": {"sdp": "offer"}})).await;
    send(&conn, json!({"type": 2, "data": {"ice": "o0"}})).await;
    send(&conn, json!({"type": 2, "data": {"ice": "o1"}})).await;
    assert_quiet(&mut conn_rx).await;

    let (host, _host_rx) = connect(&s.store, Role::Host, &s.files_id);
    send(
        &host,
        json!({"type": 4, "signalingId": s.signaling_id.as_str(), "data": {"sdp": "answer"}}),
    )
    .await;

    let env = next(&mut conn_rx).await;
    assert_eq!(env.message_type(), Some(MessageType::NewAnswer));
    assert_eq!(env.data["sdp"], "answer");
    assert_quiet(&mut conn_rx).await;
}

#[tokio::test]
async fn wrong_files_secret_is_rejected_without_subscribing() {
    let s = session().await;
    let (host, mut rx) = connect(&s.store, Role::Host, &s.files_id);

    send(
        &host,
        json!({"type": 0, "data": {"url": s.files_id.as_str(), "passwordFiles": "user-secret"}}),
    )
    .await;
    let err = next(&mut rx).await;
    assert_eq!(err.message_type(), Some(MessageType::Error));
    assert!(err.data["msg"].as_str().unwrap().contains("invalid password"));

    s.store
        .update_signaling_record(
            s.signaling_id.as_str(),
            filedrop_core::FieldMutation::SetAnswer("v=0".into()),
        )
        .await
        .unwrap();
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn offers_are_last_write_wins_and_not_deduplicated() {
    let s = session().await;
    let (_host, mut host_rx) = listen_host(&s).await;
    let (conn, _conn_rx) = connect(&s.store, Role::Connector, &s.signaling_id);

    send(&conn, json!({"type": 5, "data": {"sdp": "A"}})).await;
    send(&conn, json!({"type": 5, "data": {"sdp": "B"}})).await;

    let first = next(&mut host_rx).await;
    let second = next(&mut host_rx).await;
    assert_eq!(first.message_type(), Some(MessageType::NewOffer));
    assert_eq!(second.message_type(), Some(MessageType::NewOffer));
    assert_eq!(first.data["sdp"], "A");
    assert_eq!(second.data["sdp"], "B");
    assert_quiet(&mut host_rx).await;

    let record = s
        .store
        .signaling_record(s.signaling_id.as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.offer.as_deref(), Some("B"));
}

#[tokio::test]
async fn one_host_relays_many_negotiations() {
    let s = session().await;
    let other = s
        .store
        .create_signaling_record(s.files_id.as_str())
        .await
        .unwrap();
    let (_host, mut host_rx) = listen_host(&s).await;
    let (conn_a, _a) = connect(&s.store, Role::Connector, &s.signaling_id);
    let (conn_b, _b) = connect(&s.store, Role::Connector, &other);

    send(&conn_a, json!({"type": 5, "data": {"sdp": "from-a"}})).await;
    send(&conn_b, json!({"type": 5, "data": {"sdp": "from-b"}})).await;

    let first = next(&mut host_rx).await;
    let second = next(&mut host_rx).await;
    assert_eq!(first.signaling_id.as_deref(), Some(s.signaling_id.as_str()));
    assert_eq!(first.data["sdp"], "from-a");
    assert_eq!(second.signaling_id.as_deref(), Some(other.as_str()));
    assert_eq!(second.data["sdp"], "from-b");
}

#[tokio::test]
async fn connector_ignores_envelope_signaling_id() {
    let s = session().await;
    let other = s
        .store
        .create_signaling_record(s.files_id.as_str())
        .await
        .unwrap();
    let (conn, _rx) = connect(&s.store, Role::Connector, &s.signaling_id);

    send(
        &conn,
        json!({"type": 5, "signalingId": other.as_str(), "data": {"sdp": "mine"}}),
    )
    .await;

    let bound = s
        .store
        .signaling_record(s.signaling_id.as_str())
        .await
        .unwrap()
        .unwrap();
    let untouched = s.store.signaling_record(other.as_str()).await.unwrap().unwrap();
    assert_eq!(bound.offer.as_deref(), Some("mine"));
    assert_eq!(untouched.offer, None);
}

#[tokio::test]
async fn scenario_answer_relayed_to_host_with_session_tag() {
    let s = session().await;
    let (_host, mut host_rx) = listen_host(&s).await;
    let (conn, _rx) = connect(&s.store, Role::Connector, &s.signaling_id);

    send(
        &conn,
        json!({"type": 4, "signalingId": s.signaling_id.as_str(), "data": {"sdp": "v=0..."}}),
    )
    .await;

    let record = s
        .store
        .signaling_record(s.signaling_id.as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.answer.as_deref(), Some("v=0..."));

    let env = next(&mut host_rx).await;
    let wire: serde_json::Value = serde_json::from_str(&env.to_text().unwrap()).unwrap();
    assert_eq!(
        wire,
        json!({"type": 4, "signalingId": s.signaling_id.as_str(), "data": {"sdp": "v=0..."}})
    );
}

#[tokio::test]
async fn closing_sockets_deletes_bound_records() {
    let s = session().await;

    let (conn, _conn_rx) = connect(&s.store, Role::Connector, &s.signaling_id);
    let (tx, frames) = fmpsc::unbounded::<Result<Frame, Infallible>>();
    tx.unbounded_send(Ok(Frame::Close)).unwrap();
    conn.serve(frames).await;
    assert!(s
        .store
        .signaling_record(s.signaling_id.as_str())
        .await
        .unwrap()
        .is_none());

    let (host, _host_rx) = connect(&s.store, Role::Host, &s.files_id);
    let (_tx, frames) = fmpsc::unbounded::<Result<Frame, &'static str>>();
    let _ = _tx.unbounded_send(Err("connection reset"));
    host.serve(frames).await;
    assert_eq!(s.store.files_count(), 0);

    // Already gone: cleanup is a no-op
    let (again, _rx) = connect(&s.store, Role::Host, &s.files_id);
    again.close().await;
    assert_eq!(s.store.files_count(), 0);
}

#[tokio::test]
async fn subscription_stops_after_socket_goes_away() {
    let s = session().await;
    let (conn, conn_rx) = connect(&s.store, Role::Connector, &s.signaling_id);
    send(&conn, json!({"type": 1, "data": {}})).await;
    drop(conn_rx);

    // The next relayed event fails to send and ends the subscription; the
    // store keeps accepting updates regardless.
    let (host, mut host_rx) = connect(&s.store, Role::Host, &s.files_id);
    for sdp in ["one", "two"] {
        send(
            &host,
            json!({"type": 4, "signalingId": s.signaling_id.as_str(), "data": {"sdp": sdp}}),
        )
        .await;
    }
    assert_quiet(&mut host_rx).await;
    let record = s
        .store
        .signaling_record(s.signaling_id.as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.answer.as_deref(), Some("two"));
}

async fn wait_for_subscribers(store: &MemorySessionStore, expected: usize) {
    tokio::time::timeout(TIMEOUT, async {
        while store.subscriber_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected {} live subscriptions", expected));
}

#[tokio::test]
async fn connector_relay_ends_with_its_socket() {
    let s = session().await;
    let (conn, conn_rx) = connect(&s.store, Role::Connector, &s.signaling_id);
    let (tx, frames) = fmpsc::unbounded::<Result<Frame, Infallible>>();
    let serve = tokio::spawn(conn.serve(frames));

    tx.unbounded_send(Ok(Frame::Text(json!({"type": 1, "data": {}}).to_string())))
        .unwrap();
    wait_for_subscribers(&s.store, 1).await;

    tx.unbounded_send(Ok(Frame::Close)).unwrap();
    tokio::time::timeout(TIMEOUT, serve).await.unwrap().unwrap();
    assert_eq!(s.store.signaling_count(), 0);

    // The record is gone, so no update will ever reach the relay; the closed
    // socket alone has to end it.
    drop(conn_rx);
    wait_for_subscribers(&s.store, 0).await;
}

#[tokio::test]
async fn connector_with_malformed_bound_id_cannot_listen() {
    let s = session().await;
    let (sink, mut rx) = ChannelSink::new();
    let store: Arc<dyn SessionStore> = s.store.clone();
    let conn = Connection::new(Role::Connector, "not-hex", store, sink);

    send(&conn, json!({"type": 1})).await;
    let err = next(&mut rx).await;
    assert_eq!(err.message_type(), Some(MessageType::Error));
    let msg = err.data["msg"].as_str().unwrap();
    assert!(
        msg.starts_with("error processing message: invalid record id"),
        "{}",
        msg
    );
    assert_quiet(&mut rx).await;
    assert_eq!(s.store.subscriber_count(), 0);
}

#[tokio::test]
async fn host_listen_conn_without_signaling_id_is_rejected() {
    let s = session().await;
    let (host, mut rx) = connect(&s.store, Role::Host, &s.files_id);

    send(&host, json!({"type": 1})).await;
    let err = next(&mut rx).await;
    assert_eq!(err.message_type(), Some(MessageType::Error));
    let msg = err.data["msg"].as_str().unwrap();
    assert!(
        msg.starts_with("error processing message: invalid record id"),
        "{}",
        msg
    );
    assert_quiet(&mut rx).await;
    assert_eq!(s.store.subscriber_count(), 0);
}
