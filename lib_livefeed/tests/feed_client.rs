//! End-to-end tests of the connection manager over a scripted in-memory
//! transport. Time-dependent tests run on the paused tokio clock, so backoff
//! delays elapse instantly and deterministically.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use lib_livefeed::transport::{Transport, TransportEvent, TransportLink};
use lib_livefeed::wire::{EMPLOYEES_TOPIC, SESSIONS_TOPIC};
use lib_livefeed::{ClientFrame, ConnectionState, EventType, FeedError, FeedService, ReconnectPolicy, ServerFrame};

/// The far side of one mock connection, handed to the test when the driver
/// connects.
struct ServerEnd {
    /// Frames the client sent over this connection.
    frames: mpsc::UnboundedReceiver<ClientFrame>,
    /// Pushes events (or a close) to the client.
    push: mpsc::Sender<TransportEvent>,
}

struct MockTransport {
    /// Connect attempts to reject before accepting one.
    failures: Arc<AtomicU32>,
    sessions: mpsc::UnboundedSender<ServerEnd>,
}

fn mock(failures: u32) -> (MockTransport, mpsc::UnboundedReceiver<ServerEnd>) {
    let (sessions_tx, sessions_rx) = mpsc::unbounded_channel();
    (
        MockTransport {
            failures: Arc::new(AtomicU32::new(failures)),
            sessions: sessions_tx,
        },
        sessions_rx,
    )
}

impl Transport for MockTransport {
    fn connect(&self) -> impl Future<Output = Result<TransportLink, FeedError>> + Send {
        let failures = Arc::clone(&self.failures);
        let sessions = self.sessions.clone();
        async move {
            let failing = failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(FeedError::Transport("connection refused".to_string()));
            }
            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let (inbound_tx, inbound_rx) = mpsc::channel(64);
            let _ = sessions.send(ServerEnd {
                frames: outbound_rx,
                push: inbound_tx,
            });
            Ok(TransportLink {
                outbound: outbound_tx,
                inbound: inbound_rx,
            })
        }
    }
}

fn event(topic: &str, event_type: &str, payload: serde_json::Value) -> TransportEvent {
    TransportEvent::Frame(ServerFrame {
        topic: topic.to_string(),
        body: json!({"eventType": event_type, "payload": payload}),
    })
}

fn session_payload(user: &str, status: &str) -> serde_json::Value {
    json!({
        "sessionId": "8f14e45f-ceea-4b07-8f4c-0ce2f6b0a7c1",
        "userId": user,
        "startTime": "2025-11-03T09:00:00",
        "status": status
    })
}

/// Guards against a hang masking a failure. On the paused clock the timeout
/// only fires when the awaited event can genuinely never happen.
async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(120), fut)
        .await
        .expect("test timed out")
}

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn expect_subscribe(frame: ClientFrame) -> (u64, String) {
    match frame {
        ClientFrame::Subscribe { id, topic } => (id, topic),
        other => panic!("expected a subscribe frame, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn resubscription_is_lossless_across_reconnects() {
    init_logs();
    let (transport, mut sessions) = mock(0);
    let feed = FeedService::new(transport, ReconnectPolicy::default());

    feed.connect().await.unwrap();
    let mut server = within(sessions.recv()).await.unwrap();

    let mut sub = feed.subscribe(SESSIONS_TOPIC).await.unwrap();
    let (first_id, topic) = expect_subscribe(within(server.frames.recv()).await.unwrap());
    assert_eq!(topic, SESSIONS_TOPIC);

    // Kill the connection; the driver must reconnect and resubscribe on its
    // own.
    drop(server);
    let mut server = within(sessions.recv()).await.unwrap();
    let (second_id, topic) = expect_subscribe(within(server.frames.recv()).await.unwrap());
    assert_eq!(topic, SESSIONS_TOPIC);
    assert_ne!(first_id, second_id, "handles are connection-scoped");

    // The original consumer still receives events on the new connection.
    server
        .push
        .send(event(SESSIONS_TOPIC, "SESSION_CREATED", session_payload("u1", "ACTIVE")))
        .await
        .unwrap();
    let envelope = within(sub.next()).await.unwrap();
    assert_eq!(envelope.event_type, EventType::SessionCreated);
    assert_eq!(feed.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn duplicate_subscribe_keeps_exactly_one_active_handle() {
    let (transport, mut sessions) = mock(0);
    let feed = FeedService::new(transport, ReconnectPolicy::default());

    feed.connect().await.unwrap();
    let mut server = within(sessions.recv()).await.unwrap();

    let mut first_sub = feed.subscribe(EMPLOYEES_TOPIC).await.unwrap();
    let (first_id, _) = expect_subscribe(within(server.frames.recv()).await.unwrap());

    let mut second_sub = feed.subscribe(EMPLOYEES_TOPIC).await.unwrap();
    match within(server.frames.recv()).await.unwrap() {
        ClientFrame::Unsubscribe { id } => assert_eq!(id, first_id, "stale handle released first"),
        other => panic!("expected the stale unsubscribe, got {other:?}"),
    }
    let (second_id, _) = expect_subscribe(within(server.frames.recv()).await.unwrap());
    assert_ne!(first_id, second_id);

    // The superseded stream ends; the topic has one consumer.
    assert!(within(first_sub.next()).await.is_none());

    server
        .push
        .send(event(EMPLOYEES_TOPIC, "EMPLOYEE_DELETED", json!(3)))
        .await
        .unwrap();
    let envelope = within(second_sub.next()).await.unwrap();
    assert_eq!(envelope.event_type, EventType::EmployeeDeleted);
    assert!(second_sub.try_next().is_none(), "exactly one delivery per frame");
}

#[tokio::test(start_paused = true)]
async fn subscribe_while_disconnected_defers_the_wire_subscription() {
    let (transport, mut sessions) = mock(0);
    let feed = FeedService::new(transport, ReconnectPolicy::default());

    let mut sub = feed.subscribe(SESSIONS_TOPIC).await.unwrap();
    assert_eq!(feed.state(), ConnectionState::Disconnected);
    assert_eq!(feed.topics().await.unwrap(), vec![SESSIONS_TOPIC.to_string()]);

    feed.connect().await.unwrap();
    let mut server = within(sessions.recv()).await.unwrap();
    let (_, topic) = expect_subscribe(within(server.frames.recv()).await.unwrap());
    assert_eq!(topic, SESSIONS_TOPIC);
    assert!(
        server.frames.try_recv().is_err(),
        "exactly one wire subscription is opened"
    );

    server
        .push
        .send(event(SESSIONS_TOPIC, "SESSION_CREATED", session_payload("u1", "ACTIVE")))
        .await
        .unwrap();
    assert!(within(sub.next()).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn backoff_doubles_then_gives_up() {
    let (transport, _sessions) = mock(u32::MAX);
    let policy = ReconnectPolicy::new(Duration::from_millis(1000), Duration::from_millis(30_000), 3);
    let feed = FeedService::new(transport, policy);

    let started = tokio::time::Instant::now();
    let err = feed.connect().await.unwrap_err();
    assert!(matches!(err, FeedError::ExhaustedRetries { attempts: 3 }));
    assert_eq!(
        started.elapsed(),
        Duration::from_millis(1000 + 2000 + 4000),
        "delays double from the floor"
    );
    assert_eq!(feed.state(), ConnectionState::Disconnected);

    // A later explicit connect starts a fresh attempt sequence.
    let started = tokio::time::Instant::now();
    let err = feed.connect().await.unwrap_err();
    assert!(matches!(err, FeedError::ExhaustedRetries { attempts: 3 }));
    assert_eq!(started.elapsed(), Duration::from_millis(1000 + 2000 + 4000));
}

#[tokio::test(start_paused = true)]
async fn retries_recover_when_the_endpoint_comes_back() {
    let (transport, mut sessions) = mock(2);
    let feed = FeedService::new(transport, ReconnectPolicy::default());

    let started = tokio::time::Instant::now();
    feed.connect().await.unwrap();
    assert_eq!(started.elapsed(), Duration::from_millis(1000 + 2000));
    assert_eq!(feed.state(), ConnectionState::Connected);
    assert!(within(sessions.recv()).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn disconnect_clears_durable_subscriptions() {
    let (transport, mut sessions) = mock(0);
    let feed = FeedService::new(transport, ReconnectPolicy::default());

    feed.connect().await.unwrap();
    let mut server = within(sessions.recv()).await.unwrap();
    let mut sub = feed.subscribe(SESSIONS_TOPIC).await.unwrap();
    expect_subscribe(within(server.frames.recv()).await.unwrap());

    feed.disconnect().await.unwrap();
    assert!(within(sub.next()).await.is_none(), "consumer stream ends");
    assert_eq!(feed.state(), ConnectionState::Disconnected);

    // Reconnecting resubscribes nothing: the durable registry is empty.
    feed.connect().await.unwrap();
    let mut server = within(sessions.recv()).await.unwrap();
    assert!(server.frames.try_recv().is_err());
    assert!(feed.topics().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_releases_the_wire_handle() {
    let (transport, mut sessions) = mock(0);
    let feed = FeedService::new(transport, ReconnectPolicy::default());

    feed.connect().await.unwrap();
    let mut server = within(sessions.recv()).await.unwrap();
    let mut sub = feed.subscribe(SESSIONS_TOPIC).await.unwrap();
    let (id, _) = expect_subscribe(within(server.frames.recv()).await.unwrap());

    feed.unsubscribe(SESSIONS_TOPIC).await.unwrap();
    match within(server.frames.recv()).await.unwrap() {
        ClientFrame::Unsubscribe { id: released } => assert_eq!(released, id),
        other => panic!("expected an unsubscribe frame, got {other:?}"),
    }
    assert!(within(sub.next()).await.is_none());
    assert!(feed.topics().await.unwrap().is_empty());

    // Unknown topics are a quiet no-op.
    feed.unsubscribe("/topic/unknown").await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_do_not_break_the_stream() {
    init_logs();
    let (transport, mut sessions) = mock(0);
    let feed = FeedService::new(transport, ReconnectPolicy::default());

    feed.connect().await.unwrap();
    let mut server = within(sessions.recv()).await.unwrap();
    let mut sub = feed.subscribe(EMPLOYEES_TOPIC).await.unwrap();
    expect_subscribe(within(server.frames.recv()).await.unwrap());

    server
        .push
        .send(TransportEvent::Frame(ServerFrame {
            topic: EMPLOYEES_TOPIC.to_string(),
            body: json!("garbage"),
        }))
        .await
        .unwrap();
    server
        .push
        .send(event(EMPLOYEES_TOPIC, "EMPLOYEE_DELETED", json!(12)))
        .await
        .unwrap();

    // The malformed frame vanished; the valid one right behind it arrives.
    let envelope = within(sub.next()).await.unwrap();
    assert_eq!(envelope.event_type, EventType::EmployeeDeleted);
    assert_eq!(feed.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn connect_is_idempotent_while_connected() {
    let (transport, mut sessions) = mock(0);
    let feed = FeedService::new(transport, ReconnectPolicy::default());

    feed.connect().await.unwrap();
    within(sessions.recv()).await.unwrap();

    feed.connect().await.unwrap();
    assert!(
        sessions.try_recv().is_err(),
        "no second connection is opened"
    );
}
