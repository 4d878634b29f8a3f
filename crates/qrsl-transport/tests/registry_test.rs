// Registry and session actors driven over the in-process loopback.

use qrsl_core::provider::{ClassicalProvider, NativePqcProvider};
use qrsl_core::{HybridSigner, SessionConfig, SessionContext, SessionState};
use qrsl_transport::memory::{Inbox, MemoryConnector, MemoryTransport};
use qrsl_transport::{connect_with_retry, Error, SessionEvent, SessionRegistry, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

// ============================================================================
// Helpers
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn context(config: SessionConfig) -> SessionContext {
    let signer = HybridSigner::new(
        Arc::new(ClassicalProvider::new()),
        Some(Arc::new(NativePqcProvider::new())),
    );
    SessionContext::new(Arc::new(signer)).with_config(config)
}

struct Peer {
    registry: Arc<SessionRegistry>,
    events: UnboundedReceiver<SessionEvent>,
}

/// Registries for "alice" and "bob" that trust each other's signing keys.
fn peers(config: SessionConfig) -> (Peer, Peer) {
    let a_ctx = context(config.clone());
    let b_ctx = context(config);

    let a_keys = a_ctx
        .signer
        .verifying_keys("bob", &a_ctx.policy.snapshot())
        .unwrap();
    let b_keys = b_ctx
        .signer
        .verifying_keys("alice", &b_ctx.policy.snapshot())
        .unwrap();
    b_ctx.signer.trust("alice", &a_keys).unwrap();
    a_ctx.signer.trust("bob", &b_keys).unwrap();

    let (a_registry, a_events) = SessionRegistry::new(a_ctx);
    let (b_registry, b_events) = SessionRegistry::new(b_ctx);
    (
        Peer {
            registry: Arc::new(a_registry),
            events: a_events,
        },
        Peer {
            registry: Arc::new(b_registry),
            events: b_events,
        },
    )
}

/// Forward frames from `inbox` into `registry` as coming from `from`.
fn pump(mut inbox: Inbox, registry: Arc<SessionRegistry>, from: &'static str) {
    tokio::spawn(async move {
        while let Some(frame) = inbox.recv().await {
            let _ = registry.route_frame(from, frame);
        }
    });
}

/// Open both sides over a fresh loopback and start routing. Returns
/// alice's end of the link.
async fn connect(alice: &Peer, bob: &Peer) -> Arc<MemoryTransport> {
    let ((a_link, a_inbox), (b_link, b_inbox)) = MemoryTransport::pair();
    alice.registry.open("bob", a_link.clone()).await.unwrap();
    bob.registry.open("alice", b_link).await.unwrap();
    pump(a_inbox, Arc::clone(&alice.registry), "bob");
    pump(b_inbox, Arc::clone(&bob.registry), "alice");
    a_link
}

/// Next event satisfying `pred`, skipping the rest. Panics after two
/// minutes of (virtual) time.
async fn next_event(
    events: &mut UnboundedReceiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            let event = events.recv().await.expect("event stream ended");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

// ============================================================================
// Handshake and messaging
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_handshake_and_message_end_to_end() {
    init_tracing();
    let (mut alice, mut bob) = peers(SessionConfig::default());
    connect(&alice, &bob).await;

    alice.registry.established("bob").await.unwrap();
    bob.registry.established("alice").await.unwrap();

    let a_key = alice.registry.context().lifecycle.current_key("bob").unwrap();
    let b_key = bob.registry.context().lifecycle.current_key("alice").unwrap();
    assert_eq!(a_key.as_bytes(), b_key.as_bytes());

    alice.registry.send("bob", b"hello bob".to_vec()).await.unwrap();
    let received = next_event(&mut bob.events, |e| matches!(e, SessionEvent::Message { .. })).await;
    assert_eq!(
        received,
        SessionEvent::Message {
            peer_id: "alice".into(),
            data: b"hello bob".to_vec(),
        }
    );

    bob.registry.send("alice", b"hi alice".to_vec()).await.unwrap();
    let received = next_event(&mut alice.events, |e| matches!(e, SessionEvent::Message { .. })).await;
    assert!(matches!(received, SessionEvent::Message { ref data, .. } if data == b"hi alice"));
}

#[tokio::test(start_paused = true)]
async fn test_send_before_established_is_rejected() {
    let (alice, _bob) = peers(SessionConfig::default());
    // Nobody reads bob's side, so the handshake never completes.
    let ((a_link, _a_inbox), (_b_link, _b_inbox)) = MemoryTransport::pair();
    alice.registry.open("bob", a_link).await.unwrap();

    let result = alice.registry.send("bob", b"too early".to_vec()).await;
    assert!(matches!(
        result,
        Err(Error::Session(qrsl_core::Error::PeerNotConnected(_)))
    ));
}

#[tokio::test]
async fn test_route_to_unknown_peer() {
    let (alice, _bob) = peers(SessionConfig::default());
    assert!(matches!(
        alice.registry.route_frame("mallory", b"{}".to_vec()),
        Err(Error::Session(qrsl_core::Error::PeerNotConnected(_)))
    ));
    assert!(alice.registry.state("mallory").is_none());
}

/// Undecodable frames are dropped without disturbing the session.
#[tokio::test(start_paused = true)]
async fn test_garbage_frame_is_ignored() {
    let (alice, bob) = peers(SessionConfig::default());
    connect(&alice, &bob).await;
    alice.registry.established("bob").await.unwrap();

    alice.registry.route_frame("bob", b"not json".to_vec()).unwrap();
    alice.registry.send("bob", b"still here".to_vec()).await.unwrap();
    assert_eq!(alice.registry.state("bob"), Some(SessionState::Ready));
}

// ============================================================================
// Rekey
// ============================================================================

/// Requests that never reach the peer are retried a bounded number of times,
/// then the cycle is abandoned and the session keeps its key.
#[tokio::test(start_paused = true)]
async fn test_rekey_abandoned_over_lossy_link() {
    init_tracing();
    let config = SessionConfig {
        rekey_message_threshold: 2,
        ..SessionConfig::default()
    };
    let (mut alice, bob) = peers(config);
    let a_link = connect(&alice, &bob).await;
    alice.registry.established("bob").await.unwrap();
    let key_before = alice.registry.context().lifecycle.current_key("bob").unwrap();

    a_link.set_lossy(true);
    alice.registry.send("bob", b"one".to_vec()).await.unwrap();
    alice.registry.send("bob", b"two".to_vec()).await.unwrap();

    let abandoned = next_event(&mut alice.events, |e| {
        matches!(e, SessionEvent::RekeyAbandoned { .. })
    })
    .await;
    assert_eq!(
        abandoned,
        SessionEvent::RekeyAbandoned {
            peer_id: "bob".into(),
            attempts: 3,
        }
    );
    assert_eq!(alice.registry.state("bob"), Some(SessionState::Ready));
    let key_after = alice.registry.context().lifecycle.current_key("bob").unwrap();
    assert_eq!(key_before.as_bytes(), key_after.as_bytes());
    assert!(a_link.frames_dropped() >= 3);
    assert!(!alice.registry.context().exchange.has_pending("bob"));
}

#[tokio::test(start_paused = true)]
async fn test_rekey_completes_over_clean_link() {
    let config = SessionConfig {
        rekey_message_threshold: 2,
        ..SessionConfig::default()
    };
    let (mut alice, bob) = peers(config);
    connect(&alice, &bob).await;
    alice.registry.established("bob").await.unwrap();
    let first = next_event(&mut alice.events, |e| matches!(e, SessionEvent::Established { .. })).await;

    alice.registry.send("bob", b"one".to_vec()).await.unwrap();
    alice.registry.send("bob", b"two".to_vec()).await.unwrap();

    let second = next_event(&mut alice.events, |e| matches!(e, SessionEvent::Established { .. })).await;
    assert_ne!(first, second, "a new key id is installed");

    alice.registry.send("bob", b"three".to_vec()).await.unwrap();
}

// ============================================================================
// Connection management
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_connect_retry_gives_up_after_bound() {
    let ((link, _inbox), _) = MemoryTransport::pair();
    let connector = MemoryConnector::failing(link, 10);

    let started = Instant::now();
    let result = connect_with_retry(&connector, "bob", 3, Duration::from_secs(2)).await;

    assert!(matches!(result, Err(Error::ConnectionFailed(_))));
    assert_eq!(connector.attempts(), 3);
    assert!(started.elapsed() >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_registry_connect_retries_then_opens() {
    let (alice, _bob) = peers(SessionConfig::default());
    let ((link, _inbox), (_b_link, _b_inbox)) = MemoryTransport::pair();
    let connector = MemoryConnector::failing(link, 2);

    alice.registry.connect(&connector, "bob").await.unwrap();
    assert_eq!(connector.attempts(), 3);
    assert_eq!(alice.registry.peers(), vec!["bob".to_string()]);

    let ((link, _inbox), _) = MemoryTransport::pair();
    let hopeless = MemoryConnector::failing(link, 10);
    assert!(alice.registry.connect(&hopeless, "carol").await.is_err());
    assert_eq!(alice.registry.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_open_replaces_existing_session() {
    let (mut alice, _bob) = peers(SessionConfig::default());
    let ((first, _first_inbox), (_b1, _b1_inbox)) = MemoryTransport::pair();
    let ((second, _second_inbox), (_b2, _b2_inbox)) = MemoryTransport::pair();

    alice.registry.open("bob", first.clone() as Arc<dyn Transport>).await.unwrap();
    alice.registry.open("bob", second).await.unwrap();

    let closed = next_event(&mut alice.events, |e| matches!(e, SessionEvent::Closed { .. })).await;
    assert_eq!(closed, SessionEvent::Closed { peer_id: "bob".into() });
    assert_eq!(alice.registry.len(), 1);
    assert_eq!(first.frames_sent(), 1, "only the first key exchange");
}

/// Two opens for the same peer racing each other: the survivor's ephemeral
/// is not erased by the closing of the session it replaced.
#[tokio::test(start_paused = true)]
async fn test_concurrent_open_keeps_survivor_ephemeral() {
    init_tracing();
    let (alice, _bob) = peers(SessionConfig::default());
    let ((first, _first_inbox), (_b1, _b1_inbox)) = MemoryTransport::pair();
    let ((second, _second_inbox), (_b2, mut b2_inbox)) = MemoryTransport::pair();

    let (a, b) = tokio::join!(
        alice.registry.open("bob", first),
        alice.registry.open("bob", second)
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(alice.registry.len(), 1);

    let frame = b2_inbox.recv().await.expect("survivor sends its key exchange");
    let packet = qrsl_core::SecurePacket::decode(&frame).unwrap();
    assert_eq!(packet.packet_type, qrsl_core::PacketType::KeyExchange);
    assert_eq!(alice.registry.state("bob"), Some(SessionState::Handshaking));
    assert_eq!(
        alice.registry.context().exchange.pending_public_key("bob"),
        Some(packet.data)
    );
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_fails_session() {
    let (mut alice, _bob) = peers(SessionConfig::default());
    let ((link, _inbox), (_b_link, b_inbox)) = MemoryTransport::pair();
    drop(b_inbox);

    alice.registry.open("bob", link).await.unwrap();
    let failed = next_event(&mut alice.events, |e| matches!(e, SessionEvent::Failed { .. })).await;
    assert!(matches!(failed, SessionEvent::Failed { ref reason, .. } if reason.starts_with("transport")));

    assert_eq!(alice.registry.state("bob"), Some(SessionState::Failed));
    assert!(alice.registry.established("bob").await.is_err());
    assert!(!alice.registry.context().exchange.has_pending("bob"));

    assert_eq!(alice.registry.prune().await, 1);
    assert!(alice.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_close_all_erases_key_material() {
    let (mut alice, bob) = peers(SessionConfig::default());
    connect(&alice, &bob).await;
    alice.registry.established("bob").await.unwrap();
    assert!(alice.registry.context().lifecycle.current_key("bob").is_some());

    alice.registry.close_all().await;

    assert!(alice.registry.is_empty());
    assert!(alice.registry.context().lifecycle.is_empty());
    assert_eq!(alice.registry.context().exchange.pending_count(), 0);
    let closed = next_event(&mut alice.events, |e| matches!(e, SessionEvent::Closed { .. })).await;
    assert_eq!(closed, SessionEvent::Closed { peer_id: "bob".into() });
    assert!(!alice.registry.close("bob").await);
}
