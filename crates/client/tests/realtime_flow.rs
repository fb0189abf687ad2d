//! Integration tests for the real-time flow
//!
//! Drives login, presence, inbound routing through the bus, and logout against an in-memory
//! transport.
//!
//! ## Running Tests
//! ```bash
//! cargo test -p sincronica-client --test realtime_flow
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sincronica_client::realtime::{
    ClientFrame, EnsureOutcome, LinkPeer, ServerFrame, Transport, TransportLink,
};
use sincronica_client::{
    AppContext, Config, ConnectionError, ConnectionManager, ConnectionStatus, Dispatch,
    MessageBus, NotificationClient, NotificationStore,
};
use sincronica_shared::{MessageEvent, UserId};
use time::macros::datetime;

// ============================================================================
// Test Utilities
// ============================================================================

#[derive(Default)]
struct InMemoryTransport {
    handshakes: AtomicUsize,
    peers: Mutex<Vec<LinkPeer>>,
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn connect(&self, _url: &str) -> Result<TransportLink, ConnectionError> {
        self.handshakes.fetch_add(1, Ordering::SeqCst);
        let (link, peer) = TransportLink::channel();
        self.peers.lock().unwrap().push(peer);
        Ok(link)
    }
}

impl InMemoryTransport {
    fn last_peer(&self) -> LinkPeer {
        self.peers.lock().unwrap().pop().expect("no connection was opened")
    }
}

fn context(transport: Arc<InMemoryTransport>) -> AppContext {
    let config = Config::new("http://127.0.0.1:9").unwrap();
    let bus = MessageBus::new();
    let connections = ConnectionManager::new(config.socket_url.clone(), transport, bus.clone());
    let notifications = Arc::new(NotificationStore::new(NotificationClient::with_client(
        reqwest::Client::new(),
        &config.api_url,
    )));
    AppContext::from_parts(config, bus, connections, notifications)
}

async fn login(ctx: &AppContext, user: &str) {
    match ctx.set_user(Some(user)).unwrap() {
        Some(EnsureOutcome::Connecting(task)) => {
            task.wait().await.unwrap();
        }
        other => panic!("Expected a new handshake, got {:?}", other),
    }
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

fn chat(id: i64, conversation_id: i64, sender: i64, receiver: i64) -> ServerFrame {
    ServerFrame::NewMessage {
        message: MessageEvent {
            id,
            conversation_id,
            sender_id: UserId::new(sender).unwrap(),
            receiver_id: UserId::new(receiver).unwrap(),
            text: format!("mensaje {id}"),
            sender_name: Some("Lucía".to_string()),
            sender_avatar: None,
            created_at: datetime!(2024-05-01 19:30 UTC),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_open_conversation_consumes_its_messages() {
    let transport = Arc::new(InMemoryTransport::default());
    let ctx = context(Arc::clone(&transport));

    let inline = Arc::new(Mutex::new(Vec::new()));
    let toasts = Arc::new(Mutex::new(Vec::new()));

    // Conversation screen for conversation 3 subscribes first
    let i = Arc::clone(&inline);
    let screen = ctx.bus.subscribe(move |event: &MessageEvent| {
        if event.conversation_id == 3 {
            i.lock().unwrap().push(event.id);
            Dispatch::Stop
        } else {
            Dispatch::Continue
        }
    });
    // Background toast handler
    let t = Arc::clone(&toasts);
    let _background = ctx
        .bus
        .subscribe(move |event: &MessageEvent| t.lock().unwrap().push(event.id));

    login(&ctx, "42").await;
    let mut peer = transport.last_peer();
    assert_eq!(
        peer.outbound.recv().await,
        Some(ClientFrame::Join {
            user_id: UserId::new(42).unwrap()
        })
    );

    peer.deliver(chat(1, 3, 8, 42));
    peer.deliver(chat(2, 4, 9, 42));
    eventually(|| toasts.lock().unwrap().len() == 1).await;

    assert_eq!(*inline.lock().unwrap(), vec![1]);
    assert_eq!(*toasts.lock().unwrap(), vec![2]);

    // Screen closes: everything falls through to the toast handler
    assert!(screen.unsubscribe());
    peer.deliver(chat(3, 3, 8, 42));
    eventually(|| toasts.lock().unwrap().len() == 2).await;
    assert_eq!(*inline.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn test_screens_share_one_connection() {
    let transport = Arc::new(InMemoryTransport::default());
    let ctx = context(Arc::clone(&transport));

    login(&ctx, "42").await;
    for _ in 0..3 {
        assert!(matches!(
            ctx.connections.ensure_connection(42_i64).unwrap(),
            EnsureOutcome::Reused
        ));
    }

    assert_eq!(transport.handshakes.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.connections.handshake_count(), 1);
}

#[tokio::test]
async fn test_logout_keeps_connection_until_owner_disconnects() {
    let transport = Arc::new(InMemoryTransport::default());
    let ctx = context(Arc::clone(&transport));
    login(&ctx, "42").await;

    ctx.set_user(None::<UserId>).unwrap();

    assert_eq!(ctx.notifications.current_user(), None);
    assert!(ctx.connections.is_connected());

    // Owning screen tears the connection down
    assert!(ctx.connections.disconnect());
    assert_eq!(ctx.connections.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_dropped_transport_recovers_on_next_ensure() {
    let transport = Arc::new(InMemoryTransport::default());
    let ctx = context(Arc::clone(&transport));
    let errors = Arc::new(AtomicUsize::new(0));
    let e = Arc::clone(&errors);
    ctx.connections.on_error(move |_| {
        e.fetch_add(1, Ordering::SeqCst);
    });
    login(&ctx, "42").await;

    let peer = transport.last_peer();
    peer.fail("connection reset by peer");
    peer.close();
    eventually(|| ctx.connections.status() == ConnectionStatus::Disconnected).await;
    assert_eq!(errors.load(Ordering::SeqCst), 1);

    login(&ctx, "42").await;
    assert!(ctx.connections.is_connected());
    assert_eq!(transport.handshakes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_invalid_login_is_rejected() {
    let transport = Arc::new(InMemoryTransport::default());
    let ctx = context(Arc::clone(&transport));

    assert!(matches!(
        ctx.set_user(Some("-3")),
        Err(ConnectionError::Validation(_))
    ));
    assert_eq!(ctx.connections.status(), ConnectionStatus::Idle);
    assert_eq!(transport.handshakes.load(Ordering::SeqCst), 0);
}
