//! LedgerService, dispatcher, and TCP adapter tests

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use roomledger_core::{
    CallerId, Environment, ErrorKind, GENERAL_ROOM_ID, LedgerConfig, LedgerError, LedgerEvent,
    Timestamp,
};
use roomledger_server::{
    ChannelSink, DEFAULT_MAX_FRAME_BYTES, DeliveryPolicy, LedgerClient, LedgerService,
    MAX_PAGE_LIMIT, NotificationSink, Request, Response, ResponseBody, Server,
    ServerRuntimeConfig, SinkError, dispatch::deliver_with_policy, protocol, spawn_dispatcher,
};
use tokio::{io::AsyncWriteExt, net::TcpStream, sync::broadcast};

const T: Timestamp = 1_700_000_000;

// Test environment with a manually advanced clock
#[derive(Clone)]
struct TestEnv {
    clock: Arc<AtomicU64>,
}

impl TestEnv {
    fn new() -> Self {
        Self { clock: Arc::new(AtomicU64::new(T)) }
    }

    fn advance(&self, secs: u64) {
        self.clock.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Environment for TestEnv {
    fn now(&self) -> Timestamp {
        self.clock.load(Ordering::SeqCst)
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::task::yield_now()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(0x5a);
    }
}

/// Sink failing the first `failures` deliveries.
struct FlakySink {
    failures: u32,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl NotificationSink for FlakySink {
    async fn deliver(&self, _event: &LedgerEvent) -> Result<(), SinkError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(SinkError::Unavailable(format!("attempt {call}")))
        } else {
            Ok(())
        }
    }
}

fn caller(name: &str) -> CallerId {
    CallerId::from(name)
}

fn config() -> LedgerConfig {
    LedgerConfig { initializer: caller("deployer"), cooldown_secs: 60 }
}

fn service_with_channel(
    env: TestEnv,
) -> (LedgerService<TestEnv>, broadcast::Receiver<LedgerEvent>) {
    let sink = ChannelSink::new(64);
    let rx = sink.subscribe();
    let (notifier, _task) = spawn_dispatcher(env.clone(), sink, DeliveryPolicy::BestEffort);
    (LedgerService::new(env, config(), notifier), rx)
}

async fn next_event(rx: &mut broadcast::Receiver<LedgerEvent>) -> LedgerEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event not delivered in time")
        .expect("channel closed")
}

#[tokio::test]
async fn events_arrive_in_commit_order() {
    let (service, mut rx) = service_with_channel(TestEnv::new());
    let alice = caller("alice");

    service.register_user(&alice, "alice").await.unwrap();
    let room = service.create_room(&alice, "side", false).await.unwrap();
    let msg = service.post_message(&alice, room, "hi").await.unwrap();

    assert!(matches!(
        next_event(&mut rx).await,
        LedgerEvent::RoomCreated { id: GENERAL_ROOM_ID, .. }
    ));
    assert!(matches!(next_event(&mut rx).await, LedgerEvent::ProfileUpdated { .. }));
    assert!(matches!(next_event(&mut rx).await, LedgerEvent::RoomCreated { id, .. } if id == room));
    match next_event(&mut rx).await {
        LedgerEvent::MessageSent { id, room_id, timestamp, .. } => {
            assert_eq!(id, msg);
            assert_eq!(room_id, room);
            assert_eq!(timestamp, T);
        },
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn rejected_operation_emits_nothing() {
    let (service, mut rx) = service_with_channel(TestEnv::new());
    let bob = caller("bob");

    assert!(matches!(next_event(&mut rx).await, LedgerEvent::RoomCreated { .. }));

    let err = service.post_message(&bob, 42, "hi").await.unwrap_err();
    assert_eq!(err, LedgerError::RoomNotFound { room_id: 42 });
    service.register_user(&bob, "bob").await.unwrap();

    // The next event is the registration, not anything from the failed post.
    assert!(matches!(next_event(&mut rx).await, LedgerEvent::ProfileUpdated { .. }));
}

#[tokio::test]
async fn service_clock_drives_cooldown() {
    let env = TestEnv::new();
    let (service, _rx) = service_with_channel(env.clone());
    let bob = caller("bob");

    service.post_message(&bob, GENERAL_ROOM_ID, "one").await.unwrap();
    env.advance(30);
    assert_eq!(
        service.post_message(&bob, GENERAL_ROOM_ID, "two").await,
        Err(LedgerError::CooldownActive { retry_after_secs: 30 })
    );

    env.advance(30);
    assert!(service.post_message(&bob, GENERAL_ROOM_ID, "two").await.is_ok());
    assert_eq!(service.total_messages().await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_posts_from_one_caller_admit_one() {
    let (service, _rx) = service_with_channel(TestEnv::new());
    let bob = caller("bob");

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let service = service.clone();
            let bob = bob.clone();
            tokio::spawn(async move {
                service.post_message_at(&bob, GENERAL_ROOM_ID, &format!("m{i}"), T).await
            })
        })
        .collect();

    let mut accepted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(id) => {
                assert_eq!(id, 0);
                accepted += 1;
            },
            Err(e) => assert!(matches!(e, LedgerError::CooldownActive { .. })),
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(service.room_message_count(&bob, GENERAL_ROOM_ID).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_posts_get_dense_ids() {
    let (service, _rx) = service_with_channel(TestEnv::new());

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                service.post_message(&caller(&format!("u{i}")), GENERAL_ROOM_ID, "hi").await
            })
        })
        .collect();

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap().unwrap());
    }
    ids.sort_unstable();

    assert_eq!(ids, (0..32).collect::<Vec<_>>());
    let listed = service.list_room_message_ids(&caller("reader"), GENERAL_ROOM_ID).await.unwrap();
    assert_eq!(listed, ids);
}

#[tokio::test]
async fn retry_policy_recovers_from_transient_failures() {
    let env = TestEnv::new();
    let calls = Arc::new(AtomicU32::new(0));
    let sink = FlakySink { failures: 2, calls: Arc::clone(&calls) };
    let policy = DeliveryPolicy::Retry { max_attempts: 3, initial_backoff_ms: 10 };
    let event = LedgerEvent::ProfileUpdated { caller: caller("a"), username: "a".into() };

    let attempts = deliver_with_policy(&env, &sink, policy, &event).await.unwrap();

    assert_eq!(attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_policy_gives_up_after_max_attempts() {
    let env = TestEnv::new();
    let calls = Arc::new(AtomicU32::new(0));
    let sink = FlakySink { failures: u32::MAX, calls: Arc::clone(&calls) };
    let policy = DeliveryPolicy::Retry { max_attempts: 4, initial_backoff_ms: 1 };
    let event = LedgerEvent::ProfileUpdated { caller: caller("a"), username: "a".into() };

    let result = deliver_with_policy(&env, &sink, policy, &event).await;

    assert!(matches!(result, Err(SinkError::Unavailable(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn best_effort_tries_once() {
    let env = TestEnv::new();
    let calls = Arc::new(AtomicU32::new(0));
    let sink = FlakySink { failures: 1, calls: Arc::clone(&calls) };
    let event = LedgerEvent::ProfileUpdated { caller: caller("a"), username: "a".into() };

    assert!(deliver_with_policy(&env, &sink, DeliveryPolicy::BestEffort, &event).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

async fn bind_server(sink: ChannelSink, max_frame_bytes: usize) -> Server {
    let config = ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".to_string(),
        ledger: config(),
        max_frame_bytes,
        ..Default::default()
    };
    Server::bind_with_sink(config, sink).await.unwrap()
}

async fn spawn_server(sink: ChannelSink) -> std::net::SocketAddr {
    let server = bind_server(sink, DEFAULT_MAX_FRAME_BYTES).await;
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

#[tokio::test]
async fn tcp_round_trip() {
    let sink = ChannelSink::new(64);
    let mut rx = sink.subscribe();
    let addr = spawn_server(sink).await;
    let mut client = LedgerClient::connect(addr, DEFAULT_MAX_FRAME_BYTES).await.unwrap();

    let alice = caller("0xa11ce");
    let bob = caller("0xb0b");

    let reply = client
        .call(&Request::RegisterUser { caller: alice.clone(), username: "alice".into() })
        .await
        .unwrap();
    assert_eq!(reply, Response::Ok(ResponseBody::Unit));

    let create =
        Request::CreateRoom { caller: alice.clone(), name: "Secret".into(), is_private: true };
    let reply = client.call(&create).await.unwrap();
    assert_eq!(reply, Response::Ok(ResponseBody::RoomId(1)));

    let reply = client
        .call(&Request::PostMessage { caller: bob.clone(), room_id: 1, content: "hi".into() })
        .await
        .unwrap();
    assert!(matches!(reply, Response::Err { kind: ErrorKind::AccessDenied, .. }));

    client
        .call(&Request::AddMember { caller: alice.clone(), room_id: 1, member: bob.clone() })
        .await
        .unwrap();
    let reply = client.call(&Request::IsMember { room_id: 1, member: bob.clone() }).await.unwrap();
    assert_eq!(reply, Response::Ok(ResponseBody::Flag(true)));
    let reply = client.call(&Request::IsMember { room_id: 7, member: bob.clone() }).await.unwrap();
    assert!(matches!(reply, Response::Err { kind: ErrorKind::NotFound, .. }));
    let reply = client
        .call(&Request::PostMessage { caller: bob.clone(), room_id: 1, content: "hi".into() })
        .await
        .unwrap();
    assert_eq!(reply, Response::Ok(ResponseBody::MessageId(0)));

    let reply = client
        .call(&Request::PostMessage { caller: bob.clone(), room_id: 1, content: "again".into() })
        .await
        .unwrap();
    match reply {
        Response::Err { kind, retry_after_secs, .. } => {
            assert_eq!(kind, ErrorKind::CooldownActive);
            assert!(retry_after_secs.is_some_and(|s| s > 0 && s <= 60));
        },
        Response::Ok(body) => panic!("cooldown not enforced: {body:?}"),
    }

    let page =
        Request::PageRoomMessages { caller: alice.clone(), room_id: 1, offset: 0, limit: 10 };
    let reply = client.call(&page).await.unwrap();
    match reply {
        Response::Ok(ResponseBody::Messages(messages)) => {
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].sender, bob);
            assert_eq!(messages[0].content, "hi");
        },
        other => panic!("unexpected reply: {other:?}"),
    }

    let reply = client.call(&Request::GetUsername { caller: alice }).await.unwrap();
    assert_eq!(reply, Response::Ok(ResponseBody::Username("alice".into())));
    let reply = client.call(&Request::TotalRooms).await.unwrap();
    assert_eq!(reply, Response::Ok(ResponseBody::Count(2)));

    assert!(matches!(next_event(&mut rx).await, LedgerEvent::RoomCreated { id: 0, .. }));
}

#[tokio::test]
async fn page_of_full_size_messages_fits_one_response() {
    let addr = spawn_server(ChannelSink::new(8)).await;
    let mut client = LedgerClient::connect(addr, DEFAULT_MAX_FRAME_BYTES).await.unwrap();

    // Distinct posters sidestep the cooldown.
    for i in 0..70u64 {
        let post = Request::PostMessage {
            caller: caller(&format!("0x{i:040x}")),
            room_id: GENERAL_ROOM_ID,
            content: "x".repeat(1000),
        };
        assert_eq!(client.call(&post).await.unwrap(), Response::Ok(ResponseBody::MessageId(i)));
    }

    let page = Request::PageRoomMessages {
        caller: caller("reader"),
        room_id: GENERAL_ROOM_ID,
        offset: 0,
        limit: 70,
    };
    match client.call(&page).await.unwrap() {
        Response::Ok(ResponseBody::Messages(messages)) => {
            assert_eq!(messages.len(), 70);
            assert!(messages.windows(2).all(|w| w[0].id < w[1].id));
        },
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[tokio::test]
async fn page_limit_is_capped_on_the_wire() {
    let addr = spawn_server(ChannelSink::new(8)).await;
    let mut client = LedgerClient::connect(addr, DEFAULT_MAX_FRAME_BYTES).await.unwrap();
    let page = |limit| Request::PageRoomMessages {
        caller: caller("reader"),
        room_id: GENERAL_ROOM_ID,
        offset: 0,
        limit,
    };

    let reply = client.call(&page(MAX_PAGE_LIMIT + 1)).await.unwrap();
    assert!(matches!(reply, Response::Err { kind: ErrorKind::InvalidInput, .. }));

    // Within the cap the ledger decides: General is empty.
    let reply = client.call(&page(MAX_PAGE_LIMIT)).await.unwrap();
    assert!(matches!(reply, Response::Err { kind: ErrorKind::OutOfBounds, .. }));
}

#[tokio::test]
async fn oversized_response_becomes_error_reply() {
    let max_frame_bytes = 64;
    let server = bind_server(ChannelSink::new(8), max_frame_bytes).await;
    let service = server.service().clone();
    for i in 0..8_000 {
        service.post_message(&caller(&format!("c{i}")), GENERAL_ROOM_ID, "x").await.unwrap();
    }
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    let mut client = LedgerClient::connect(addr, max_frame_bytes).await.unwrap();
    let list = Request::ListRoomMessageIds { caller: caller("c0"), room_id: GENERAL_ROOM_ID };
    let reply = client.call(&list).await.unwrap();
    assert!(matches!(reply, Response::Err { kind: ErrorKind::InvalidInput, .. }));

    let reply = client.call(&Request::TotalMessages).await.unwrap();
    assert_eq!(reply, Response::Ok(ResponseBody::Count(8_000)));
}

#[tokio::test]
async fn malformed_frame_gets_error_and_connection_survives() {
    let addr = spawn_server(ChannelSink::new(8)).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let garbage = [0xffu8, 0x00, 0x13, 0x37];
    let mut frame = BytesMut::new();
    frame.put_u32(garbage.len() as u32);
    frame.put_slice(&garbage);
    stream.write_all(&frame).await.unwrap();

    let mut buf = BytesMut::new();
    let reply: Response = protocol::read_frame(&mut stream, &mut buf, DEFAULT_MAX_FRAME_BYTES)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(reply, Response::Err { kind: ErrorKind::InvalidInput, .. }));

    protocol::write_frame(&mut stream, &Request::TotalMessages, DEFAULT_MAX_FRAME_BYTES)
        .await
        .unwrap();
    let reply: Response = protocol::read_frame(&mut stream, &mut buf, DEFAULT_MAX_FRAME_BYTES)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply, Response::Ok(ResponseBody::Count(0)));
}

#[tokio::test]
async fn oversized_frame_closes_connection() {
    let addr = spawn_server(ChannelSink::new(8)).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let mut frame = BytesMut::new();
    frame.put_u32(u32::MAX);
    stream.write_all(&frame).await.unwrap();

    let mut buf = BytesMut::new();
    let reply =
        protocol::read_frame::<_, Response>(&mut stream, &mut buf, DEFAULT_MAX_FRAME_BYTES).await;
    assert!(matches!(reply, Ok(None) | Err(_)), "server must not answer an oversized frame");
}

#[tokio::test]
async fn zero_frame_limit_is_a_config_error() {
    let config = ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".to_string(),
        max_frame_bytes: 0,
        ..Default::default()
    };
    let result = Server::bind(config).await;
    assert!(matches!(result, Err(roomledger_server::ServerError::Config(_))));
}
