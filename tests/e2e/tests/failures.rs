//! Timeouts, broken sessions and routing failures.
//!
//! Everything runs on the in-memory network with paused tokio time, so
//! timeouts elapse without real waiting.

use bytes::Bytes;
use mesh_actors::{ActorError, RpcError};
use mesh_config::MessagingConfig;
use mesh_e2e::*;
use mesh_network::{Service, TransportError};
use mesh_types::{error_code, ActorId, Message, Request};
use std::time::Duration;
use tokio::time::Instant;

const SERVER_FIBER: i32 = 2;
const CLIENT_FIBER: i32 = 3;
const RPC_TIMEOUT: Duration = Duration::from_secs(3);

fn config() -> MessagingConfig {
    MessagingConfig::default().with_rpc_timeout(RPC_TIMEOUT)
}

fn mesh(config: MessagingConfig) -> MemoryMesh {
    MemoryMesh::new(config)
        .with_process(1)
        .unwrap()
        .with_process(2)
        .unwrap()
        .with_unreachable(3)
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_reachable_and_unreachable_calls_concurrently() {
    init_test_tracing();
    let mesh = mesh(config());
    let a = mesh.start(1).unwrap();
    let b = mesh.start(2).unwrap();

    let ping = b
        .spawn_fiber(SERVER_FIBER)
        .unwrap()
        .add_actor(1, PingActor::new());
    let client = a.spawn_fiber(CLIENT_FIBER).unwrap();
    let nowhere = ActorId::new(3, SERVER_FIBER, 1);

    let started = Instant::now();
    let to_b = client.call(ping, ping_request(1, "ping").unwrap()).unwrap();
    let to_c = client.call(nowhere, ping_request(2, "ping").unwrap()).unwrap();

    let (pong, timed_out) = tokio::join!(
        async {
            let response = to_b.await;
            (response, started.elapsed())
        },
        to_c
    );

    let (pong, pong_elapsed) = pong;
    assert_eq!(pong.unwrap().opcode, OP_PONG);
    assert!(pong_elapsed < RPC_TIMEOUT);

    let err = timed_out.unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {err:?}");
    assert_eq!(err.target(), nowhere);
    assert!(started.elapsed() >= RPC_TIMEOUT);

    // Let the relay's own watchdog run as well
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(client.sender().pending_calls(), 0);
    assert_eq!(a.outer.pending_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_without_exception_is_timeout_classified() {
    init_test_tracing();
    let mesh = mesh(config());
    let a = mesh.start(1).unwrap();
    let client = a.spawn_fiber(CLIENT_FIBER).unwrap();

    let outcome = client
        .call_with(ActorId::new(3, 1, 1), Request::new(5, Bytes::new()), false)
        .unwrap()
        .await;

    // The caller's watchdog yields a timeout response; the relay's, if it
    // wins the race, a relayed timeout code, which always fails the call
    match outcome {
        Ok(response) => assert_eq!(response.error, error_code::ERR_ACTOR_TIMEOUT),
        Err(err) => assert!(err.is_timeout(), "expected timeout, got {err:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_relay_outer_call_times_out_as_value() {
    init_test_tracing();
    let mesh = mesh(config());
    let a = mesh.start(1).unwrap();

    let started = Instant::now();
    let response = a
        .outer
        .call(ActorId::new(3, 1, 1), Request::new(5, Bytes::new()), false)
        .unwrap()
        .await
        .unwrap();
    assert_eq!(response.error, error_code::ERR_ACTOR_TIMEOUT);
    assert!(started.elapsed() >= RPC_TIMEOUT);
    assert_eq!(a.outer.metrics().snapshot().timeouts, 1);
    assert_eq!(a.outer.pending_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_session_loss_fails_calls_immediately() {
    init_test_tracing();
    let mesh = mesh(config());
    let a = mesh.start(1).unwrap();
    let b = mesh.start(2).unwrap();

    let silent_actor = SilentActor::new();
    let silent = b
        .spawn_fiber(SERVER_FIBER)
        .unwrap()
        .add_actor(1, silent_actor.clone());
    let client = a.spawn_fiber(CLIENT_FIBER).unwrap();

    let started = Instant::now();
    let pending = client.call(silent, Request::new(8, Bytes::new())).unwrap();
    let call = tokio::spawn(pending);

    silent_actor.wait_for_request().await;
    b.service.close();

    let err = call.await.unwrap().unwrap_err();
    assert_eq!(
        err,
        RpcError::Transport {
            target: silent,
            rpc_id: err.rpc_id(),
            error: error_code::ERR_SESSION_DISCONNECTED,
        }
    );
    assert!(started.elapsed() < RPC_TIMEOUT);
    assert!(!a.outer.has_session(2));
    assert_eq!(a.outer.pending_calls(), 0);
    assert!(a.outer.metrics().snapshot().transport_failures >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_session_loss_waits_for_timeout_when_disabled() {
    init_test_tracing();
    let config = MessagingConfig {
        fail_pending_on_session_error: false,
        ..config()
    };
    let mesh = mesh(config);
    let a = mesh.start(1).unwrap();
    let b = mesh.start(2).unwrap();

    let silent_actor = SilentActor::new();
    let silent = b
        .spawn_fiber(SERVER_FIBER)
        .unwrap()
        .add_actor(1, silent_actor.clone());
    let client = a.spawn_fiber(CLIENT_FIBER).unwrap();

    let started = Instant::now();
    let call = tokio::spawn(client.call(silent, Request::new(8, Bytes::new())).unwrap());
    silent_actor.wait_for_request().await;
    b.service.close();

    let err = call.await.unwrap().unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {err:?}");
    assert!(started.elapsed() >= RPC_TIMEOUT);
    assert!(!a.outer.has_session(2));
}

#[tokio::test(start_paused = true)]
async fn test_next_call_reopens_session() {
    init_test_tracing();
    let mesh = mesh(config());
    let a = mesh.start(1).unwrap();
    let b = mesh.start(2).unwrap();

    let ping = b
        .spawn_fiber(SERVER_FIBER)
        .unwrap()
        .add_actor(1, PingActor::new());
    let client = a.spawn_fiber(CLIENT_FIBER).unwrap();

    client
        .call(ping, ping_request(1, "first").unwrap())
        .unwrap()
        .await
        .unwrap();

    // Outbound channel ids start at 1
    a.service.inject_error(1, error_code::ERR_SESSION_DISCONNECTED);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!a.outer.has_session(2));

    let response = client
        .call(ping, ping_request(2, "second").unwrap())
        .unwrap()
        .await
        .unwrap();
    assert_eq!(response.decode::<Pong>().unwrap().seq, 2);
    assert!(a.outer.has_session(2));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_process() {
    init_test_tracing();
    let mesh = mesh(config());
    let a = mesh.start(1).unwrap();
    let client = a.spawn_fiber(CLIENT_FIBER).unwrap();
    let target = ActorId::new(9, 1, 1);

    // Straight to the outer sender: synchronous
    let err = a
        .outer
        .call(target, Request::new(1, Bytes::new()), true)
        .unwrap_err();
    assert!(matches!(err, ActorError::UnknownProcess { process: 9 }));

    // Through the relay: reported inside the tunnelled response
    let err = client
        .call(target, Request::new(1, Bytes::new()))
        .unwrap()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RpcError::Transport { error, .. } if error == error_code::ERR_PEER_UNREACHABLE
    ));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_destination_is_synchronous() {
    init_test_tracing();
    let mesh = mesh(config());
    let a = mesh.start(1).unwrap();
    let client = a.spawn_fiber(CLIENT_FIBER).unwrap();

    let err = client
        .call(ActorId::default(), Request::new(1, Bytes::new()))
        .unwrap_err();
    assert!(matches!(err, ActorError::InvalidDestination { .. }));
    assert!(a
        .outer
        .send(ActorId::default(), Message::new(1, Bytes::new()))
        .is_err());

    assert_eq!(client.sender().pending_calls(), 0);
    assert_eq!(a.outer.pending_calls(), 0);
    assert_eq!(a.service.channel_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stopped_relay() {
    init_test_tracing();
    let mesh = mesh(config());
    let a = mesh.start(1).unwrap();
    let client = a.spawn_fiber(CLIENT_FIBER).unwrap();

    assert!(a.system.stop_fiber(a.system.config().relay_fiber).await);
    assert!(a.system.relay().is_none());

    let err = client
        .call(ActorId::new(2, 2, 1), Request::new(1, Bytes::new()))
        .unwrap_err();
    assert!(matches!(err, ActorError::RelayUnavailable { .. }));
    assert_eq!(client.sender().pending_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_oversized_frame_fails_only_its_sender() {
    init_test_tracing();
    let config = MessagingConfig {
        max_frame_size: 1024,
        ..config()
    };
    let mesh = mesh(config);
    let a = mesh.start(1).unwrap();
    let b = mesh.start(2).unwrap();

    let silent_actor = SilentActor::new();
    let silent = b
        .spawn_fiber(SERVER_FIBER)
        .unwrap()
        .add_actor(1, silent_actor.clone());
    let client = a.spawn_fiber(CLIENT_FIBER).unwrap();

    let mut healthy = client.call(silent, ping_request(1, "wait").unwrap()).unwrap();
    silent_actor.wait_for_request().await;

    let big = Bytes::from(vec![7u8; 4096]);
    let err = a
        .outer
        .send(silent, Message::new(1, big.clone()))
        .unwrap_err();
    assert!(matches!(
        err,
        ActorError::Transport(TransportError::FrameTooLarge { max: 1024, .. })
    ));

    // Through the relay the rejection comes back as a transport failure
    let started = Instant::now();
    let err = client
        .call(silent, Request::new(2, big.clone()))
        .unwrap()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RpcError::Transport { error, .. } if error == error_code::ERR_FRAME_TOO_LARGE
    ));
    assert!(started.elapsed() < RPC_TIMEOUT);
    client.send(silent, Message::new(3, big)).unwrap();

    // The session and the call already on it are untouched
    assert!(
        tokio::time::timeout(Duration::from_millis(500), &mut healthy)
            .await
            .is_err()
    );
    assert!(a.outer.has_session(2));
    assert_eq!(a.outer.metrics().snapshot().transport_failures, 0);
    assert!(healthy.await.unwrap_err().is_timeout());
}
