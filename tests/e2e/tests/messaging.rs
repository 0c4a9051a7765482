//! Request/response and fire-and-forget traffic between mesh processes

use bytes::Bytes;
use mesh_actors::RpcError;
use mesh_config::MessagingConfig;
use mesh_e2e::*;
use mesh_network::Service;
use mesh_types::{error_code, ActorId, Message, Request};
use std::sync::Arc;
use std::time::Duration;

const SERVER_FIBER: i32 = 2;
const CLIENT_FIBER: i32 = 3;
const PING_INSTANCE: i64 = 100;

fn config() -> MessagingConfig {
    MessagingConfig::default().with_rpc_timeout(Duration::from_secs(5))
}

fn two_process_mesh() -> MemoryMesh {
    MemoryMesh::new(config())
        .with_process(1)
        .unwrap()
        .with_process(2)
        .unwrap()
}

#[tokio::test]
async fn test_ping_pong_across_processes() {
    init_test_tracing();
    let mesh = two_process_mesh();
    let a = mesh.start(1).unwrap();
    let b = mesh.start(2).unwrap();

    let server = b.spawn_fiber(SERVER_FIBER).unwrap();
    let ping = server.add_actor(PING_INSTANCE, PingActor::new());
    let client = a.spawn_fiber(CLIENT_FIBER).unwrap();

    let pending = client.call(ping, ping_request(7, "hello").unwrap()).unwrap();
    let rpc_id = pending.rpc_id();
    let response = pending.await.unwrap();

    assert_eq!(response.opcode, OP_PONG);
    assert_eq!(response.rpc_id, rpc_id);
    let pong: Pong = response.decode().unwrap();
    assert_eq!(
        pong,
        Pong {
            seq: 7,
            text: "hello".to_string(),
            process: 2
        }
    );

    assert!(a.outer.has_session(2));
    assert_eq!(client.sender().pending_calls(), 0);
    assert_eq!(a.outer.pending_calls(), 0);
}

#[tokio::test]
async fn test_relay_forwards_exactly_once() {
    init_test_tracing();
    let mesh = two_process_mesh();
    let a = mesh.start(1).unwrap();
    let b = mesh.start(2).unwrap();

    let ping_actor = PingActor::new();
    let ping = b
        .spawn_fiber(SERVER_FIBER)
        .unwrap()
        .add_actor(PING_INSTANCE, ping_actor.clone());
    let client = a.spawn_fiber(CLIENT_FIBER).unwrap();

    for seq in 0..3 {
        let response = client
            .call(ping, ping_request(seq, "tunnel").unwrap())
            .unwrap()
            .await
            .unwrap();
        assert_eq!(response.decode::<Pong>().unwrap().seq, seq);
    }

    assert_eq!(ping_actor.served(), 3);
    let client_stats = client.sender().metrics().snapshot();
    assert_eq!(client_stats.relay_sends, 3);
    assert_eq!(client_stats.session_sends, 0);
    assert_eq!(a.outer.metrics().snapshot().session_sends, 3);
    // One session per remote process, reused
    assert_eq!(a.service.channel_count(), 1);
}

#[tokio::test]
async fn test_local_targets_never_touch_a_session() {
    init_test_tracing();
    let mesh = two_process_mesh();
    let a = mesh.start(1).unwrap();

    let ping_actor = PingActor::new();
    let ping = a
        .spawn_fiber(SERVER_FIBER)
        .unwrap()
        .add_actor(PING_INSTANCE, ping_actor.clone());
    let client = a.spawn_fiber(CLIENT_FIBER).unwrap();

    let response = client
        .call(ping, ping_request(1, "local").unwrap())
        .unwrap()
        .await
        .unwrap();
    assert_eq!(response.decode::<Pong>().unwrap().process, 1);

    // The relay can also reach local actors without a session
    let via_outer = a
        .outer
        .call(ping, ping_request(2, "outer").unwrap(), true)
        .unwrap()
        .await
        .unwrap();
    assert_eq!(via_outer.decode::<Pong>().unwrap().seq, 2);

    assert_eq!(ping_actor.served(), 2);
    assert_eq!(a.service.channel_count(), 0);
    assert_eq!(a.outer.session_count(), 0);
    assert_eq!(client.sender().metrics().snapshot().relay_sends, 0);
}

#[tokio::test]
async fn test_messages_keep_order_across_processes() {
    init_test_tracing();
    let mesh = two_process_mesh();
    let a = mesh.start(1).unwrap();
    let b = mesh.start(2).unwrap();

    let (recorder, mut received) = RecordingActor::new();
    let sink = b.spawn_fiber(SERVER_FIBER).unwrap().add_actor(5, recorder);
    let client = a.spawn_fiber(CLIENT_FIBER).unwrap();

    for opcode in 0..10u16 {
        client
            .send(sink, Message::new(opcode, Bytes::from(vec![opcode as u8])))
            .unwrap();
    }

    for opcode in 0..10u16 {
        let (from, message) = tokio::time::timeout(Duration::from_secs(5), received.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.opcode, opcode);
        assert_eq!(&message.body[..], &[opcode as u8]);
        // Inbound session traffic is delivered on behalf of the local relay
        assert_eq!(from.process, 2);
    }
}

#[tokio::test]
async fn test_nested_call_back_into_calling_process() {
    init_test_tracing();
    let mesh = two_process_mesh();
    let a = mesh.start(1).unwrap();
    let b = mesh.start(2).unwrap();

    // 1:3 ─▶ 2:2 forwarder ─▶ 1:2 ping
    let ping = a
        .spawn_fiber(SERVER_FIBER)
        .unwrap()
        .add_actor(PING_INSTANCE, PingActor::new());
    let forwarder = b
        .spawn_fiber(SERVER_FIBER)
        .unwrap()
        .add_actor(9, Arc::new(ForwardActor { target: ping }));
    let client = a.spawn_fiber(CLIENT_FIBER).unwrap();

    let response = client
        .call(forwarder, ping_request(11, "round trip").unwrap())
        .unwrap()
        .await
        .unwrap();
    let pong: Pong = response.decode().unwrap();
    assert_eq!(pong.seq, 11);
    assert_eq!(pong.process, 1);

    assert!(a.outer.has_session(2));
    assert!(b.outer.has_session(1));
}

#[tokio::test]
async fn test_application_errors_follow_need_exception() {
    init_test_tracing();
    let mesh = two_process_mesh();
    let a = mesh.start(1).unwrap();
    let b = mesh.start(2).unwrap();

    let server = b.spawn_fiber(SERVER_FIBER).unwrap();
    let hard = server.add_actor(
        1,
        Arc::new(FailingActor {
            error: error_code::ERR_APPLICATION_BASE + 5,
        }),
    );
    let soft = server.add_actor(
        2,
        Arc::new(FailingActor {
            error: error_code::ERR_NO_THROW_FLOOR + 5,
        }),
    );
    let client = a.spawn_fiber(CLIENT_FIBER).unwrap();

    let err = client
        .call(hard, Request::new(33, Bytes::new()))
        .unwrap()
        .await
        .unwrap_err();
    match err {
        RpcError::Application {
            target,
            opcode,
            error,
            message,
            ..
        } => {
            assert_eq!(target, hard);
            assert_eq!(opcode, 33);
            assert_eq!(error, error_code::ERR_APPLICATION_BASE + 5);
            assert_eq!(message, "rejected opcode 33");
        }
        other => panic!("unexpected error {other:?}"),
    }

    let value = client
        .call_with(hard, Request::new(33, Bytes::new()), false)
        .unwrap()
        .await
        .unwrap();
    assert_eq!(value.error, error_code::ERR_APPLICATION_BASE + 5);

    let soft_value = client
        .call(soft, Request::new(34, Bytes::new()))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(soft_value.error, error_code::ERR_NO_THROW_FLOOR + 5);
}

#[tokio::test]
async fn test_missing_remote_actor_and_fiber() {
    init_test_tracing();
    let mesh = two_process_mesh();
    let a = mesh.start(1).unwrap();
    let b = mesh.start(2).unwrap();
    let _server = b.spawn_fiber(SERVER_FIBER).unwrap();
    let client = a.spawn_fiber(CLIENT_FIBER).unwrap();

    for target in [ActorId::new(2, SERVER_FIBER, 999), ActorId::new(2, 42, 1)] {
        let err = client
            .call(target, Request::new(1, Bytes::new()))
            .unwrap()
            .await
            .unwrap_err();
        assert_eq!(err, RpcError::NotFoundActor { target, rpc_id: err.rpc_id() });
    }
}
