//! The same scenarios over real TCP loopback connections

use bytes::Bytes;
use mesh_actors::RpcError;
use mesh_config::{MessagingConfig, ProcessDirectory};
use mesh_e2e::*;
use mesh_network::{event_channel, TcpService};
use mesh_types::{error_code, ActorId, Request};
use std::net::SocketAddr;
use std::time::Duration;

fn config() -> MessagingConfig {
    MessagingConfig::default().with_rpc_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn test_ping_pong_over_tcp() {
    init_test_tracing();
    let mut processes = start_tcp_mesh(&config(), &[1, 2]).await.unwrap();
    let b = processes.pop().unwrap();
    let a = processes.pop().unwrap();

    let ping_actor = PingActor::new();
    let ping = b.spawn_fiber(2).unwrap().add_actor(7, ping_actor.clone());
    let client = a.spawn_fiber(3).unwrap();

    for seq in 0..20 {
        let response = client
            .call(ping, ping_request(seq, "tcp").unwrap())
            .unwrap()
            .await
            .unwrap();
        let pong: Pong = response.decode().unwrap();
        assert_eq!(pong.seq, seq);
        assert_eq!(pong.process, 2);
    }
    assert_eq!(ping_actor.served(), 20);
    assert_eq!(client.sender().pending_calls(), 0);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_calls_over_tcp() {
    init_test_tracing();
    let mut processes = start_tcp_mesh(&config(), &[1, 2]).await.unwrap();
    let b = processes.pop().unwrap();
    let a = processes.pop().unwrap();

    let ping = b.spawn_fiber(2).unwrap().add_actor(7, PingActor::new());
    let client = a.spawn_fiber(3).unwrap();

    let calls: Vec<_> = (0..50)
        .map(|seq| client.call(ping, ping_request(seq, "burst").unwrap()).unwrap())
        .collect();
    for (seq, call) in calls.into_iter().enumerate() {
        let pong: Pong = call.await.unwrap().decode().unwrap();
        assert_eq!(pong.seq as usize, seq);
    }
    assert_eq!(a.outer.pending_calls(), 0);
}

#[tokio::test]
async fn test_refused_connection_fails_fast() {
    init_test_tracing();
    // Reserve a port, then close it so connecting is refused
    let closed: SocketAddr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let config = config();
    let (events_tx, events_rx) = event_channel();
    let service = TcpService::client(&config, events_tx);
    let directory = ProcessDirectory::new().with_process(2, closed).unwrap();
    let a = MeshProcess::start(1, &config, service, events_rx, directory).unwrap();
    let client = a.spawn_fiber(3).unwrap();

    let started = tokio::time::Instant::now();
    let err = client
        .call(ActorId::new(2, 2, 1), Request::new(1, Bytes::new()))
        .unwrap()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RpcError::Transport { error, .. } if error == error_code::ERR_PEER_UNREACHABLE
    ));
    assert!(started.elapsed() < config.rpc_timeout());
    assert!(!a.outer.has_session(2));
}
