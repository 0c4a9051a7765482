//! Processes assembled from configuration files

use mesh_actors::ActorSystem;
use mesh_config::{MeshConfig, ProcessDirectory};
use mesh_e2e::*;
use mesh_network::{event_channel, MemoryNetwork, MemoryService};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn config_text(process_id: i32) -> String {
    format!(
        r#"
process_id = {process_id}

[messaging]
rpc_timeout_ms = 2000
relay_fiber = 1

[logging]
level = "debug"

[[processes]]
id = 1
inner_endpoint = "10.1.0.1:7000"

[[processes]]
id = 2
inner_endpoint = "10.1.0.2:7000"
"#
    )
}

fn start_from_config(network: &MemoryNetwork, config: &MeshConfig) -> anyhow::Result<ActorSystem> {
    let own = config
        .own_entry()
        .ok_or_else(|| anyhow::anyhow!("process {} is not listed", config.process_id))?;
    let directory = ProcessDirectory::from_entries(&config.processes)?;
    let (events_tx, events_rx) = event_channel();
    let service = MemoryService::bind(network, own.inner_endpoint, &config.messaging, events_tx)?;

    let system = ActorSystem::from_config(config);
    system.start_relay(Arc::new(service), events_rx, directory)?;
    Ok(system)
}

#[tokio::test]
async fn test_mesh_from_config_files() {
    init_test_tracing();
    let dir = tempdir().unwrap();
    let mut configs = Vec::new();
    for process_id in [1, 2] {
        let path = dir.path().join(format!("process-{process_id}.toml"));
        fs::write(&path, config_text(process_id)).unwrap();
        configs.push(MeshConfig::load(&path).unwrap());
    }
    assert_eq!(configs[0].messaging.rpc_timeout(), Duration::from_secs(2));
    assert_eq!(configs[1].logging.level, "debug");

    let network = MemoryNetwork::new();
    let first = start_from_config(&network, &configs[0]).unwrap();
    let second = start_from_config(&network, &configs[1]).unwrap();

    let ping = second
        .spawn_fiber(5)
        .unwrap()
        .add_actor(1, PingActor::new());
    let client = first.spawn_fiber(5).unwrap();

    let pong: Pong = client
        .call(ping, ping_request(3, "configured").unwrap())
        .unwrap()
        .await
        .unwrap()
        .decode()
        .unwrap();
    assert_eq!(pong.process, 2);
    assert!(first.relay().unwrap().has_session(2));
}

#[test]
fn test_invalid_relay_fiber_rejected() {
    let text = config_text(1).replace("relay_fiber = 1", "relay_fiber = 0");
    assert!(MeshConfig::from_toml_str(&text).is_err());
}
