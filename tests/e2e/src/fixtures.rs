//! Test fixtures: mesh processes wired over a shared network

use anyhow::{Context, Result};
use mesh_actors::{ActorSystem, FiberContext, ProcessOuterSender};
use mesh_config::{MessagingConfig, ProcessDirectory};
use mesh_network::{
    event_channel, EventReceiver, MemoryNetwork, MemoryService, Service, TcpService,
};
use std::net::{Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, info};

/// Inner endpoint of `process` on the in-memory network. The whole id sits
/// in the low 32 bits of a unique-local address, so distinct ids never share
/// an endpoint.
pub fn memory_endpoint(process: i32) -> SocketAddr {
    let id = process as u32;
    let ip = Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, (id >> 16) as u16, id as u16);
    SocketAddr::from((ip, 7000))
}

/// One running mesh process: its actor system, relay and service
pub struct MeshProcess<S> {
    pub system: ActorSystem,
    pub outer: Arc<ProcessOuterSender>,
    pub service: S,
}

impl<S: Service + Clone + 'static> MeshProcess<S> {
    pub fn start(
        process: i32,
        config: &MessagingConfig,
        service: S,
        events: EventReceiver,
        directory: ProcessDirectory,
    ) -> Result<Self> {
        let system = ActorSystem::new(process, config.clone());
        let shared: Arc<dyn Service> = Arc::new(service.clone());
        let outer = system
            .start_relay(shared, events, directory)
            .with_context(|| format!("Failed to start relay of process {}", process))?;
        info!(process, service = %service.service_type(), "Mesh process started");
        Ok(Self {
            system,
            outer,
            service,
        })
    }

    pub fn process(&self) -> i32 {
        self.system.process()
    }

    pub fn spawn_fiber(&self, fiber: i32) -> Result<FiberContext> {
        Ok(self.system.spawn_fiber(fiber)?)
    }

    pub async fn shutdown(&self) {
        self.system.shutdown().await;
    }
}

/// Processes sharing one in-memory network.
///
/// Every process has to be declared before the first one starts: each
/// relay takes a copy of the directory.
pub struct MemoryMesh {
    network: MemoryNetwork,
    directory: ProcessDirectory,
    config: MessagingConfig,
}

impl MemoryMesh {
    pub fn new(config: MessagingConfig) -> Self {
        Self {
            network: MemoryNetwork::new(),
            directory: ProcessDirectory::new(),
            config,
        }
    }

    pub fn with_process(mut self, process: i32) -> Result<Self> {
        self.directory.insert(process, memory_endpoint(process))?;
        Ok(self)
    }

    /// Declare a process whose endpoint accepts the connection but never
    /// answers anything
    pub fn with_unreachable(mut self, process: i32) -> Result<Self> {
        let endpoint = memory_endpoint(process);
        self.directory.insert(process, endpoint)?;
        self.network.black_hole(endpoint);
        Ok(self)
    }

    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }

    pub fn directory(&self) -> &ProcessDirectory {
        &self.directory
    }

    pub fn config(&self) -> &MessagingConfig {
        &self.config
    }

    pub fn start(&self, process: i32) -> Result<MeshProcess<MemoryService>> {
        let endpoint = self
            .directory
            .inner_endpoint(process)
            .with_context(|| format!("Process {} was not declared", process))?;
        let (events_tx, events_rx) = event_channel();
        let service = MemoryService::bind(&self.network, endpoint, &self.config, events_tx)?;
        MeshProcess::start(process, &self.config, service, events_rx, self.directory.clone())
    }
}

/// Start `processes` on TCP loopback with ephemeral ports
pub async fn start_tcp_mesh(
    config: &MessagingConfig,
    processes: &[i32],
) -> Result<Vec<MeshProcess<TcpService>>> {
    let mut directory = ProcessDirectory::new();
    let mut bound = Vec::with_capacity(processes.len());

    for &process in processes {
        let (events_tx, events_rx) = event_channel();
        let service = TcpService::bind(SocketAddr::from(([127, 0, 0, 1], 0)), config, events_tx).await?;
        let endpoint = service
            .local_endpoint()
            .context("TCP service has no local endpoint")?;
        directory.insert(process, endpoint)?;
        debug!(process, %endpoint, "TCP service bound");
        bound.push((process, service, events_rx));
    }

    bound
        .into_iter()
        .map(|(process, service, events)| {
            MeshProcess::start(process, config, service, events, directory.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_endpoints_are_distinct() {
        assert_ne!(memory_endpoint(1), memory_endpoint(257));
        assert_ne!(memory_endpoint(1), memory_endpoint(65_537));
        assert_ne!(memory_endpoint(-1), memory_endpoint(i32::MAX));
        assert_eq!(memory_endpoint(258), memory_endpoint(258));
    }

    #[tokio::test]
    async fn test_mesh_with_wide_process_ids() {
        let mesh = MemoryMesh::new(MessagingConfig::default())
            .with_process(1)
            .unwrap()
            .with_process(257)
            .unwrap();
        let a = mesh.start(1).unwrap();
        let b = mesh.start(257).unwrap();
        assert_eq!(a.process(), 1);
        assert_eq!(b.process(), 257);
        assert_ne!(mesh.directory().inner_endpoint(1), mesh.directory().inner_endpoint(257));
    }
}
