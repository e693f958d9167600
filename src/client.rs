//! Client orchestration
//!
//! Waits for a server offer, then launches the configured number of TCP and
//! UDP transfers against it in parallel and collects their reports.

use std::net::SocketAddr;
use std::time::Duration;

use futures::future::join_all;
use tracing::{error, info};

use crate::discover::{self, DISCOVERY_WINDOW, DiscoveredServer};
use crate::protocol::DISCOVERY_PORT;
use crate::stats::TransferReport;
use crate::tcp;
use crate::udp;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Port to listen on for offer broadcasts.
    pub discovery_port: u16,
    /// How long to wait for an offer before giving up.
    pub discovery_timeout: Duration,
    /// Bytes requested per transfer.
    pub file_size: u64,
    /// Parallel TCP transfers per test cycle.
    pub tcp_connections: usize,
    /// Parallel UDP transfers per test cycle.
    pub udp_connections: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            discovery_port: DISCOVERY_PORT,
            discovery_timeout: DISCOVERY_WINDOW,
            file_size: 100 * 1024 * 1024,
            tcp_connections: 1,
            udp_connections: 1,
        }
    }
}

/// Speed-test client: discovers a server and measures transfers against it.
pub struct Client {
    config: ClientConfig,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Listen for one offer broadcast. `Ok(None)` means the window elapsed
    /// without hearing a server.
    pub async fn discover(&self) -> anyhow::Result<Option<DiscoveredServer>> {
        discover::discover(self.config.discovery_port, self.config.discovery_timeout).await
    }

    /// Run the configured transfers against `server`, all in parallel.
    ///
    /// Every spawned transfer yields a report even on failure. Reports come
    /// back TCP first then UDP, each numbered from 1 within its protocol.
    pub async fn run_transfers(&self, server: &DiscoveredServer) -> Vec<TransferReport> {
        let tcp_addr = SocketAddr::new(server.ip, server.tcp_port);
        let udp_addr = SocketAddr::new(server.ip, server.udp_port);
        let file_size = self.config.file_size;

        info!(
            "Starting {} TCP and {} UDP transfers of {} bytes against {}",
            self.config.tcp_connections, self.config.udp_connections, file_size, server
        );

        let mut handles =
            Vec::with_capacity(self.config.tcp_connections + self.config.udp_connections);
        for index in 1..=self.config.tcp_connections {
            handles.push(tokio::spawn(tcp::fetch(tcp_addr, file_size, index)));
        }
        for index in 1..=self.config.udp_connections {
            handles.push(tokio::spawn(udp::fetch(udp_addr, file_size, index)));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for result in join_all(handles).await {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => error!("Transfer task failed: {}", e),
            }
        }

        info!("All transfers complete");
        reports
    }
}
