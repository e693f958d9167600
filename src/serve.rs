//! Server orchestration
//!
//! Binds the TCP and UDP data ports on ephemeral numbers, advertises them
//! over the discovery port once a second, and fans every TCP connection and
//! UDP request out to its own task. One watch channel stops all three loops.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::future::join_all;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::discover::{self, BROADCAST_ADDR, OFFER_INTERVAL};
use crate::net;
use crate::protocol::{DISCOVERY_PORT, OfferMessage, RequestMessage};
use crate::tcp;
use crate::udp;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Destination port for offer broadcasts.
    pub discovery_port: u16,
    /// Destination address for offer broadcasts. Tests point this at
    /// loopback instead of the limited broadcast address.
    pub broadcast_addr: IpAddr,
    /// Time between offer broadcasts.
    pub broadcast_interval: Duration,
    /// Payload bytes per UDP segment.
    pub udp_payload_size: usize,
    /// Write granularity for TCP transfers.
    pub tcp_chunk_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            discovery_port: DISCOVERY_PORT,
            broadcast_addr: IpAddr::V4(BROADCAST_ADDR),
            broadcast_interval: OFFER_INTERVAL,
            udp_payload_size: udp::DEFAULT_PAYLOAD_SIZE,
            tcp_chunk_size: tcp::DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Speed-test server: advertises itself and answers transfer requests.
pub struct Server {
    config: ServerConfig,
    shutdown_tx: watch::Sender<bool>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            shutdown_tx,
        }
    }

    /// Signal every server loop to stop. `run` returns once they have.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Bind the data ports and serve until [`Server::shutdown`] is called.
    ///
    /// A zero UDP payload or TCP chunk size is refused up front.
    pub async fn run(&self) -> anyhow::Result<()> {
        if self.config.udp_payload_size == 0 {
            anyhow::bail!("udp payload size must be at least 1 byte");
        }
        if self.config.tcp_chunk_size == 0 {
            anyhow::bail!("tcp chunk size must be at least 1 byte");
        }

        let ip = net::local_ip();

        let listener = TcpListener::bind("0.0.0.0:0")
            .await
            .context("binding TCP data port")?;
        let tcp_port = listener.local_addr()?.port();

        let data_socket = Arc::new(
            UdpSocket::bind("0.0.0.0:0")
                .await
                .context("binding UDP data port")?,
        );
        let udp_port = data_socket.local_addr()?.port();

        let broadcast = net::broadcast_socket()
            .await
            .context("binding broadcast socket")?;

        info!("Server started, listening on IP address {}", ip);
        info!(
            "Offering tcp port {} and udp port {} via discovery port {}",
            tcp_port, udp_port, self.config.discovery_port
        );

        let offer = OfferMessage { udp_port, tcp_port };
        let target = SocketAddr::new(self.config.broadcast_addr, self.config.discovery_port);

        let handles = vec![
            tokio::spawn(discover::broadcast_offers(
                broadcast,
                target,
                offer,
                self.config.broadcast_interval,
                self.shutdown_tx.subscribe(),
            )),
            tokio::spawn(accept_loop(
                listener,
                self.config.tcp_chunk_size,
                self.shutdown_tx.subscribe(),
            )),
            tokio::spawn(request_loop(
                data_socket,
                self.config.udp_payload_size,
                self.shutdown_tx.subscribe(),
            )),
        ];
        join_all(handles).await;

        info!("Server stopped");
        Ok(())
    }
}

/// Accept TCP clients and hand each connection its own task.
async fn accept_loop(listener: TcpListener, chunk_size: usize, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            debug!("TCP accept loop stopping");
            break;
        }

        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    info!("Client connected: {}", peer);
                    tokio::spawn(async move {
                        if let Err(e) = tcp::serve_connection(stream, chunk_size).await {
                            error!("Client error {}: {}", peer, e);
                        }
                    });
                }
                Err(e) => warn!("TCP accept failed: {}", e),
            },
            _ = shutdown.changed() => {}
        }
    }
}

/// Answer UDP transfer requests, one send task per request.
async fn request_loop(socket: Arc<UdpSocket>, payload_size: usize, mut shutdown: watch::Receiver<bool>) {
    let mut buffer = vec![0u8; 64];
    loop {
        if *shutdown.borrow() {
            debug!("UDP request loop stopping");
            break;
        }

        tokio::select! {
            result = socket.recv_from(&mut buffer) => match result {
                Ok((n, peer)) => {
                    let Some(request) = RequestMessage::decode(&buffer[..n]) else {
                        debug!("Ignoring {} stray bytes from {}", n, peer);
                        continue;
                    };
                    info!("UDP request from {}: {} bytes", peer, request.file_size);
                    let socket = Arc::clone(&socket);
                    tokio::spawn(async move {
                        udp::send_segments(&socket, peer, request.file_size, payload_size).await;
                    });
                }
                Err(e) => warn!("UDP receive failed: {}", e),
            },
            _ = shutdown.changed() => {}
        }
    }
}
