//! LAN discovery via offer broadcast
//!
//! Servers announce their data-plane ports by broadcasting Offer packets to
//! the well-known discovery port once a second; clients listen on that port
//! until a valid offer arrives or their deadline passes.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::net;
use crate::protocol::OfferMessage;

/// Default period between offer broadcasts.
pub const OFFER_INTERVAL: Duration = Duration::from_secs(1);

/// Default client-side deadline for one discovery attempt.
pub const DISCOVERY_WINDOW: Duration = Duration::from_secs(10);

/// Address offers are broadcast to by default.
pub const BROADCAST_ADDR: Ipv4Addr = Ipv4Addr::BROADCAST;

#[derive(Debug, Clone, Copy)]
pub struct DiscoveredServer {
    pub ip: IpAddr,
    pub udp_port: u16,
    pub tcp_port: u16,
}

impl std::fmt::Display for DiscoveredServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (udp {}, tcp {})",
            self.ip, self.udp_port, self.tcp_port
        )
    }
}

/// Broadcast this server's offer until shutdown.
///
/// Best-effort: a failed send is logged and the loop resumes next tick.
pub async fn broadcast_offers(
    socket: UdpSocket,
    target: SocketAddr,
    offer: OfferMessage,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let packet = offer.encode();
    let mut ticker = tokio::time::interval(period);

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = socket.send_to(&packet, target).await {
                    warn!("Offer broadcast to {} failed: {}", target, e);
                }
            }
            _ = shutdown.changed() => {}
        }
    }
    debug!("Offer broadcast stopped");
}

/// Wait for one valid offer on `socket`, for at most `window`.
///
/// Datagrams that fail validation are ignored; only deadline expiry ends the
/// attempt without a result.
pub async fn listen_for_offer(socket: &UdpSocket, window: Duration) -> Option<DiscoveredServer> {
    let deadline = tokio::time::Instant::now() + window;
    let mut buffer = [0u8; 1024];

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return None;
        }

        match timeout(remaining, socket.recv_from(&mut buffer)).await {
            Ok(Ok((len, from))) => {
                if let Some(offer) = OfferMessage::decode(&buffer[..len]) {
                    info!(
                        "Offer from {}: udp {}, tcp {}",
                        from.ip(),
                        offer.udp_port,
                        offer.tcp_port
                    );
                    return Some(DiscoveredServer {
                        ip: from.ip(),
                        udp_port: offer.udp_port,
                        tcp_port: offer.tcp_port,
                    });
                }
                debug!("Ignoring {} foreign bytes from {}", len, from);
            }
            Ok(Err(e)) => warn!("Discovery receive error: {}", e),
            Err(_) => return None,
        }
    }
}

/// One full discovery attempt: bind the shared port and wait for an offer.
pub async fn discover(port: u16, window: Duration) -> anyhow::Result<Option<DiscoveredServer>> {
    let socket = net::discovery_socket(port).await?;
    Ok(listen_for_offer(&socket, window).await)
}
