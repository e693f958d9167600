//! Socket construction and local address discovery.
//!
//! Sockets that need options set before bind (SO_REUSEADDR on the shared
//! discovery port, SO_BROADCAST on the offer sender) are built with socket2
//! and handed to tokio non-blocking. The protocol is IPv4-only: offers go to
//! the limited broadcast address, which has no IPv6 equivalent.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::UdpSocket;
use tracing::debug;

/// Placeholder reported when the outbound interface cannot be resolved.
const FALLBACK_LOCAL_IP: Ipv4Addr = Ipv4Addr::new(172, 1, 0, 4);

/// Address the OS routes a throwaway socket toward to pick the outbound
/// interface. No datagram is ever sent to it.
const PROBE_ADDR: &str = "8.8.8.8:80";

/// Best-effort local address discovery, used for startup reporting.
pub fn local_ip() -> IpAddr {
    match probe_local_ip() {
        Ok(ip) => ip,
        Err(e) => {
            debug!("Could not resolve outbound interface: {}", e);
            IpAddr::V4(FALLBACK_LOCAL_IP)
        }
    }
}

fn probe_local_ip() -> io::Result<IpAddr> {
    let socket = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(PROBE_ADDR)?;
    Ok(socket.local_addr()?.ip())
}

/// UDP socket listening for offers on the shared discovery port.
///
/// SO_REUSEADDR so several clients on one host can listen at once; broadcast
/// datagrams are delivered to every bound socket.
pub async fn discovery_socket(port: u16) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    socket.bind(&SockAddr::from(addr))?;

    // Convert to non-blocking for tokio
    socket.set_nonblocking(true)?;
    let std_socket: std::net::UdpSocket = socket.into();
    let udp = UdpSocket::from_std(std_socket)?;

    debug!("Discovery socket bound to {}", addr);
    Ok(udp)
}

/// Ephemeral UDP socket allowed to send to the broadcast address.
pub async fn broadcast_socket() -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_broadcast(true)?;

    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
    socket.bind(&SockAddr::from(addr))?;

    socket.set_nonblocking(true)?;
    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}
