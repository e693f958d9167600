//! UDP transfer engine
//!
//! The server answers each request with a burst of numbered segments; the
//! client counts what arrives and stops after a quiet period, since UDP has
//! no end-of-stream. Segment arithmetic lives here so both sides agree on
//! how a file size maps onto datagrams.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::protocol::{RequestMessage, SEGMENT_HEADER_SIZE, SegmentHeader};
use crate::stats::TransferReport;

/// How long the client waits without a segment before calling the
/// transfer finished.
pub const QUIET_PERIOD: Duration = Duration::from_secs(1);

/// Payload bytes per segment on the server side.
pub const DEFAULT_PAYLOAD_SIZE: usize = 1024;

/// UDP caps a datagram's length at `u16::MAX`, so any segment a server can
/// emit fits regardless of its configured payload size.
const RECV_BUFFER_SIZE: usize = SEGMENT_HEADER_SIZE + u16::MAX as usize;

const FILL_BYTE: u8 = b'Y';

/// Number of segments a transfer of `file_size` bytes needs at the given
/// payload size. The last segment carries the remainder. Panics if
/// `payload_size` is zero.
pub fn segment_count(file_size: u64, payload_size: usize) -> u64 {
    file_size.div_ceil(payload_size as u64)
}

/// Send every segment of one requested transfer to `peer`.
///
/// Send errors stop the burst early; UDP offers no recovery worth doing.
/// Returns the number of segments actually sent.
pub async fn send_segments(
    socket: &UdpSocket,
    peer: SocketAddr,
    file_size: u64,
    payload_size: usize,
) -> u64 {
    let total = segment_count(file_size, payload_size);
    let mut sent = 0u64;

    for current in 1..=total {
        let offset = (current - 1) * payload_size as u64;
        let len = payload_size.min((file_size - offset) as usize);

        let mut packet = vec![FILL_BYTE; SEGMENT_HEADER_SIZE + len];
        SegmentHeader {
            total_segments: total,
            current_segment: current,
        }
        .encode(&mut packet);

        if let Err(e) = socket.send_to(&packet, peer).await {
            warn!("UDP send to {} failed at segment {}/{}: {}", peer, current, total, e);
            return sent;
        }
        sent += 1;
    }

    debug!("UDP transfer to {} complete: {} segments, {} bytes", peer, sent, file_size);
    sent
}

/// Run one client-side transfer against the server's UDP data port.
///
/// Sends the request from a fresh ephemeral socket, then collects segments
/// until the quiet period elapses with nothing new. Foreign datagrams are
/// ignored and do not reset the quiet clock. Always produces a report;
/// wall time includes the trailing quiet period.
pub async fn fetch(server: SocketAddr, file_size: u64, index: usize) -> TransferReport {
    let started = Instant::now();

    let socket = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(socket) => socket,
        Err(e) => {
            warn!("UDP #{}: binding data socket failed: {}", index, e);
            return TransferReport::udp(index, 0, started.elapsed(), 0, 0);
        }
    };

    let request = RequestMessage { file_size };
    if let Err(e) = socket.send_to(&request.encode(), server).await {
        warn!("UDP #{}: sending request to {} failed: {}", index, server, e);
        return TransferReport::udp(index, 0, started.elapsed(), 0, 0);
    }

    let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
    let mut bytes = 0u64;
    let mut total_segments = 0u64;
    let mut segments_received = 0u64;
    let mut last_receipt = Instant::now();

    loop {
        let Some(remaining) = QUIET_PERIOD.checked_sub(last_receipt.elapsed()) else {
            break;
        };
        match timeout(remaining, socket.recv_from(&mut buffer)).await {
            Ok(Ok((n, _addr))) => {
                if let Some(header) = SegmentHeader::decode(&buffer[..n]) {
                    total_segments = header.total_segments;
                    segments_received += 1;
                    bytes += (n - SEGMENT_HEADER_SIZE) as u64;
                    last_receipt = Instant::now();
                }
            }
            Ok(Err(e)) => warn!("UDP #{}: receive error: {}", index, e),
            Err(_) => break,
        }
    }

    debug!(
        "UDP #{}: {} of {} segments, {} bytes",
        index, segments_received, total_segments, bytes
    );
    TransferReport::udp(index, bytes, started.elapsed(), total_segments, segments_received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Protocol;

    #[test]
    fn test_segment_count() {
        assert_eq!(segment_count(2500, 1024), 3);
        assert_eq!(segment_count(2048, 1024), 2);
        assert_eq!(segment_count(1, 1024), 1);
        assert_eq!(segment_count(1024, 1024), 1);
        assert_eq!(segment_count(0, 1024), 0);
    }

    #[tokio::test]
    async fn test_send_segments_covers_file_exactly() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client_addr = client.local_addr().unwrap();

        let sent = send_segments(&server, client_addr, 2500, 1024).await;
        assert_eq!(sent, 3);

        let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
        let mut payload_total = 0usize;
        for expected in 1..=3u64 {
            let (n, _) = client.recv_from(&mut buffer).await.unwrap();
            let header = SegmentHeader::decode(&buffer[..n]).unwrap();
            assert_eq!(header.total_segments, 3);
            assert_eq!(header.current_segment, expected);
            assert!(buffer[SEGMENT_HEADER_SIZE..n].iter().all(|&b| b == FILL_BYTE));
            payload_total += n - SEGMENT_HEADER_SIZE;
        }
        assert_eq!(payload_total, 2500);
    }

    #[tokio::test]
    async fn test_send_segments_last_chunk_is_remainder() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client_addr = client.local_addr().unwrap();

        send_segments(&server, client_addr, 2500, 1024).await;

        let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
        let mut sizes = Vec::new();
        for _ in 0..3 {
            let (n, _) = client.recv_from(&mut buffer).await.unwrap();
            sizes.push(n - SEGMENT_HEADER_SIZE);
        }
        assert_eq!(sizes, vec![1024, 1024, 452]);
    }

    #[tokio::test]
    async fn test_send_segments_full_chunks_when_size_divides() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client_addr = client.local_addr().unwrap();

        let sent = send_segments(&server, client_addr, 2048, 1024).await;
        assert_eq!(sent, 2);

        let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
        for _ in 0..2 {
            let (n, _) = client.recv_from(&mut buffer).await.unwrap();
            assert_eq!(n - SEGMENT_HEADER_SIZE, 1024);
        }
    }

    #[tokio::test]
    async fn test_fetch_collects_full_transfer() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
            let (n, requester) = server.recv_from(&mut buffer).await.unwrap();
            let request = RequestMessage::decode(&buffer[..n]).unwrap();
            assert_eq!(request.file_size, 2500);
            send_segments(&server, requester, request.file_size, 1024).await;
        });

        let report = fetch(server_addr, 2500, 1).await;
        assert_eq!(report.protocol, Protocol::Udp);
        assert_eq!(report.bytes, 2500);
        let udp = report.udp.unwrap();
        assert_eq!(udp.total_segments, 3);
        assert_eq!(udp.segments_received, 3);
        assert_eq!(udp.success_percent, 100.0);
        // The quiet period is part of the measured wall time.
        assert!(report.duration_secs >= QUIET_PERIOD.as_secs_f64());
    }

    #[tokio::test]
    async fn test_fetch_gives_empty_report_from_silent_server() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let report = fetch(server_addr, 1000, 2).await;
        assert_eq!(report.bytes, 0);
        let udp = report.udp.unwrap();
        assert_eq!(udp.total_segments, 0);
        assert_eq!(udp.segments_received, 0);
        assert_eq!(udp.success_percent, 0.0);
    }

    #[tokio::test]
    async fn test_fetch_ignores_foreign_datagrams() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
            let (_, requester) = server.recv_from(&mut buffer).await.unwrap();
            server.send_to(b"not a segment", requester).await.unwrap();
            send_segments(&server, requester, 100, 1024).await;
        });

        let report = fetch(server_addr, 100, 3).await;
        assert_eq!(report.bytes, 100);
        assert_eq!(report.udp.unwrap().segments_received, 1);
    }

    #[tokio::test]
    async fn test_fetch_keeps_oversize_segments_intact() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        // One segment, payload well past the default size.
        tokio::spawn(async move {
            let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
            let (_, requester) = server.recv_from(&mut buffer).await.unwrap();
            send_segments(&server, requester, 3000, 3000).await;
        });

        let report = fetch(server_addr, 3000, 4).await;
        assert_eq!(report.bytes, 3000, "payload must arrive untruncated");
        let udp = report.udp.unwrap();
        assert_eq!(udp.total_segments, 1);
        assert_eq!(udp.segments_received, 1);
    }

    #[tokio::test]
    async fn test_fetch_reports_partial_delivery() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        // Advertise three segments but deliver only the first two.
        tokio::spawn(async move {
            let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
            let (_, requester) = server.recv_from(&mut buffer).await.unwrap();
            for current in 1..=2u64 {
                let mut packet = vec![FILL_BYTE; SEGMENT_HEADER_SIZE + 1024];
                SegmentHeader {
                    total_segments: 3,
                    current_segment: current,
                }
                .encode(&mut packet);
                server.send_to(&packet, requester).await.unwrap();
            }
        });

        let report = fetch(server_addr, 2500, 5).await;
        assert_eq!(report.bytes, 2048);
        let udp = report.udp.unwrap();
        assert_eq!(udp.total_segments, 3);
        assert_eq!(udp.segments_received, 2);
        assert!((udp.success_percent - 66.67).abs() < 0.01);
    }
}
