//! TCP transfer engine
//!
//! The server streams exactly the requested number of filler bytes per
//! connection; the client measures how long the download takes. The request
//! is a single ASCII decimal line, the response is an unframed byte stream
//! ended by the byte count alone.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::stats::TransferReport;

/// Server-side write granularity.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Client-side bound on connect and on each read.
pub const TRANSFER_TIMEOUT: Duration = Duration::from_secs(5);

const RECV_BUFFER_SIZE: usize = 4096;

/// Request lines carry one u64 in ASCII; anything longer is garbage.
const MAX_REQUEST_LINE: usize = 64;

const FILL_BYTE: u8 = b'X';

/// Serve one accepted connection: read the size line, stream filler, close.
///
/// A peer that closes before sending a full line gets a clean return, not an
/// error; an unparsable size aborts this connection only. Callers pass a
/// nonzero `chunk_size`.
pub async fn serve_connection(stream: TcpStream, chunk_size: usize) -> anyhow::Result<()> {
    let peer = stream.peer_addr()?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let Some(line) = read_request_line(&mut reader).await? else {
        debug!("{} closed before sending a request", peer);
        return Ok(());
    };
    let file_size: u64 = line
        .trim()
        .parse()
        .with_context(|| format!("invalid transfer size {:?} from {}", line.trim(), peer))?;

    debug!("TCP request from {}: {} bytes", peer, file_size);

    let buffer = vec![FILL_BYTE; chunk_size];
    let mut sent = 0u64;
    while sent < file_size {
        let len = chunk_size.min((file_size - sent) as usize);
        if let Err(e) = writer.write_all(&buffer[..len]).await {
            warn!("TCP send to {} failed after {} bytes: {}", peer, sent, e);
            return Ok(());
        }
        sent += len as u64;
    }

    let _ = writer.shutdown().await;
    debug!("TCP transfer to {} complete: {} bytes", peer, sent);
    Ok(())
}

/// Read one newline-terminated line, or `None` when the peer closes first.
async fn read_request_line(
    reader: &mut BufReader<OwnedReadHalf>,
) -> anyhow::Result<Option<String>> {
    let mut line = String::new();
    loop {
        let bytes = reader.fill_buf().await?;
        if bytes.is_empty() {
            return Ok(None);
        }

        if let Some(newline_pos) = bytes.iter().position(|&b| b == b'\n') {
            let to_read = newline_pos + 1;
            if line.len() + to_read > MAX_REQUEST_LINE {
                anyhow::bail!("request line exceeds {} bytes", MAX_REQUEST_LINE);
            }
            line.push_str(std::str::from_utf8(&bytes[..to_read])?);
            reader.consume(to_read);
            return Ok(Some(line));
        }

        let len = bytes.len();
        if line.len() + len > MAX_REQUEST_LINE {
            anyhow::bail!("request line exceeds {} bytes", MAX_REQUEST_LINE);
        }
        line.push_str(std::str::from_utf8(bytes)?);
        reader.consume(len);
    }
}

/// Run one client-side transfer against the server's TCP data port.
///
/// Always produces a report: connect failures, timeouts, and premature
/// closes all end the transfer with whatever arrived by then. Wall time
/// runs from just before connect to the end of the receive loop.
pub async fn fetch(server: SocketAddr, file_size: u64, index: usize) -> TransferReport {
    let started = Instant::now();
    let mut received = 0u64;

    match timeout(TRANSFER_TIMEOUT, TcpStream::connect(server)).await {
        Ok(Ok(mut stream)) => {
            let request = format!("{}\n", file_size);
            if let Err(e) = stream.write_all(request.as_bytes()).await {
                warn!("TCP #{}: sending request failed: {}", index, e);
            } else {
                let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
                while received < file_size {
                    match timeout(TRANSFER_TIMEOUT, stream.read(&mut buffer)).await {
                        Ok(Ok(0)) => {
                            debug!("TCP #{}: peer closed after {} bytes", index, received);
                            break;
                        }
                        Ok(Ok(n)) => received += n as u64,
                        Ok(Err(e)) => {
                            warn!("TCP #{}: read failed after {} bytes: {}", index, received, e);
                            break;
                        }
                        Err(_) => {
                            warn!("TCP #{}: timed out after {} bytes", index, received);
                            break;
                        }
                    }
                }
            }
        }
        Ok(Err(e)) => warn!("TCP #{}: connect to {} failed: {}", index, server, e),
        Err(_) => warn!("TCP #{}: connect to {} timed out", index, server),
    }

    TransferReport::tcp(index, received, started.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Protocol;
    use tokio::net::TcpListener;

    async fn spawn_one_shot_server(chunk_size: usize) -> (SocketAddr, tokio::task::JoinHandle<anyhow::Result<()>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await?;
            serve_connection(stream, chunk_size).await
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn test_serve_streams_exact_size() {
        let (addr, server) = spawn_one_shot_server(4096).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"5000\n").await.unwrap();

        let mut data = Vec::new();
        stream.read_to_end(&mut data).await.unwrap();
        assert_eq!(data.len(), 5000);
        assert!(data.iter().all(|&b| b == FILL_BYTE));

        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_serve_aborts_on_garbage_size() {
        let (addr, server) = spawn_one_shot_server(4096).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"banana\n").await.unwrap();

        let mut data = Vec::new();
        stream.read_to_end(&mut data).await.unwrap();
        assert!(data.is_empty());
        assert!(server.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_serve_treats_early_close_as_clean() {
        let (addr, server) = spawn_one_shot_server(4096).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        drop(stream);

        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_fetch_reports_requested_bytes() {
        let (addr, server) = spawn_one_shot_server(4096).await;

        let report = fetch(addr, 5000, 1).await;
        assert_eq!(report.bytes, 5000);
        assert_eq!(report.index, 1);
        assert_eq!(report.protocol, Protocol::Tcp);
        assert!(report.udp.is_none());
        assert!(report.throughput_bps > 0.0);

        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_fetch_truncates_on_premature_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut line = vec![0u8; 16];
            let _ = stream.read(&mut line).await.unwrap();
            stream.write_all(&vec![0u8; 1000]).await.unwrap();
            // Close well short of the requested size.
        });

        let report = fetch(addr, 5000, 2).await;
        assert_eq!(report.bytes, 1000);
    }

    #[tokio::test]
    async fn test_fetch_yields_zero_report_when_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let report = fetch(addr, 5000, 3).await;
        assert_eq!(report.bytes, 0);
        assert_eq!(report.protocol, Protocol::Tcp);
    }
}
