//! Async UDP request/response transport shared by the manager, disk, and
//! user binaries.
//!
//! The source implementation's fixed receive buffer (1024 or 8192 bytes
//! depending on which constants file you read) cannot hold a base64-encoded
//! 1 MiB striping unit. This module sizes its buffers from the largest
//! striping unit the system allows instead of a hardcoded constant.

use std::net::SocketAddr;
use std::time::Duration;

use dss_core::{Request, Response, WireError};
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Largest striping unit the manager will ever admit (`configure-dss`
/// validates against this same bound).
pub const MAX_STRIPING_UNIT: usize = 1_048_576;

/// Base64 expands payloads by 4/3; add headroom for JSON envelope overhead
/// (command name, parameter keys, stripe/dss/file identifiers).
const ENVELOPE_OVERHEAD: usize = 4096;

/// Receive buffer large enough for one base64-encoded block of
/// `MAX_STRIPING_UNIT` bytes plus envelope overhead. Every socket in this
/// system allocates a buffer of this size so no datagram is ever truncated
/// regardless of the striping unit negotiated for a given DSS.
pub fn recv_buffer_size() -> usize {
    MAX_STRIPING_UNIT.div_ceil(3) * 4 + ENVELOPE_OVERHEAD
}

/// Round-trip timeout for a request awaiting a single reply.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll timeout used by background receive loops so shutdown is bounded.
pub const LOOP_POLL_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wire codec error: {0}")]
    Wire(#[from] WireError),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("peer sent a response that could not be parsed")]
    Garbled,
}

/// Bind an ephemeral UDP socket sized to carry the largest allowed block.
pub async fn bind_ephemeral() -> std::io::Result<UdpSocket> {
    UdpSocket::bind(("0.0.0.0", 0)).await
}

/// Send `req` to `target` on a fresh ephemeral socket and wait up to
/// `request_timeout` for a single reply. This mirrors the source's
/// per-call `socket.socket(...); sendto(...); recvfrom(...)` pattern: one
/// socket per outbound request, never a shared one.
pub async fn request(
    target: SocketAddr,
    req: &Request,
    request_timeout: Duration,
) -> Result<Response, TransportError> {
    let socket = bind_ephemeral().await?;
    let encoded = req.encode()?;
    socket.send_to(encoded.as_bytes(), target).await?;

    let mut buf = vec![0u8; recv_buffer_size()];
    let (len, _from) = timeout(request_timeout, socket.recv_from(&mut buf))
        .await
        .map_err(|_| TransportError::Timeout(request_timeout))??;

    let text = std::str::from_utf8(&buf[..len]).map_err(|_| TransportError::Garbled)?;
    Response::parse(text).ok_or(TransportError::Garbled)
}

/// Send a reply to `addr` on `socket`. Used by server-side handlers that
/// reply on the socket they received the request on.
pub async fn reply(socket: &UdpSocket, addr: SocketAddr, resp: &Response) -> Result<(), TransportError> {
    let encoded = resp.encode()?;
    socket.send_to(encoded.as_bytes(), addr).await?;
    Ok(())
}

/// Receive and parse one request from `socket`, applying the loop poll
/// timeout so callers can check a shutdown flag between datagrams.
/// Returns `Ok(None)` on a poll timeout (no datagram arrived) and
/// `Ok(Some(None))` when a datagram arrived but failed to parse.
pub async fn recv_request(
    socket: &UdpSocket,
    buf: &mut [u8],
) -> Result<Option<(Option<Request>, SocketAddr)>, std::io::Error> {
    match timeout(LOOP_POLL_TIMEOUT, socket.recv_from(buf)).await {
        Ok(Ok((len, from))) => {
            let parsed = std::str::from_utf8(&buf[..len]).ok().and_then(Request::parse);
            Ok(Some((parsed, from)))
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Ok(None),
    }
}
