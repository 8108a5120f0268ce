//! SOCKS4 CONNECT handshake.
//!
//! Runs on the freshly dialed proxy socket before any line traffic. Once the
//! proxy grants the request the same socket carries the proxied connection.

use crate::error::SessionError;
use std::net::SocketAddrV4;
use telnet_wire::{parse_reply, Socks4Request, SOCKS4_REPLY_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Ask the proxy on `stream` to connect to `target`
pub async fn socks4_connect<S>(
    stream: &mut S,
    target: SocketAddrV4,
    user_id: &str,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = Socks4Request::connect(target, user_id).encode()?;

    stream
        .write_all(&request)
        .await
        .map_err(SessionError::Handshake)?;
    stream.flush().await.map_err(SessionError::Handshake)?;
    debug!("Sent SOCKS4 CONNECT for {} ({} bytes)", target, request.len());

    let mut reply = [0u8; SOCKS4_REPLY_SIZE];
    stream
        .read_exact(&mut reply)
        .await
        .map_err(SessionError::Handshake)?;

    let status = parse_reply(&reply)?;
    if !status.is_granted() {
        warn!("SOCKS4 proxy refused {}: {}", target, status);
        return Err(SessionError::Proxy(status));
    }

    debug!("SOCKS4 proxy granted connection to {}", target);
    Ok(())
}
