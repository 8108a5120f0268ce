//! TCP transport for telnet sessions.
//!
//! Dialing with a timeout, IPv4 resolution for SOCKS4 targets, and a listener
//! helper used by stubs and tests.

use crate::error::SessionError;
use std::io;
use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tracing::{debug, trace};

/// Create a TCP listener bound to the given address
pub async fn listen_tcp(addr: SocketAddr) -> tokio::io::Result<TcpListener> {
    TcpListener::bind(addr).await
}

/// Connect to `host:port`, giving up after `timeout`
pub async fn connect_tcp(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<TcpStream, SessionError> {
    let addr = format!("{}:{}", host, port);
    debug!("Dialing {}", addr);

    let stream = match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(SessionError::Connection { addr, source }),
        Err(_) => {
            return Err(SessionError::Connection {
                addr,
                source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
            })
        }
    };

    // Lines are small and interactive
    if let Err(e) = stream.set_nodelay(true) {
        trace!("Failed to set TCP_NODELAY on {}: {}", addr, e);
    }

    Ok(stream)
}

/// Resolve `host` to its first IPv4 address
pub async fn resolve_ipv4(host: &str, port: u16) -> Result<SocketAddrV4, SessionError> {
    let addrs = lookup_host((host, port))
        .await
        .map_err(|e| SessionError::Resolution {
            host: host.to_string(),
            source: Some(e),
        })?;

    addrs
        .into_iter()
        .find_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(v4),
            SocketAddr::V6(_) => None,
        })
        .ok_or_else(|| SessionError::Resolution {
            host: host.to_string(),
            source: None,
        })
}
