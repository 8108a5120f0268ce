//! Session error types.

use std::io;
use telnet_wire::{Socks4Status, WireError};
use thiserror::Error;

/// Errors surfaced by [`Session`](crate::Session) operations
#[derive(Error, Debug)]
pub enum SessionError {
    /// `connect` was called on a session that already connected once
    #[error("connect aborted: reconnecting is not supported, create a new session")]
    Reuse,

    /// `send` was called before the session finished connecting
    #[error("session is not connected")]
    NotConnected,

    /// TCP connection to the target or the proxy could not be established
    #[error("failed to connect to {addr}: {source}")]
    Connection {
        /// Address that was dialed
        addr: String,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// Target host has no IPv4 address to hand to the SOCKS4 proxy
    #[error("no IPv4 address found for {host}")]
    Resolution {
        /// Host that was looked up
        host: String,
        /// Lookup error, if the lookup itself failed
        #[source]
        source: Option<io::Error>,
    },

    /// SOCKS4 proxy answered with a non-granted status
    #[error("socks4 proxy refused: {0}")]
    Proxy(Socks4Status),

    /// I/O failure while exchanging the SOCKS4 request and reply
    #[error("socks4 handshake failed: {0}")]
    Handshake(#[source] io::Error),

    /// Unexpected I/O fault on an established session
    #[error("transport fault: {0}")]
    Transport(#[source] io::Error),

    /// Encoding error from the wire layer
    #[error(transparent)]
    Wire(WireError),

    /// Connect aborted because the session was cancelled or torn down
    #[error("operation cancelled")]
    Cancelled,
}

impl From<WireError> for SessionError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Io(e) => SessionError::Transport(e),
            other => SessionError::Wire(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_io_maps_to_transport() {
        let err: SessionError =
            WireError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "pipe")).into();
        assert!(matches!(err, SessionError::Transport(_)));

        let err: SessionError = WireError::UserId.into();
        assert!(matches!(err, SessionError::Wire(WireError::UserId)));
    }

    #[test]
    fn test_proxy_error_message_names_reason() {
        let err = SessionError::Proxy(Socks4Status::IdentdMismatch);
        assert!(err.to_string().contains("identd could not confirm"));
    }
}
