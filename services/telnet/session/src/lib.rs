//! TCP sockets, SOCKS4 handshake, read loop, throttled sends and teardown for telnet-agent.
//!
//! This crate provides the single-connection session used by the telnet
//! agent: it dials the remote host directly or through a SOCKS4 proxy, reads
//! newline-delimited text in the background, and writes caller lines through
//! a gate that enforces a minimum spacing between sends.
//!
//! ## Features
//!
//! - **TCP Transport**: Dialer with connect timeout and IPv4 resolution
//! - **SOCKS4 Handshake**: CONNECT request/reply over the proxy socket
//! - **Read Loop**: Background task emitting one event per received line
//! - **Send Throttle**: Single-slot gate held for the configured interval
//! - **Teardown**: One idempotent shutdown path, `ConnectionClosed` exactly once
//!
//! Full telnet option negotiation is not performed; the connection carries raw
//! lines. Sessions are single-use.
//!
//! ## Example
//!
//! ```rust,no_run
//! use telnet_session::{Session, SessionConfig, SessionEvent};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = SessionConfig {
//!     send_interval: Duration::from_secs(3),
//!     ..SessionConfig::default()
//! };
//!
//! let token = CancellationToken::new();
//! let (session, mut events) = Session::with_channel("192.168.1.20", 23, config, &token);
//!
//! session.connect().await?;
//! session.send("adminUser").await?;
//! session.send("adminPassword").await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SessionEvent::MessageReceived { line } => println!("{}", line),
//!         SessionEvent::ConnectionClosed => break,
//!     }
//! }
//!
//! session.disconnect().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod events;
pub mod handshake;
pub mod session;
pub mod state;
pub mod transport;

// Re-export main types
pub use error::SessionError;
pub use events::{ChannelObserver, SessionEvent, SessionObserver};
pub use handshake::socks4_connect;
pub use session::{SendOutcome, Session, SessionConfig, SessionStats};
pub use state::SessionState;
pub use transport::{connect_tcp, listen_tcp, resolve_ipv4};
pub use tokio_util::sync::CancellationToken;
