//! Wire-level pieces for telnet-agent: newline framing and the SOCKS4 handshake.
//!
//! This crate has no I/O of its own. It provides a `tokio_util` codec for the
//! line-oriented application protocol and byte-exact encoding of the SOCKS4
//! CONNECT request and reply.
//!
//! ## Wire Format
//!
//! ```text
//! application:  <text> \r\n | \n | \r          (both directions)
//!
//! +------+------+-----------+-----------+-------------+------+
//! | 0x04 | 0x01 | port BE16 | IPv4 (4B) | user id (N) | 0x00 |   SOCKS4 request
//! +------+------+-----------+-----------+-------------+------+
//! | ---- | code | ignored (6B)                      |           SOCKS4 reply
//! +------+------+-----------------------------------+
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod line;
pub mod socks4;

// Re-export main types
pub use error::WireError;
pub use line::{strip_terminator, LineCodec, LineEnding, DEFAULT_MAX_LINE_LENGTH};
pub use socks4::{
    parse_reply, Socks4Request, Socks4Status, SOCKS4_CMD_CONNECT, SOCKS4_REPLY_SIZE,
    SOCKS4_VERSION,
};
