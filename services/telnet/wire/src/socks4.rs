//! SOCKS4 CONNECT request and reply encoding.
//!
//! ```text
//! request:  | 0x04 | 0x01 | port (BE u16) | IPv4 (4B) | user id (N B) | 0x00 |
//! reply:    | ignored | status | ignored (6B) |
//! ```

use crate::WireError;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::net::SocketAddrV4;

/// SOCKS protocol version byte
pub const SOCKS4_VERSION: u8 = 0x04;
/// CONNECT command (BIND is not supported)
pub const SOCKS4_CMD_CONNECT: u8 = 0x01;
/// Fixed size of a SOCKS4 reply
pub const SOCKS4_REPLY_SIZE: usize = 8;

/// Header bytes before the user id: version, command, port and address
const REQUEST_HEADER_SIZE: usize = 8;

/// A SOCKS4 CONNECT request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks4Request<'a> {
    /// Destination the proxy should connect to
    pub target: SocketAddrV4,
    /// Ident user id, may be empty
    pub user_id: &'a str,
}

impl<'a> Socks4Request<'a> {
    /// Create a CONNECT request for `target`
    pub fn connect(target: SocketAddrV4, user_id: &'a str) -> Self {
        Self { target, user_id }
    }

    /// Size of the encoded request (9 + user id length)
    pub fn encoded_len(&self) -> usize {
        REQUEST_HEADER_SIZE + self.user_id.len() + 1
    }

    /// Encode into a single buffer so it can be written in one call
    pub fn encode(&self) -> Result<Bytes, WireError> {
        if self.user_id.as_bytes().contains(&0) {
            return Err(WireError::UserId);
        }

        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(SOCKS4_VERSION);
        buf.put_u8(SOCKS4_CMD_CONNECT);
        buf.put_u16(self.target.port());
        buf.put_slice(&self.target.ip().octets());
        buf.put_slice(self.user_id.as_bytes());
        buf.put_u8(0x00);

        Ok(buf.freeze())
    }
}

/// Status carried in byte 1 of a SOCKS4 reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Socks4Status {
    /// 0x5A request granted
    Granted,
    /// 0x5B request rejected or failed
    Rejected,
    /// 0x5C client identd not reachable from the proxy
    IdentdUnreachable,
    /// 0x5D identd could not confirm the user id
    IdentdMismatch,
    /// Any other status byte
    Unknown(u8),
}

impl Socks4Status {
    /// Whether the proxy accepted the CONNECT
    pub fn is_granted(self) -> bool {
        self == Socks4Status::Granted
    }

    /// Raw status byte
    pub fn code(self) -> u8 {
        match self {
            Socks4Status::Granted => 0x5A,
            Socks4Status::Rejected => 0x5B,
            Socks4Status::IdentdUnreachable => 0x5C,
            Socks4Status::IdentdMismatch => 0x5D,
            Socks4Status::Unknown(code) => code,
        }
    }
}

impl From<u8> for Socks4Status {
    fn from(value: u8) -> Self {
        match value {
            0x5A => Socks4Status::Granted,
            0x5B => Socks4Status::Rejected,
            0x5C => Socks4Status::IdentdUnreachable,
            0x5D => Socks4Status::IdentdMismatch,
            other => Socks4Status::Unknown(other),
        }
    }
}

impl fmt::Display for Socks4Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Socks4Status::Granted => write!(f, "request granted"),
            Socks4Status::Rejected => write!(f, "connect request rejected or failed"),
            Socks4Status::IdentdUnreachable => write!(
                f,
                "connect request failed because client is not running identd (or not reachable from the server)"
            ),
            Socks4Status::IdentdMismatch => write!(
                f,
                "connect request failed because client's identd could not confirm the user id"
            ),
            Socks4Status::Unknown(code) => {
                write!(f, "connect request failed, unknown error (status {:#04x})", code)
            }
        }
    }
}

/// Parse the status out of a SOCKS4 reply. Only byte 1 is meaningful.
pub fn parse_reply(reply: &[u8]) -> Result<Socks4Status, WireError> {
    if reply.len() < SOCKS4_REPLY_SIZE {
        return Err(WireError::Truncated(reply.len()));
    }
    Ok(Socks4Status::from(reply[1]))
}
