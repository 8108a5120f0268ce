//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Inbound line grew past the configured limit without a terminator
    #[error("line exceeds maximum length of {0} bytes")]
    LineTooLong(usize),

    /// SOCKS4 user id contains a NUL byte, which would end the field early
    #[error("socks4 user id contains a nul byte")]
    UserId,

    /// SOCKS4 reply shorter than the fixed 8 bytes
    #[error("socks4 reply truncated: {0} bytes")]
    Truncated(usize),

    /// Underlying stream error while framing
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
