//! Basic usage example for the telnet-agent wire pieces.

use bytes::BytesMut;
use std::net::{Ipv4Addr, SocketAddrV4};
use telnet_wire::{parse_reply, LineCodec, LineEnding, Socks4Request, DEFAULT_MAX_LINE_LENGTH};
use tokio_util::codec::{Decoder, Encoder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Telnet Wire Example ===\n");

    // 1. Encode outbound lines
    println!("1. Encoding outbound lines...");
    let mut codec = LineCodec::with_options(DEFAULT_MAX_LINE_LENGTH, LineEnding::CrLf);
    let mut out = BytesMut::new();
    codec.encode("adminUser", &mut out)?;
    codec.encode("show version\n", &mut out)?;
    println!("   Encoded bytes: {:?}", out);

    // 2. Decode mixed terminators
    println!("\n2. Decoding inbound text...");
    let mut inbound = BytesMut::from(&b"login: \r\nPassword:\nrouter-01>\rtail"[..]);
    while let Some(line) = codec.decode(&mut inbound)? {
        println!("   Line: {:?}", line);
    }
    if let Some(tail) = codec.decode_eof(&mut inbound)? {
        println!("   Unterminated tail: {:?}", tail);
    }

    // 3. SOCKS4 CONNECT request
    println!("\n3. Building a SOCKS4 CONNECT request...");
    let target = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 20), 23);
    let request = Socks4Request::connect(target, "ops").encode()?;
    println!("   Request ({} bytes): {:02X?}", request.len(), request.as_ref());

    // 4. Interpret replies
    println!("\n4. Parsing SOCKS4 replies...");
    for code in [0x5A, 0x5B, 0x5C, 0x5D] {
        let status = parse_reply(&[0x00, code, 0, 0, 0, 0, 0, 0])?;
        println!("   0x{:02X}: granted={} ({})", code, status.is_granted(), status);
    }

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
