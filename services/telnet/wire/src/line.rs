//! Newline-delimited text framing.
//!
//! Inbound, any of `\n`, `\r\n` or a lone `\r` ends a line. A `\r` sitting at
//! the end of the buffer is held back until the next byte shows whether it
//! starts a `\r\n` pair. Bytes are decoded as UTF-8, lossily. Outbound, one
//! trailing terminator in the caller's text is dropped before the configured
//! ending is appended, so `""` and `"\r\n"` both produce a single empty line.

use crate::WireError;
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

/// Default cap on a single inbound line (64 KiB)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Terminator appended to outbound lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    /// `\r\n`, what most telnet servers expect
    #[default]
    CrLf,
    /// `\n`
    Lf,
}

impl LineEnding {
    /// Terminator bytes
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::CrLf => b"\r\n",
            LineEnding::Lf => b"\n",
        }
    }
}

/// Codec turning a byte stream into lines and lines into terminated bytes
#[derive(Debug, Clone)]
pub struct LineCodec {
    /// Where to resume scanning for a terminator
    next_index: usize,
    max_length: usize,
    line_ending: LineEnding,
}

impl LineCodec {
    /// Codec with the default length cap and `\r\n` endings
    pub fn new() -> Self {
        Self::with_options(DEFAULT_MAX_LINE_LENGTH, LineEnding::default())
    }

    /// Codec with an explicit length cap and outbound ending
    pub fn with_options(max_length: usize, line_ending: LineEnding) -> Self {
        Self {
            next_index: 0,
            max_length,
            line_ending,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop a single trailing `\r\n` or `\n`
pub fn strip_terminator(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = WireError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, WireError> {
        let scan_from = self.next_index.min(buf.len());
        let found = buf[scan_from..]
            .iter()
            .position(|b| *b == b'\n' || *b == b'\r')
            .map(|offset| scan_from + offset);

        let Some(end) = found else {
            if buf.len() > self.max_length {
                return Err(WireError::LineTooLong(self.max_length));
            }
            self.next_index = buf.len();
            return Ok(None);
        };

        if end > self.max_length {
            return Err(WireError::LineTooLong(self.max_length));
        }

        let consumed = match (buf[end], buf.get(end + 1)) {
            (b'\r', Some(b'\n')) => end + 2,
            (b'\r', None) => {
                self.next_index = end;
                return Ok(None);
            }
            _ => end + 1,
        };

        let line = buf.split_to(consumed);
        self.next_index = 0;
        Ok(Some(String::from_utf8_lossy(&line[..end]).into_owned()))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, WireError> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            return Ok(None);
        }

        // Unterminated tail, or a lone \r that never got its \n
        let rest = buf.split_to(buf.len());
        self.next_index = 0;
        let text = rest.strip_suffix(&b"\r"[..]).unwrap_or(&rest[..]);
        Ok(Some(String::from_utf8_lossy(text).into_owned()))
    }
}

impl<T: AsRef<str>> Encoder<T> for LineCodec {
    type Error = WireError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), WireError> {
        let text = strip_terminator(item.as_ref());
        let ending = self.line_ending.as_bytes();
        dst.reserve(text.len() + ending.len());
        dst.put_slice(text.as_bytes());
        dst.put_slice(ending);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut LineCodec, input: &[u8]) -> Vec<String> {
        let mut buf = BytesMut::from(input);
        let mut lines = Vec::new();
        while let Some(line) = codec.decode(&mut buf).unwrap() {
            lines.push(line);
        }
        while let Some(line) = codec.decode_eof(&mut buf).unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_crlf_and_lf_terminators() {
        let mut codec = LineCodec::new();
        let lines = decode_all(&mut codec, b"hello\r\nworld\nlast\r\n");
        assert_eq!(lines, vec!["hello", "world", "last"]);
    }

    #[test]
    fn test_over_eager_eol_yields_empty_lines() {
        let mut codec = LineCodec::new();
        let lines = decode_all(&mut codec, b"login:\n\r\nPassword:\r\n\r\n");
        assert_eq!(lines, vec!["login:", "", "Password:", ""]);
    }

    #[test]
    fn test_lone_cr_is_a_terminator() {
        let mut codec = LineCodec::new();
        let lines = decode_all(&mut codec, b"one\rtwo\r\n");
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn test_trailing_cr_waits_for_next_byte() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"prompt\r"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"\nnext\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("prompt"));
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("next"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_line_across_reads() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"hel"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"lo\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("hello"));
    }

    #[test]
    fn test_unterminated_tail_delivered_at_eof() {
        let mut codec = LineCodec::new();
        let lines = decode_all(&mut codec, b"first\r\n$ ");
        assert_eq!(lines, vec!["first", "$ "]);

        let mut codec = LineCodec::new();
        let lines = decode_all(&mut codec, b"dangling\r");
        assert_eq!(lines, vec!["dangling"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut codec = LineCodec::new();
        let lines = decode_all(&mut codec, b"caf\xff\r\n");
        assert_eq!(lines, vec!["caf\u{FFFD}"]);
    }

    #[test]
    fn test_line_too_long() {
        let mut codec = LineCodec::with_options(8, LineEnding::CrLf);
        let mut buf = BytesMut::from(&b"0123456789"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(WireError::LineTooLong(8))
        ));

        let mut codec = LineCodec::with_options(8, LineEnding::CrLf);
        let mut buf = BytesMut::from(&b"0123456789\n"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(WireError::LineTooLong(8))
        ));
    }

    #[test]
    fn test_encode_appends_configured_ending() {
        let mut buf = BytesMut::new();
        LineCodec::new().encode("ping 1.1.1.1", &mut buf).unwrap();
        assert_eq!(&buf[..], b"ping 1.1.1.1\r\n");

        let mut buf = BytesMut::new();
        LineCodec::with_options(DEFAULT_MAX_LINE_LENGTH, LineEnding::Lf)
            .encode("ls /", &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"ls /\n");
    }

    #[test]
    fn test_encode_empty_and_bare_terminator_as_one_line() {
        let mut codec = LineCodec::new();
        for text in ["", "\r\n", "\n"] {
            let mut buf = BytesMut::new();
            codec.encode(text, &mut buf).unwrap();
            assert_eq!(&buf[..], b"\r\n", "input {:?}", text);
        }
    }

    #[test]
    fn test_strip_terminator_only_once() {
        assert_eq!(strip_terminator("a\r\n\r\n"), "a\r\n");
        assert_eq!(strip_terminator("a\n"), "a");
        assert_eq!(strip_terminator("a\r"), "a\r");
    }

    #[test]
    fn test_line_ending_deserialize() {
        let ending: LineEnding = from_str_value("lf");
        assert_eq!(ending, LineEnding::Lf);
        assert_eq!(LineEnding::default().as_bytes(), b"\r\n");
    }

    fn from_str_value(value: &str) -> LineEnding {
        use serde::de::value::{Error, StrDeserializer};
        use serde::de::IntoDeserializer;
        let de: StrDeserializer<'_, Error> = value.into_deserializer();
        LineEnding::deserialize(de).unwrap()
    }
}
