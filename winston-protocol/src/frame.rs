//! Length-prefixed response framing: `<token> <value>\n<payload>`.
//!
//! `value` is a byte count for binary bodies, a line count for menu-style
//! bodies, and the bare version number for `VERSION`.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{Result, WinstonError};

/// Longest header line accepted before the newline is seen.
pub const MAX_HEADER_LEN: usize = 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Echoed request id.
    pub token: String,
    pub value: usize,
}

impl FrameHeader {
    pub fn new(token: &str, value: usize) -> Self {
        Self {
            token: token.to_owned(),
            value,
        }
    }

    /// Parse a header line (without its newline).
    pub fn parse(line: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(line)
            .map_err(|_| WinstonError::MalformedResponse("header is not valid UTF-8".into()))?;
        let text = text.trim_end_matches('\r');
        let mut parts = text.split_whitespace();
        let (Some(token), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(WinstonError::MalformedResponse(format!(
                "expected '<id> <length>', got {text:?}"
            )));
        };
        let value = value.parse::<usize>().map_err(|_| {
            WinstonError::MalformedResponse(format!("invalid length in header: {value:?}"))
        })?;
        Ok(Self::new(token, value))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\n", self.token, self.value).into_bytes()
    }
}

/// Binary frame: header declaring `payload.len()` bytes, then the payload.
pub fn encode_frame(id: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = FrameHeader::new(id, payload.len()).to_bytes();
    out.extend_from_slice(payload);
    out
}

/// Line frame: header declaring the line count, then each line newline-terminated.
pub fn encode_lines(id: &str, lines: &[String]) -> Vec<u8> {
    let mut out = FrameHeader::new(id, lines.len()).to_bytes();
    for line in lines {
        out.extend_from_slice(line.as_bytes());
        out.push(b'\n');
    }
    out
}

/// Header-only frame, e.g. `VERSION`.
pub fn encode_header_only(id: &str, value: usize) -> Vec<u8> {
    FrameHeader::new(id, value).to_bytes()
}

/// Empty terminal frame: `<id> 0\n`.
pub fn empty_frame(id: &str) -> Vec<u8> {
    encode_header_only(id, 0)
}

/// Gzip-compress a payload.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| WinstonError::Codec(format!("gzip: {e}")))?;
    encoder
        .finish()
        .map_err(|e| WinstonError::Codec(format!("gzip: {e}")))
}

/// Gunzip a payload, failing once the output would exceed `limit` bytes.
pub fn decompress(data: &[u8], limit: usize) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = decoder
            .read(&mut buf)
            .map_err(|e| WinstonError::Codec(format!("gunzip: {e}")))?;
        if n == 0 {
            break;
        }
        if out.len() + n > limit {
            return Err(WinstonError::Codec(format!(
                "decompressed payload exceeds {limit} bytes"
            )));
        }
        out.extend_from_slice(&buf[..n]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_header() {
        assert_eq!(
            FrameHeader::parse(b"42 1024").unwrap(),
            FrameHeader::new("42", 1024)
        );
        assert_eq!(
            FrameHeader::parse(b"GS 3\r").unwrap(),
            FrameHeader::new("GS", 3)
        );
    }

    #[test]
    fn parse_header_errors() {
        assert!(FrameHeader::parse(b"42").is_err());
        assert!(FrameHeader::parse(b"42 abc").is_err());
        assert!(FrameHeader::parse(b"42 -1").is_err());
        assert!(FrameHeader::parse(b"42 10 extra").is_err());
        assert!(FrameHeader::parse(&[0xff, b' ', b'1']).is_err());
    }

    #[test]
    fn frame_declares_payload_length() {
        let frame = encode_frame("7", b"abcdef");
        assert_eq!(frame, b"7 6\nabcdef");
    }

    #[test]
    fn lines_declare_line_count() {
        let frame = encode_lines("7", &["a b".to_owned(), "c".to_owned()]);
        assert_eq!(frame, b"7 2\na b\nc\n");
    }

    #[test]
    fn empty_and_header_only() {
        assert_eq!(empty_frame("x"), b"x 0\n");
        assert_eq!(encode_header_only("1", 3), b"1 3\n");
    }

    #[test]
    fn gzip_roundtrip() {
        let data: Vec<u8> = (0..10_000u32)
            .flat_map(|i| (i % 17).to_be_bytes())
            .collect();
        let packed = compress(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(decompress(&packed, data.len()).unwrap(), data);
    }

    #[test]
    fn decompress_limit() {
        let packed = compress(&[0u8; 4096]).unwrap();
        assert!(matches!(
            decompress(&packed, 100),
            Err(WinstonError::Codec(_))
        ));
    }

    #[test]
    fn decompress_garbage() {
        assert!(matches!(
            decompress(b"not gzip at all", 1024),
            Err(WinstonError::Codec(_))
        ));
    }
}
