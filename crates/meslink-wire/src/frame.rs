//! Frame delimiting for the controller byte stream.
//!
//! Two framings are deployed in the field, with no negotiation:
//!
//! - **Length-prefixed**: `[8 ASCII decimal digits][payload]`. The header
//!   is the zero-padded payload length; no terminator.
//! - **Terminator-delimited**: `[payload][0x0D 0x0A]`. The terminator is
//!   the exact two-byte sequence; a lone `\n` is payload data. Empty lines
//!   are skipped; a payload must start with `{`.
//!
//! [`FrameCodec`] implements both behind `tokio_util`'s
//! [`Decoder`]/[`Encoder`], so the connection loop is identical either
//! way. Decoding tolerates arbitrary partial reads and never consumes
//! bytes beyond one frame; every decode error is transport-fatal and the
//! caller is expected to drop the connection.

use std::fmt;
use std::str::FromStr;

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Hard cap on a single frame's payload, inclusive.
pub const MAX_FRAME_BYTES: usize = 10 * 1024 * 1024;

/// Width of the length-prefixed header in bytes.
const HEADER_DIGITS: usize = 8;

/// Largest payload encodable with an 8-digit header.
const MAX_ENCODABLE: usize = 99_999_999;

/// Errors produced by [`FrameCodec`]. All of them are fatal to the
/// connection; there is no in-band resynchronization.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Underlying stream error, including EOF mid-frame.
    #[error("stream error: {0}")]
    Io(#[from] std::io::Error),

    /// Length header is not 8 ASCII decimal digits.
    #[error("invalid length header {header:?}")]
    BadLengthHeader {
        /// The offending header bytes, lossily decoded.
        header: String,
    },

    /// Length header declared an empty payload.
    #[error("length header declares a zero-length frame")]
    ZeroLength,

    /// Frame exceeds [`MAX_FRAME_BYTES`].
    #[error("frame of {len} bytes exceeds the {MAX_FRAME_BYTES}-byte cap")]
    Oversized {
        /// Declared or accumulated size.
        len: usize,
    },

    /// Terminator-framed payload does not begin with `{`.
    #[error("frame does not start with '{{' (got 0x{byte:02x})")]
    InvalidStart {
        /// First payload byte.
        byte: u8,
    },

    /// Payload too large to encode an 8-digit length header for.
    #[error("payload of {len} bytes does not fit an 8-digit length header")]
    PayloadTooLarge {
        /// Payload size.
        len: usize,
    },
}

/// Which framing convention a deployment speaks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameFormat {
    /// 8-digit ASCII length header followed by the payload.
    LengthPrefixed,
    /// Payload terminated by the exact sequence `0x0D 0x0A`.
    #[default]
    CrlfDelimited,
}

impl FromStr for FrameFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "length-prefixed" => Ok(Self::LengthPrefixed),
            "crlf" => Ok(Self::CrlfDelimited),
            other => Err(format!(
                "unknown frame format {other:?} (expected \"length-prefixed\" or \"crlf\")"
            )),
        }
    }
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthPrefixed => f.write_str("length-prefixed"),
            Self::CrlfDelimited => f.write_str("crlf"),
        }
    }
}

/// Stateless-per-frame codec over either framing convention.
///
/// The only state carried across `decode` calls is the CRLF scan cursor,
/// which avoids rescanning the accumulated buffer on every partial read.
#[derive(Debug, Default)]
pub struct FrameCodec {
    format: FrameFormat,
    /// CRLF variant: how far the buffer has already been scanned for a
    /// terminator.
    scanned: usize,
}

impl FrameCodec {
    /// Create a codec for the configured framing convention.
    pub fn new(format: FrameFormat) -> Self {
        Self { format, scanned: 0 }
    }

    fn decode_length_prefixed(src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        if src.len() < HEADER_DIGITS {
            return Ok(None);
        }
        let header = &src[..HEADER_DIGITS];
        if !header.iter().all(u8::is_ascii_digit) {
            // Leave the buffer untouched: the bytes after the bad header
            // are not ours to consume.
            return Err(FrameError::BadLengthHeader {
                header: String::from_utf8_lossy(header).into_owned(),
            });
        }
        // All-digit 8-byte string always parses into usize.
        let len: usize = std::str::from_utf8(header)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        if len == 0 {
            return Err(FrameError::ZeroLength);
        }
        if len > MAX_FRAME_BYTES {
            return Err(FrameError::Oversized { len });
        }
        if src.len() < HEADER_DIGITS + len {
            src.reserve(HEADER_DIGITS + len - src.len());
            return Ok(None);
        }
        src.advance(HEADER_DIGITS);
        Ok(Some(src.split_to(len).freeze()))
    }

    fn decode_crlf(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        loop {
            // Resume one byte early so a terminator split across reads
            // (`\r` | `\n`) is still found.
            let from = self.scanned.saturating_sub(1);
            let found = src[from..]
                .windows(2)
                .position(|w| w == b"\r\n")
                .map(|p| from + p);

            let Some(at) = found else {
                if src.len() > MAX_FRAME_BYTES {
                    return Err(FrameError::Oversized { len: src.len() });
                }
                self.scanned = src.len();
                return Ok(None);
            };

            let line = src.split_to(at).freeze();
            src.advance(2);
            self.scanned = 0;

            // Keep-alive blank lines are not frames.
            if line.is_empty() {
                continue;
            }
            if line.len() > MAX_FRAME_BYTES {
                return Err(FrameError::Oversized { len: line.len() });
            }
            if line[0] != b'{' {
                return Err(FrameError::InvalidStart { byte: line[0] });
            }
            return Ok(Some(line));
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        match self.format {
            FrameFormat::LengthPrefixed => Self::decode_length_prefixed(src),
            FrameFormat::CrlfDelimited => self.decode_crlf(src),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<(), FrameError> {
        match self.format {
            FrameFormat::LengthPrefixed => {
                if payload.len() > MAX_ENCODABLE {
                    return Err(FrameError::PayloadTooLarge { len: payload.len() });
                }
                dst.reserve(HEADER_DIGITS + payload.len());
                dst.extend_from_slice(format!("{:08}", payload.len()).as_bytes());
                dst.extend_from_slice(&payload);
            }
            FrameFormat::CrlfDelimited => {
                dst.reserve(payload.len() + 2);
                dst.extend_from_slice(&payload);
                dst.extend_from_slice(b"\r\n");
            }
        }
        Ok(())
    }
}
