//! Wire format encoding and decoding.
//!
//! Implements the 10-byte header format:
//! ```text
//! ┌───────────┬──────┬───────┬──────────┐
//! │ Stream ID │ Kind │ Flags │ Length   │
//! │ 4 bytes   │ 1 B  │ 1 B   │ 4 bytes  │
//! │ uint32 BE │      │       │ uint32 BE│
//! └───────────┴──────┴───────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use crate::error::{Result, TransportError};

/// Header size in bytes (fixed, exactly 10).
pub const HEADER_SIZE: usize = 10;

/// Maximum serialized header width. The fixed layout never exceeds it.
pub const MAX_HEADER_SIZE: usize = HEADER_SIZE;

/// Default maximum bytes moved in one physical payload read/write.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 4096;

/// Default maximum declared payload length accepted from a peer.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 4 * 1024 * 1024;

/// Flag constants for the header flags byte.
pub mod flags {
    /// End-of-stream: final frame of this logical stream.
    pub const END: u8 = 0b0000_0001;

    /// Reserved bits mask (bits 1-7, must be zero).
    pub const RESERVED_MASK: u8 = 0b1111_1110;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Payload kind marker distinguishing how the receiver materializes bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadKind {
    /// Payload is delivered chunk-by-chunk into a scratch buffer (or a
    /// subscriber-supplied sink as chunks arrive).
    Buffered = 0x01,
    /// Payload is accumulated to its full declared length and handed to the
    /// subscriber's sink as one complete buffer.
    Streamed = 0x02,
}

impl PayloadKind {
    /// Parse a kind marker byte. Returns `None` for unknown markers.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Buffered),
            0x02 => Some(Self::Streamed),
            _ => None,
        }
    }

    /// The wire marker byte.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Logical stream this frame belongs to (fresh per exchange).
    pub stream_id: u32,
    /// How the payload is materialized on receive.
    pub kind: PayloadKind,
    /// Final frame of the logical stream.
    pub end: bool,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(stream_id: u32, kind: PayloadKind, end: bool, payload_length: u32) -> Self {
        Self {
            stream_id,
            kind,
            end,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// Returns the number of bytes written (always `HEADER_SIZE`).
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (10 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) -> usize {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.stream_id.to_be_bytes());
        buf[4] = self.kind.as_u8();
        buf[5] = if self.end { flags::END } else { 0 };
        buf[6..10].copy_from_slice(&self.payload_length.to_be_bytes());
        HEADER_SIZE
    }

    /// Decode a header from bytes (Big Endian).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::MalformedHeader`] if the region is shorter
    /// than `HEADER_SIZE`, the kind marker is unknown, or reserved flag bits
    /// are set.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(TransportError::MalformedHeader(format!(
                "need {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }

        let kind = PayloadKind::from_u8(buf[4]).ok_or_else(|| {
            TransportError::MalformedHeader(format!("unknown payload kind marker 0x{:02x}", buf[4]))
        })?;

        let flag_bits = buf[5];
        if flag_bits & flags::RESERVED_MASK != 0 {
            return Err(TransportError::MalformedHeader(format!(
                "reserved flag bits set: 0x{flag_bits:02x}"
            )));
        }

        Ok(Self {
            stream_id: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            kind,
            end: flags::has_flag(flag_bits, flags::END),
            payload_length: u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]),
        })
    }
}
