//! Protocol module - wire format, frame types, and the request/response
//! envelope.
//!
//! - 10-byte header encoding/decoding
//! - Frame body and send-packet types
//! - MsgPack request/response envelope with HTTP-like status codes

mod envelope;
mod frame;
mod wire_format;

pub use envelope::{status, Envelope, StreamingRequest, StreamingResponse};
pub use frame::{FrameBody, PayloadSource, SendPacket, SentCallback};
pub use wire_format::{
    flags, Header, PayloadKind, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE,
    MAX_HEADER_SIZE,
};
