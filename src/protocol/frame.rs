//! Frame and send-packet types.
//!
//! Inbound frames carry a two-variant body selected by the header's payload
//! kind: either the receiver's scratch buffer, or a marker that the bytes
//! were already piped into a subscriber-supplied sink. A frame is never both.
//!
//! Outbound traffic is described by [`SendPacket`]: a header plus a payload
//! source, queued through the send pipeline.

use bytes::Bytes;
use tokio::io::AsyncRead;

use super::wire_format::Header;

/// Inbound payload delivery, selected by the header's payload kind and the
/// subscriber's sink decision.
#[derive(Debug)]
pub enum FrameBody {
    /// Payload accumulated in the receiver's scratch buffer.
    Buffered(Bytes),
    /// Payload already delivered into the sink the subscriber provided.
    Piped,
}

impl FrameBody {
    /// The buffered bytes, if the payload was not piped to a sink.
    pub fn as_buffered(&self) -> Option<&Bytes> {
        match self {
            Self::Buffered(bytes) => Some(bytes),
            Self::Piped => None,
        }
    }
}

/// Source of outbound payload bytes.
pub enum PayloadSource {
    /// Fully materialized payload.
    Buffer(Bytes),
    /// Payload read incrementally from an async source. Used when the
    /// producer does not have the bytes up front.
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl std::fmt::Debug for PayloadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffer(bytes) => f.debug_tuple("Buffer").field(&bytes.len()).finish(),
            Self::Reader(_) => f.debug_tuple("Reader").finish(),
        }
    }
}

/// Callback invoked (fire-and-forget) after a packet is fully written.
pub type SentCallback = Box<dyn FnOnce(Header) + Send + 'static>;

/// One outbound send request, queued through the FIFO send pipeline.
pub struct SendPacket {
    /// Frame header. `payload_length`/`end` are rewritten by the writer when
    /// the length is not known up front.
    pub header: Header,
    /// Where the payload bytes come from.
    pub source: PayloadSource,
    /// Whether `header.payload_length` already reflects the payload size.
    pub length_known: bool,
    /// Invoked off the write path once the frame is on the wire.
    pub sent: Option<SentCallback>,
}

impl SendPacket {
    /// Packet for a fully materialized payload.
    pub fn buffered(header: Header, payload: Bytes) -> Self {
        Self {
            header,
            source: PayloadSource::Buffer(payload),
            length_known: true,
            sent: None,
        }
    }

    /// Attach a sent-callback.
    pub fn with_sent_callback(mut self, callback: SentCallback) -> Self {
        self.sent = Some(callback);
        self
    }
}
