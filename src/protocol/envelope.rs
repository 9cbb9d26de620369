//! HTTP-like request/response envelope carried in frame payloads.
//!
//! One logical exchange = one outbound `Request` frame and one inbound
//! `Response` frame sharing a stream id. Inbound frames may equally carry
//! requests initiated by the remote side; the [`Envelope`] tag tells the
//! two apart.

use serde::{Deserialize, Serialize};

use crate::codec::MsgPackCodec;
use crate::error::Result;

/// HTTP-like status codes used on the response envelope.
pub mod status {
    /// Success.
    pub const OK: u16 = 200;
    /// No route matched the request's method + path.
    pub const NOT_FOUND: u16 = 404;
    /// A matched handler faulted; detail is serialized into the body.
    pub const INTERNAL_SERVER_ERROR: u16 = 500;
}

/// An outbound or inbound application request: verb, path, body bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingRequest {
    /// HTTP-like method (`POST`, `PUT`, `DELETE`, ...).
    pub method: String,
    /// Request path, e.g. `/activities/123`.
    pub path: String,
    /// Opaque body bytes.
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,
}

impl StreamingRequest {
    /// Build a request with an arbitrary method.
    pub fn new(method: impl Into<String>, path: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            body,
        }
    }

    /// Build a `POST` request.
    pub fn post(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self::new("POST", path, body)
    }

    /// Build a `PUT` request.
    pub fn put(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self::new("PUT", path, body)
    }

    /// Build a `DELETE` request with an empty body.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new("DELETE", path, Vec::new())
    }
}

/// Response to a [`StreamingRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingResponse {
    /// HTTP-like status code (see [`status`]).
    pub status: u16,
    /// Opaque body bytes.
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,
}

impl StreamingResponse {
    /// Success response.
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: status::OK,
            body,
        }
    }

    /// Not-found response with fault detail.
    pub fn not_found(body: Vec<u8>) -> Self {
        Self {
            status: status::NOT_FOUND,
            body,
        }
    }

    /// Server-error response with fault detail.
    pub fn server_error(body: Vec<u8>) -> Self {
        Self {
            status: status::INTERNAL_SERVER_ERROR,
            body,
        }
    }

    /// Whether the status is the success code.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.status == status::OK
    }
}

/// Tagged wire envelope: what kind of exchange a frame payload carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Envelope {
    /// A request initiated by the peer that sent the frame.
    Request(StreamingRequest),
    /// A response completing an exchange the receiver initiated.
    Response(StreamingResponse),
}

impl Envelope {
    /// Encode the envelope to frame payload bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        MsgPackCodec::encode(self)
    }

    /// Decode an envelope from frame payload bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        MsgPackCodec::decode(bytes)
    }
}
