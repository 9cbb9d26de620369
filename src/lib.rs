//! skillwire - duplex, binary-framed transport for conversational skill
//! forwarding.
//!
//! One connection carries traffic both ways: the host posts an activity to
//! the remote skill as an HTTP-like request, and while that exchange is in
//! flight the skill sends its own requests back over the same socket. Both
//! directions are framed with a fixed 10-byte header and multiplexed by
//! stream id.
//!
//! # Architecture
//!
//! ```text
//! SkillTransport (facade)
//!     │  dial + auth headers, one connection per forward
//!     ▼
//! SkillConnection ──► RequestRouter ──► activity routes ──► TurnContext
//!     │
//!     ├── PayloadSender ──► SendQueue ──► write half
//!     └── PayloadReceiver ◄── frame loop ◄── read half
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use skillwire::{RequestRouter, SkillConnection, StreamingRequest};
//!
//! #[tokio::main]
//! async fn main() -> skillwire::Result<()> {
//!     let (stream, _peer) = tokio::io::duplex(64 * 1024);
//!     let connection = SkillConnection::connect(stream, Arc::new(RequestRouter::new()))?;
//!
//!     let response = connection
//!         .request(StreamingRequest::post("/activities/1", Vec::new()))
//!         .await?;
//!     println!("status {}", response.status);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod receiver;
pub mod router;
pub mod send_queue;
pub mod sender;
pub mod skill;
pub mod transport;

pub use codec::MsgPackCodec;
pub use connection::SkillConnection;
pub use error::{Result, TransportError};
pub use protocol::{
    status, Envelope, FrameBody, Header, PayloadKind, PayloadSource, SendPacket, SentCallback,
    StreamingRequest, StreamingResponse, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MAX_PAYLOAD_SIZE,
    HEADER_SIZE,
};
pub use receiver::{FrameSubscriber, PayloadReceiver};
pub use router::{RequestRouter, RouteContext, RouteHandler};
pub use send_queue::{QueueAction, QueueState, SendQueue};
pub use sender::PayloadSender;
pub use skill::{
    activity_routes, ensure_websocket_url, ActivityCodec, SkillTransport, TokenProvider,
    TurnContext,
};
pub use transport::{Connector, DisconnectCoordinator, DisconnectNotice, Duplex};
