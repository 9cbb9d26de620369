//! Pluggable connection establishment.
//!
//! The transport never dials sockets itself; a [`Connector`] supplies a
//! fresh bidirectional byte stream per forward. Production code plugs in a
//! WebSocket or named-pipe dialer; tests plug in `tokio::io::duplex` pairs.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// A bidirectional byte stream usable as a transport connection.
pub trait Duplex: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Duplex for T {}

/// Dials a fresh connection to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new byte stream to `url`, attaching the given request headers
    /// (name, value) to the handshake.
    async fn connect(&self, url: &str, headers: &[(String, String)]) -> Result<Box<dyn Duplex>>;
}
