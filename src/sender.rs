//! Outbound payload pipeline.
//!
//! [`PayloadSender`] owns the write half of a connection behind a strictly
//! ordered [`SendQueue`]: callers post [`SendPacket`]s without blocking, and
//! a dedicated writer drains them one frame at a time. Payloads larger than
//! the configured chunk size are written in multiple physical chunks under a
//! single header.
//!
//! A write failure (including a zero-byte write) triggers the sender's
//! disconnect exactly once; the failing packet is dropped and the notice
//! channel returned by [`PayloadSender::new`] fires.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::{Result, TransportError};
use crate::protocol::{Header, PayloadSource, SendPacket, SentCallback, DEFAULT_MAX_CHUNK_SIZE};
use crate::send_queue::{QueueAction, SendQueue, DEFAULT_STOP_TIMEOUT};
use crate::transport::{DisconnectCoordinator, DisconnectNotice};

/// Ordered, non-blocking frame sender over one connection write half.
pub struct PayloadSender {
    max_chunk: usize,
    coordinator: Arc<DisconnectCoordinator>,
    queue: Mutex<Option<SendQueue<SendPacket>>>,
}

impl PayloadSender {
    /// Create an unconnected sender and the channel that reports its
    /// disconnect (at most one notice per sender lifetime).
    pub fn new(max_chunk: usize) -> (Self, mpsc::UnboundedReceiver<DisconnectNotice>) {
        let (coordinator, notice_rx) = DisconnectCoordinator::new();
        (
            Self {
                max_chunk,
                coordinator,
                queue: Mutex::new(None),
            },
            notice_rx,
        )
    }

    /// Create a sender with [`DEFAULT_MAX_CHUNK_SIZE`].
    pub fn with_default_chunk_size() -> (Self, mpsc::UnboundedReceiver<DisconnectNotice>) {
        Self::new(DEFAULT_MAX_CHUNK_SIZE)
    }

    /// Whether the sender currently holds a live connection.
    pub fn is_connected(&self) -> bool {
        self.coordinator.is_connected()
    }

    /// Bind the write half and start the writer task.
    ///
    /// # Errors
    ///
    /// [`TransportError::AlreadyConnected`] if this sender ever held a
    /// connection before; senders are single-use.
    pub fn connect<W>(&self, write_half: W) -> Result<()>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.coordinator.mark_connected()?;
        let writer = FrameWriter {
            writer: write_half,
            max_chunk: self.max_chunk,
            chunk: vec![0u8; self.max_chunk],
            coordinator: self.coordinator.clone(),
        };
        *self.queue.lock().expect("sender queue lock") = Some(SendQueue::spawn(writer));
        Ok(())
    }

    /// Queue a payload for transmission. Returns as soon as the packet is
    /// queued; pass a sent-callback to observe completion.
    ///
    /// With `length_known = false` the writer look-ahead reads one chunk
    /// from `source` to fill in the header's length before writing.
    pub fn send_payload(
        &self,
        header: Header,
        source: PayloadSource,
        length_known: bool,
        sent: Option<SentCallback>,
    ) -> Result<()> {
        self.post(SendPacket {
            header,
            source,
            length_known,
            sent,
        })
    }

    /// Enqueue a packet for transmission. Returns as soon as the packet is
    /// queued; attach a sent-callback to observe completion.
    ///
    /// # Errors
    ///
    /// Fails if the sender is not connected or its queue has stopped.
    pub fn post(&self, packet: SendPacket) -> Result<()> {
        if !self.coordinator.is_connected() {
            return Err(TransportError::disconnected("sender is not connected"));
        }
        let queue = self.queue.lock().expect("sender queue lock");
        match queue.as_ref() {
            Some(queue) => queue.post(packet),
            None => Err(TransportError::disconnected("sender is not connected")),
        }
    }

    /// Disconnect the sender and join the writer task (bounded wait).
    /// Safe to call any number of times; the notice fires at most once.
    pub async fn disconnect(&self, reason: Option<String>) {
        self.coordinator.disconnect(reason);
        let queue = self.queue.lock().expect("sender queue lock").take();
        if let Some(queue) = queue {
            queue.stop(DEFAULT_STOP_TIMEOUT).await;
        }
    }
}

/// Queue action owning the write half. One call writes one complete frame.
struct FrameWriter<W> {
    writer: W,
    max_chunk: usize,
    chunk: Vec<u8>,
    coordinator: Arc<DisconnectCoordinator>,
}

#[async_trait::async_trait]
impl<W: AsyncWrite + Send + Unpin> QueueAction<SendPacket> for FrameWriter<W> {
    async fn process(&mut self, packet: SendPacket) -> Result<()> {
        if let Err(e) = self.write_frame(packet).await {
            // First failure tears the connection down; the coordinator makes
            // repeat calls no-ops. No join here, we are inside the worker.
            self.coordinator.disconnect(Some(e.to_string()));
            return Err(e);
        }
        Ok(())
    }
}

impl<W: AsyncWrite + Send + Unpin> FrameWriter<W> {
    async fn write_frame(&mut self, packet: SendPacket) -> Result<()> {
        let SendPacket {
            mut header,
            source,
            length_known,
            sent,
        } = packet;

        match source {
            PayloadSource::Buffer(bytes) => {
                if !length_known {
                    header.payload_length = bytes.len() as u32;
                    header.end = bytes.is_empty();
                }
                self.writer.write_all(&header.encode()).await?;
                let mut offset = 0;
                while offset < bytes.len() {
                    let limit = (offset + self.max_chunk).min(bytes.len());
                    self.writer.write_all(&bytes[offset..limit]).await?;
                    offset = limit;
                }
            }
            PayloadSource::Reader(mut reader) => {
                if length_known {
                    self.writer.write_all(&header.encode()).await?;
                    self.copy_exact(&mut reader, header.payload_length as usize)
                        .await?;
                } else {
                    // Look ahead one chunk so the header can carry a real
                    // length. Zero bytes read means the stream is over and
                    // the frame becomes the end marker.
                    let n = reader.read(&mut self.chunk).await?;
                    header.payload_length = n as u32;
                    header.end = n == 0;
                    self.writer.write_all(&header.encode()).await?;
                    if n > 0 {
                        self.writer.write_all(&self.chunk[..n]).await?;
                    }
                }
            }
        }

        self.writer.flush().await?;

        if let Some(sent) = sent {
            // Fire-and-forget: callbacks never block the write path.
            tokio::spawn(async move { sent(header) });
        }
        Ok(())
    }

    async fn copy_exact(
        &mut self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        mut remaining: usize,
    ) -> Result<()> {
        while remaining > 0 {
            let want = remaining.min(self.max_chunk);
            let n = reader.read(&mut self.chunk[..want]).await?;
            if n == 0 {
                return Err(TransportError::disconnected(
                    "payload source ended before declared length",
                ));
            }
            self.writer.write_all(&self.chunk[..n]).await?;
            remaining -= n;
        }
        Ok(())
    }
}
