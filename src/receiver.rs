//! Inbound payload pipeline.
//!
//! [`PayloadReceiver`] owns the read half of a connection and runs a frame
//! loop: read exactly one header, materialize the payload according to its
//! kind, hand the completed frame to the bound [`FrameSubscriber`]. Partial
//! reads are accumulated; a zero-byte read anywhere is a close and tears the
//! receiver down with a reason naming what was being read.
//!
//! Payload materialization:
//! - `Buffered` frames are moved chunk-by-chunk, either into the sink the
//!   subscriber offers for the frame or into a scratch buffer.
//! - `Streamed` frames are accumulated to their full declared length first,
//!   then delivered to the sink (or the subscriber) in one piece.
//!
//! Every physical payload read is bounded by the configured chunk size, and
//! a header declaring more than the configured maximum payload length is
//! rejected before any allocation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, TransportError};
use crate::protocol::{
    FrameBody, Header, PayloadKind, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE,
};
use crate::transport::{DisconnectCoordinator, DisconnectNotice};

const DISCONNECT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Receives completed inbound frames.
#[async_trait]
pub trait FrameSubscriber: Send + Sync {
    /// Offer a sink for the frame's payload bytes before they are read.
    /// Return `None` to have the receiver buffer the payload instead.
    async fn provide_sink(&self, header: &Header) -> Option<Box<dyn AsyncWrite + Send + Unpin>>;

    /// Deliver one completed frame. `payload_len` is the number of payload
    /// bytes moved, whether piped or buffered.
    async fn consume(&self, header: Header, body: FrameBody, payload_len: usize);
}

/// Frame reader over one connection read half.
pub struct PayloadReceiver {
    max_chunk: usize,
    max_payload: usize,
    coordinator: Arc<DisconnectCoordinator>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl PayloadReceiver {
    /// Create an unconnected receiver and the channel that reports its
    /// disconnect (at most one notice per receiver lifetime). Declared
    /// payload lengths are capped at [`DEFAULT_MAX_PAYLOAD_SIZE`].
    pub fn new(max_chunk: usize) -> (Self, mpsc::UnboundedReceiver<DisconnectNotice>) {
        Self::with_limits(max_chunk, DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a receiver with explicit chunk and payload-length bounds.
    pub fn with_limits(
        max_chunk: usize,
        max_payload: usize,
    ) -> (Self, mpsc::UnboundedReceiver<DisconnectNotice>) {
        let (coordinator, notice_rx) = DisconnectCoordinator::new();
        (
            Self {
                max_chunk,
                max_payload,
                coordinator,
                reader_task: Mutex::new(None),
            },
            notice_rx,
        )
    }

    /// Create a receiver with [`DEFAULT_MAX_CHUNK_SIZE`].
    pub fn with_default_chunk_size() -> (Self, mpsc::UnboundedReceiver<DisconnectNotice>) {
        Self::new(DEFAULT_MAX_CHUNK_SIZE)
    }

    /// Whether the receiver currently holds a live connection.
    pub fn is_connected(&self) -> bool {
        self.coordinator.is_connected()
    }

    /// Bind the read half and start the frame loop, delivering frames to
    /// `subscriber`.
    ///
    /// # Errors
    ///
    /// [`TransportError::AlreadyConnected`] if this receiver ever held a
    /// connection before; receivers are single-use.
    pub fn connect<R>(&self, read_half: R, subscriber: Arc<dyn FrameSubscriber>) -> Result<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.coordinator.mark_connected()?;

        let coordinator = self.coordinator.clone();
        let cancel = self.coordinator.cancellation_token();
        let max_chunk = self.max_chunk;
        let max_payload = self.max_payload;
        let task = tokio::spawn(async move {
            let mut reader = read_half;
            let loop_result = tokio::select! {
                _ = cancel.cancelled() => Ok(()),
                result = frame_loop(&mut reader, subscriber, max_chunk, max_payload) => result,
            };
            if let Err(e) = loop_result {
                coordinator.disconnect(Some(e.to_string()));
            }
        });
        *self.reader_task.lock().expect("receiver task lock") = Some(task);
        Ok(())
    }

    /// Disconnect the receiver and join the frame loop (bounded wait).
    /// Safe to call any number of times; the notice fires at most once.
    pub async fn disconnect(&self, reason: Option<String>) {
        self.coordinator.disconnect(reason);
        let task = self.reader_task.lock().expect("receiver task lock").take();
        if let Some(task) = task {
            if tokio::time::timeout(DISCONNECT_JOIN_TIMEOUT, task).await.is_err() {
                tracing::warn!("receiver frame loop did not exit within {DISCONNECT_JOIN_TIMEOUT:?}");
            }
        }
    }
}

async fn frame_loop<R>(
    reader: &mut R,
    subscriber: Arc<dyn FrameSubscriber>,
    max_chunk: usize,
    max_payload: usize,
) -> Result<()>
where
    R: AsyncRead + Send + Unpin,
{
    let mut header_buf = [0u8; HEADER_SIZE];
    let mut chunk = vec![0u8; max_chunk];

    loop {
        read_header(reader, &mut header_buf).await?;
        let header = Header::decode(&header_buf)?;
        let total = header.payload_length as usize;
        if total > max_payload {
            return Err(TransportError::MalformedHeader(format!(
                "declared payload length {total} exceeds maximum {max_payload}"
            )));
        }

        let sink = subscriber.provide_sink(&header).await;
        match (header.kind, sink) {
            (PayloadKind::Buffered, Some(mut sink)) => {
                let mut remaining = total;
                while remaining > 0 {
                    let n = read_chunk(reader, &mut chunk, remaining).await?;
                    sink.write_all(&chunk[..n]).await?;
                    remaining -= n;
                }
                sink.flush().await?;
                subscriber.consume(header, FrameBody::Piped, total).await;
            }
            (PayloadKind::Buffered, None) => {
                let payload = read_chunked(reader, &mut chunk, total).await?;
                subscriber
                    .consume(header, FrameBody::Buffered(Bytes::from(payload)), total)
                    .await;
            }
            (PayloadKind::Streamed, sink) => {
                // Streamed frames are delivered whole, never chunk-by-chunk,
                // but are still read off the wire in bounded chunks.
                let payload = read_chunked(reader, &mut chunk, total).await?;
                match sink {
                    Some(mut sink) => {
                        sink.write_all(&payload).await?;
                        sink.flush().await?;
                        subscriber.consume(header, FrameBody::Piped, total).await;
                    }
                    None => {
                        subscriber
                            .consume(header, FrameBody::Buffered(Bytes::from(payload)), total)
                            .await;
                    }
                }
            }
        }
    }
}

/// Fill the header buffer completely, accumulating partial reads. A
/// zero-byte read is a remote close.
async fn read_header<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(TransportError::disconnected(
                "connection closed while reading header",
            ));
        }
        filled += n;
    }
    Ok(())
}

/// One bounded payload read: at most `min(remaining, chunk.len())` bytes.
async fn read_chunk<R>(reader: &mut R, chunk: &mut [u8], remaining: usize) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let want = remaining.min(chunk.len());
    let n = reader.read(&mut chunk[..want]).await?;
    if n == 0 {
        return Err(TransportError::disconnected(
            "connection closed while reading payload",
        ));
    }
    Ok(n)
}

/// Accumulate exactly `total` payload bytes through the bounded chunk loop.
async fn read_chunked<R>(reader: &mut R, chunk: &mut [u8], total: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut payload = Vec::with_capacity(total);
    let mut remaining = total;
    while remaining > 0 {
        let n = read_chunk(reader, chunk, remaining).await?;
        payload.extend_from_slice(&chunk[..n]);
        remaining -= n;
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PayloadKind;
    use tokio::sync::Notify;

    struct Recording {
        frames: Mutex<Vec<(Header, Option<Vec<u8>>)>>,
        arrived: Notify,
    }

    impl Recording {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                frames: Mutex::new(Vec::new()),
                arrived: Notify::new(),
            })
        }
    }

    #[async_trait]
    impl FrameSubscriber for Recording {
        async fn provide_sink(
            &self,
            _header: &Header,
        ) -> Option<Box<dyn AsyncWrite + Send + Unpin>> {
            None
        }

        async fn consume(&self, header: Header, body: FrameBody, _payload_len: usize) {
            let bytes = body.as_buffered().map(|b| b.to_vec());
            self.frames.lock().unwrap().push((header, bytes));
            self.arrived.notify_one();
        }
    }

    async fn send_frame<W: AsyncWrite + Unpin>(writer: &mut W, header: Header, payload: &[u8]) {
        writer.write_all(&header.encode()).await.unwrap();
        writer.write_all(payload).await.unwrap();
        writer.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_buffered_frame_delivery() {
        let (mut remote, local) = tokio::io::duplex(1024);
        let (receiver, _notice) = PayloadReceiver::with_default_chunk_size();
        let subscriber = Recording::new();
        receiver.connect(local, subscriber.clone()).unwrap();

        let header = Header::new(5, PayloadKind::Buffered, true, 5);
        send_frame(&mut remote, header, b"hello").await;

        subscriber.arrived.notified().await;
        let frames = subscriber.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, header);
        assert_eq!(frames[0].1.as_deref(), Some(&b"hello"[..]));
    }

    #[tokio::test]
    async fn test_partial_reads_accumulate() {
        let (mut remote, local) = tokio::io::duplex(4);
        let (receiver, _notice) = PayloadReceiver::with_default_chunk_size();
        let subscriber = Recording::new();
        receiver.connect(local, subscriber.clone()).unwrap();

        // Tiny duplex capacity forces the header and payload to arrive split
        // across many reads.
        let payload: Vec<u8> = (0..40u8).collect();
        let header = Header::new(2, PayloadKind::Buffered, false, payload.len() as u32);
        send_frame(&mut remote, header, &payload).await;

        subscriber.arrived.notified().await;
        let frames = subscriber.frames.lock().unwrap();
        assert_eq!(frames[0].1.as_deref(), Some(payload.as_slice()));
    }

    struct MeteredReader<R> {
        inner: R,
        largest_read: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl<R: AsyncRead + Unpin> AsyncRead for MeteredReader<R> {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            let before = buf.filled().len();
            let me = &mut *self;
            let poll = std::pin::Pin::new(&mut me.inner).poll_read(cx, buf);
            if let std::task::Poll::Ready(Ok(())) = &poll {
                let n = buf.filled().len() - before;
                me.largest_read
                    .fetch_max(n, std::sync::atomic::Ordering::SeqCst);
            }
            poll
        }
    }

    #[tokio::test]
    async fn test_large_payload_read_in_bounded_chunks() {
        let (mut remote, local) = tokio::io::duplex(64 * 1024);
        let largest_read = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let metered = MeteredReader {
            inner: local,
            largest_read: largest_read.clone(),
        };

        let (receiver, _notice) = PayloadReceiver::new(16);
        let subscriber = Recording::new();
        receiver.connect(metered, subscriber.clone()).unwrap();

        // All 200 payload bytes are available up front; the bounded loop
        // must still move them 16 bytes at a time.
        let payload: Vec<u8> = (0..200u8).collect();
        let header = Header::new(6, PayloadKind::Buffered, true, payload.len() as u32);
        send_frame(&mut remote, header, &payload).await;

        subscriber.arrived.notified().await;
        let frames = subscriber.frames.lock().unwrap();
        assert_eq!(frames[0].1.as_deref(), Some(payload.as_slice()));

        let largest = largest_read.load(std::sync::atomic::Ordering::SeqCst);
        assert!(
            largest <= 16,
            "single physical read moved {largest} bytes, max_chunk is 16"
        );
    }

    #[tokio::test]
    async fn test_large_streamed_payload_read_in_bounded_chunks() {
        let (mut remote, local) = tokio::io::duplex(64 * 1024);
        let largest_read = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let metered = MeteredReader {
            inner: local,
            largest_read: largest_read.clone(),
        };

        let (receiver, _notice) = PayloadReceiver::new(16);
        let subscriber = Recording::new();
        receiver.connect(metered, subscriber.clone()).unwrap();

        let payload: Vec<u8> = (0..150u8).collect();
        let header = Header::new(7, PayloadKind::Streamed, true, payload.len() as u32);
        send_frame(&mut remote, header, &payload).await;

        subscriber.arrived.notified().await;
        let frames = subscriber.frames.lock().unwrap();
        assert_eq!(frames[0].1.as_deref(), Some(payload.as_slice()));
        assert!(largest_read.load(std::sync::atomic::Ordering::SeqCst) <= 16);
    }

    #[tokio::test]
    async fn test_oversized_declared_payload_disconnects() {
        let (mut remote, local) = tokio::io::duplex(64);
        let (receiver, mut notice) = PayloadReceiver::with_limits(64, 1024);
        receiver.connect(local, Recording::new()).unwrap();

        let header = Header::new(1, PayloadKind::Buffered, false, 4096);
        remote.write_all(&header.encode()).await.unwrap();

        let got = notice.recv().await.unwrap();
        assert!(got.reason.contains("exceeds maximum"));
        assert!(!receiver.is_connected());
    }

    #[tokio::test]
    async fn test_close_during_header_fires_notice() {
        let (mut remote, local) = tokio::io::duplex(64);
        let (receiver, mut notice) = PayloadReceiver::with_default_chunk_size();
        receiver.connect(local, Recording::new()).unwrap();

        remote.write_all(&[0u8; 3]).await.unwrap();
        drop(remote);

        let got = notice.recv().await.unwrap();
        assert!(got.reason.contains("header"));
        assert!(!receiver.is_connected());
    }

    #[tokio::test]
    async fn test_close_during_payload_fires_notice() {
        let (mut remote, local) = tokio::io::duplex(64);
        let (receiver, mut notice) = PayloadReceiver::with_default_chunk_size();
        receiver.connect(local, Recording::new()).unwrap();

        let header = Header::new(1, PayloadKind::Buffered, false, 100);
        remote.write_all(&header.encode()).await.unwrap();
        remote.write_all(b"short").await.unwrap();
        drop(remote);

        let got = notice.recv().await.unwrap();
        assert!(got.reason.contains("payload"));
    }

    #[tokio::test]
    async fn test_malformed_header_disconnects() {
        let (mut remote, local) = tokio::io::duplex(64);
        let (receiver, mut notice) = PayloadReceiver::with_default_chunk_size();
        receiver.connect(local, Recording::new()).unwrap();

        let mut bad = Header::new(1, PayloadKind::Buffered, false, 0).encode();
        bad[4] = 0x7F; // unknown kind marker
        remote.write_all(&bad).await.unwrap();

        let got = notice.recv().await.unwrap();
        assert!(got.reason.contains("kind marker"));
    }

    struct Piping {
        sink: Mutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>,
        delivered: Notify,
    }

    #[async_trait]
    impl FrameSubscriber for Piping {
        async fn provide_sink(
            &self,
            _header: &Header,
        ) -> Option<Box<dyn AsyncWrite + Send + Unpin>> {
            self.sink.lock().unwrap().take()
        }

        async fn consume(&self, _header: Header, body: FrameBody, payload_len: usize) {
            assert!(matches!(body, FrameBody::Piped));
            assert_eq!(payload_len, 6);
            self.delivered.notify_one();
        }
    }

    #[tokio::test]
    async fn test_streamed_frame_pipes_to_sink() {
        let (mut remote, local) = tokio::io::duplex(1024);
        let (sink_writer, mut sink_reader) = tokio::io::duplex(1024);

        let (receiver, _notice) = PayloadReceiver::with_default_chunk_size();
        let subscriber = Arc::new(Piping {
            sink: Mutex::new(Some(Box::new(sink_writer))),
            delivered: Notify::new(),
        });
        receiver.connect(local, subscriber.clone()).unwrap();

        let header = Header::new(8, PayloadKind::Streamed, true, 6);
        send_frame(&mut remote, header, b"piped!").await;

        subscriber.delivered.notified().await;
        let mut piped = [0u8; 6];
        sink_reader.read_exact(&mut piped).await.unwrap();
        assert_eq!(&piped, b"piped!");
    }

    #[tokio::test]
    async fn test_connect_twice_fails() {
        let (_remote, local_a) = tokio::io::duplex(64);
        let (_remote_b, local_b) = tokio::io::duplex(64);
        let (receiver, _notice) = PayloadReceiver::with_default_chunk_size();

        receiver.connect(local_a, Recording::new()).unwrap();
        assert!(matches!(
            receiver.connect(local_b, Recording::new()),
            Err(TransportError::AlreadyConnected)
        ));
    }
}
