//! Duplex request/response connection.
//!
//! [`SkillConnection`] binds a [`PayloadSender`] and [`PayloadReceiver`] to
//! one byte stream and speaks the [`Envelope`] protocol over it. Outbound
//! requests get a fresh stream id and a pending-exchange slot; inbound
//! frames are decoded and dispatched: peer requests go through the bound
//! [`RequestRouter`] and are answered on the same stream id, responses
//! complete the matching pending exchange.
//!
//! A disconnect of either half tears down both and fails every pending
//! exchange.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Result, TransportError};
use crate::protocol::{
    Envelope, FrameBody, Header, PayloadKind, SendPacket, StreamingRequest, StreamingResponse,
};
use crate::receiver::{FrameSubscriber, PayloadReceiver};
use crate::router::RequestRouter;
use crate::sender::PayloadSender;
use crate::transport::DisconnectNotice;

type PendingMap = Mutex<HashMap<u32, oneshot::Sender<StreamingResponse>>>;

/// One live duplex connection speaking the envelope protocol.
pub struct SkillConnection {
    sender: Arc<PayloadSender>,
    receiver: Arc<PayloadReceiver>,
    pending: Arc<PendingMap>,
    close_reason: Arc<Mutex<Option<String>>>,
    next_stream_id: AtomicU32,
}

impl SkillConnection {
    /// Bind a byte stream and start both pipeline halves. Inbound requests
    /// are dispatched through `router`.
    pub fn connect<S>(stream: S, router: Arc<RequestRouter>) -> Result<Arc<Self>>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);

        let (sender, sender_notice) = PayloadSender::with_default_chunk_size();
        let sender = Arc::new(sender);
        let (receiver, receiver_notice) = PayloadReceiver::with_default_chunk_size();
        let receiver = Arc::new(receiver);

        let pending: Arc<PendingMap> = Arc::new(Mutex::new(HashMap::new()));
        let close_reason = Arc::new(Mutex::new(None));

        sender.connect(write_half)?;
        receiver.connect(
            read_half,
            Arc::new(EnvelopeSubscriber {
                sender: sender.clone(),
                router,
                pending: pending.clone(),
            }),
        )?;

        let connection = Arc::new(Self {
            sender,
            receiver,
            pending,
            close_reason,
            next_stream_id: AtomicU32::new(1),
        });
        connection
            .clone()
            .spawn_close_watcher(sender_notice, receiver_notice);
        Ok(connection)
    }

    /// Whether both pipeline halves are live.
    pub fn is_connected(&self) -> bool {
        self.sender.is_connected() && self.receiver.is_connected()
    }

    /// Send a request and wait for the peer's response.
    ///
    /// # Errors
    ///
    /// Fails if the connection is down, the envelope cannot be encoded, or
    /// the connection drops before the response arrives.
    pub async fn request(&self, request: StreamingRequest) -> Result<StreamingResponse> {
        let stream_id = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
        let payload = Envelope::Request(request).encode()?;

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending map lock")
            .insert(stream_id, tx);

        let header = Header::new(stream_id, PayloadKind::Buffered, true, payload.len() as u32);
        if let Err(e) = self
            .sender
            .post(SendPacket::buffered(header, Bytes::from(payload)))
        {
            self.pending
                .lock()
                .expect("pending map lock")
                .remove(&stream_id);
            return Err(e);
        }

        rx.await.map_err(|_| {
            let reason = self
                .close_reason
                .lock()
                .expect("close reason lock")
                .clone()
                .unwrap_or_else(|| "connection closed".to_string());
            TransportError::disconnected(reason)
        })
    }

    /// Tear down both halves. Idempotent.
    pub async fn disconnect(&self, reason: Option<String>) {
        self.sender.disconnect(reason.clone()).await;
        self.receiver.disconnect(reason).await;
    }

    /// On the first notice from either half, tear down the other half and
    /// fail every pending exchange.
    fn spawn_close_watcher(
        self: Arc<Self>,
        mut sender_notice: mpsc::UnboundedReceiver<DisconnectNotice>,
        mut receiver_notice: mpsc::UnboundedReceiver<DisconnectNotice>,
    ) {
        let connection = self;
        tokio::spawn(async move {
            let notice = tokio::select! {
                n = sender_notice.recv() => n,
                n = receiver_notice.recv() => n,
            };
            let reason = notice.map(|n| n.reason).unwrap_or_default();
            tracing::debug!(%reason, "connection closing");

            *connection
                .close_reason
                .lock()
                .expect("close reason lock") = Some(reason.clone());
            connection.disconnect(Some(reason)).await;

            // Dropping the oneshot senders wakes every waiting requester.
            connection.pending.lock().expect("pending map lock").clear();
        });
    }
}

/// Frame subscriber decoding envelopes and dispatching them.
struct EnvelopeSubscriber {
    sender: Arc<PayloadSender>,
    router: Arc<RequestRouter>,
    pending: Arc<PendingMap>,
}

#[async_trait]
impl FrameSubscriber for EnvelopeSubscriber {
    async fn provide_sink(&self, _header: &Header) -> Option<Box<dyn AsyncWrite + Send + Unpin>> {
        // Envelopes are small structured payloads; always buffer.
        None
    }

    async fn consume(&self, header: Header, body: FrameBody, _payload_len: usize) {
        let Some(bytes) = body.as_buffered() else {
            return;
        };
        let envelope = match Envelope::decode(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(stream_id = header.stream_id, error = %e, "undecodable envelope, frame dropped");
                return;
            }
        };

        match envelope {
            Envelope::Request(request) => {
                // Handled off the frame loop so a slow handler cannot stall
                // inbound traffic.
                let sender = self.sender.clone();
                let router = self.router.clone();
                tokio::spawn(async move {
                    let response = router.process_request(&request).await;
                    if let Err(e) = post_response(&sender, header.stream_id, response) {
                        tracing::warn!(stream_id = header.stream_id, error = %e, "failed to post response");
                    }
                });
            }
            Envelope::Response(response) => {
                let slot = self
                    .pending
                    .lock()
                    .expect("pending map lock")
                    .remove(&header.stream_id);
                match slot {
                    // Requester may have given up; losing the race is fine.
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => {
                        tracing::warn!(
                            stream_id = header.stream_id,
                            "response for unknown exchange dropped"
                        );
                    }
                }
            }
        }
    }
}

fn post_response(
    sender: &PayloadSender,
    stream_id: u32,
    response: StreamingResponse,
) -> Result<()> {
    let payload = Envelope::Response(response).encode()?;
    let header = Header::new(stream_id, PayloadKind::Buffered, true, payload.len() as u32);
    sender.post(SendPacket::buffered(header, Bytes::from(payload)))
}
