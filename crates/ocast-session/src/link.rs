//! WebSocket session link with command/reply correlation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use ocast_core::error::SessionError;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::Connector;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::payload::{Payload, PayloadKind, DST_BROADCAST, SRC_SETTINGS};
use crate::profile::{LinkProfile, SslConfig};
use crate::traits::{DriverEvent, Link, LinkListener};

/// Connection state of a session link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

type PendingReply = oneshot::Sender<Result<Value, SessionError>>;

/// State shared between the public handle and the reader task.
struct LinkRouter {
    state: Mutex<LinkState>,
    pending: Mutex<HashMap<u32, PendingReply>>,
    writer: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    listener: Arc<dyn LinkListener>,
    closed: Notify,
}

impl LinkRouter {
    fn new(listener: Arc<dyn LinkListener>) -> Self {
        LinkRouter {
            state: Mutex::new(LinkState::Disconnected),
            pending: Mutex::new(HashMap::new()),
            writer: Mutex::new(None),
            listener,
            closed: Notify::new(),
        }
    }

    fn state(&self) -> LinkState {
        *lock(&self.state)
    }

    fn set_state(&self, state: LinkState) {
        *lock(&self.state) = state;
    }

    /// Register a pending reply slot for `id`. Must happen before the
    /// command is transmitted.
    fn register(&self, id: u32) -> oneshot::Receiver<Result<Value, SessionError>> {
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);
        rx
    }

    fn unregister(&self, id: u32) {
        lock(&self.pending).remove(&id);
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Drop every pending entry; their callers observe `Closed`.
    fn fail_pending(&self) {
        lock(&self.pending).clear();
    }

    /// Route one inbound text frame.
    async fn handle_frame(&self, text: &str) {
        let payload = match Payload::decode(text) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("ignoring undecodable frame: {e}");
                return;
            }
        };
        match payload.kind {
            PayloadKind::Reply => self.handle_reply(payload),
            PayloadKind::Event => self.handle_event(payload).await,
            PayloadKind::Command => trace!("ignoring inbound command frame"),
        }
    }

    fn handle_reply(&self, payload: Payload) {
        let pending = lock(&self.pending).remove(&payload.id);
        match pending {
            // Expected under normal async conditions, e.g. a reply racing a
            // link teardown.
            None => trace!(id = payload.id, "reply for unknown sequence id, dropped"),
            Some(reply) => {
                let status = payload.reply_status();
                let result = if status.is_ok() {
                    Ok(payload.message)
                } else {
                    Err(SessionError::CommandFailure(status.as_str().to_owned()))
                };
                let _ = reply.send(result);
            }
        }
    }

    async fn handle_event(&self, payload: Payload) {
        if payload.dst == DST_BROADCAST || payload.src == SRC_SETTINGS {
            self.listener
                .on_event(DriverEvent {
                    source: payload.src,
                    data: payload.message,
                })
                .await;
        } else {
            trace!(dst = %payload.dst, "event for another destination, ignored");
        }
    }

    /// The transport errored out underneath us.
    async fn handle_transport_failure(&self, reason: String) {
        let state = self.state();
        self.set_state(LinkState::Disconnected);
        *lock(&self.writer) = None;
        self.fail_pending();
        if matches!(state, LinkState::Connected | LinkState::Connecting) {
            self.listener
                .on_failure(SessionError::Failed(reason))
                .await;
        }
    }

    /// The transport closed; graceful only when we asked for it.
    async fn handle_closed(&self) {
        let state = self.state();
        self.set_state(LinkState::Disconnected);
        *lock(&self.writer) = None;
        self.fail_pending();
        match state {
            LinkState::Disconnecting => {
                debug!("link closed");
                self.closed.notify_one();
            }
            LinkState::Connected | LinkState::Connecting => {
                self.listener.on_failure(SessionError::Closed).await;
            }
            LinkState::Disconnected => {}
        }
    }
}

/// A WebSocket session link to one device endpoint.
///
/// Outgoing commands get monotonically increasing sequence ids; replies are
/// matched strictly by id. Events whose destination is the broadcast id, or
/// whose source is the reserved settings id, reach the registered listener.
pub struct SessionLink {
    url: String,
    ssl: Option<SslConfig>,
    src_id: String,
    sequence: AtomicU32,
    router: Arc<LinkRouter>,
}

impl SessionLink {
    pub fn new(profile: LinkProfile, listener: Arc<dyn LinkListener>) -> Self {
        SessionLink {
            url: profile.app2app_url().to_owned(),
            ssl: profile.ssl().cloned(),
            src_id: Uuid::new_v4().to_string(),
            sequence: AtomicU32::new(0),
            router: Arc::new(LinkRouter::new(listener)),
        }
    }

    pub fn state(&self) -> LinkState {
        self.router.state()
    }

    fn next_sequence(&self) -> u32 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl Link for SessionLink {
    async fn connect(&self) -> Result<(), SessionError> {
        if self.state() == LinkState::Connected {
            return Ok(());
        }
        self.router.set_state(LinkState::Connecting);

        let connector = self
            .ssl
            .as_ref()
            .map(|ssl| Connector::Rustls(ssl.client_config()));
        let stream = match tokio_tungstenite::connect_async_tls_with_config(
            self.url.as_str(),
            None,
            false,
            connector,
        )
        .await
        {
            Ok((stream, _response)) => stream,
            Err(e) => {
                self.router.set_state(LinkState::Disconnected);
                return Err(SessionError::ConnectFailed {
                    url: self.url.clone(),
                    reason: e.to_string(),
                });
            }
        };
        debug!(url = %self.url, "link open");
        self.router.set_state(LinkState::Connected);

        let (mut sink, mut source) = stream.split();
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Message>();
        *lock(&self.router.writer) = Some(writer_tx);

        tokio::spawn(async move {
            while let Some(message) = writer_rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    debug!("websocket send failed: {e}");
                    break;
                }
            }
        });

        let router = Arc::clone(&self.router);
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => router.handle_frame(&text).await,
                    Ok(Message::Close(_)) => break,
                    // Pings and pongs are handled by the transport.
                    Ok(_) => {}
                    Err(e) => {
                        router.handle_transport_failure(e.to_string()).await;
                        return;
                    }
                }
            }
            router.handle_closed().await;
        });

        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        if self.state() == LinkState::Disconnected {
            return Ok(());
        }
        self.router.set_state(LinkState::Disconnecting);
        let writer = lock(&self.router.writer).clone();
        match writer {
            Some(writer) => {
                let _ = writer.send(Message::Close(None));
                // Resolves on the reader's closed signal, never optimistically.
                self.router.closed.notified().await;
            }
            None => self.router.set_state(LinkState::Disconnected),
        }
        Ok(())
    }

    fn url(&self) -> &str {
        &self.url
    }

    async fn send_payload(&self, domain: &str, message: Value) -> Result<Value, SessionError> {
        if self.state() != LinkState::Connected {
            return Err(SessionError::NotConnected);
        }
        let id = self.next_sequence();
        let payload = Payload::command(domain, self.src_id.clone(), id, message);
        let text = payload.encode().map_err(|_| SessionError::SendFailed)?;

        // The pending entry must exist before the frame hits the wire.
        let reply = self.router.register(id);
        let sent = lock(&self.router.writer)
            .as_ref()
            .map(|writer| writer.send(Message::Text(text)).is_ok())
            .unwrap_or(false);
        if !sent {
            self.router.unregister(id);
            return Err(SessionError::SendFailed);
        }
        trace!(id, domain, "command sent");

        reply.await.map_err(|_| SessionError::Closed)?
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
