//! Per-client connection: parse inbound requests, serialize outbound
//! messages, and hand frames to the underlying transport channel.
//!
//! Connections hold no command-level state; request/response correlation is
//! carried entirely by the client-supplied message id. The only transport
//! knowledge lives behind the [`Channel`] trait, so the same connection
//! code serves network sockets and in-process pipes alike.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use switchboard_rpc::{Frame, ServerMessage, encode_binary_response, parse_request};

use crate::dispatch::{CommandResult, Dispatcher};
use crate::error::{CoreError, Result};

/// Unique identifier for one client session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One direction of a concrete transport: accepts outbound frames and can
/// be closed. `close` must be idempotent.
pub trait Channel: Send + Sync {
    /// Queue a frame for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ChannelClosed`] if the transport is gone.
    fn send(&self, frame: Frame) -> Result<()>;

    /// Tear the channel down. Safe to call more than once.
    fn close(&self);
}

/// An mpsc-backed [`Channel`]: frames are queued for a transport pump task
/// that owns the receiver half. Closing drops the sender, which ends the
/// pump.
pub struct QueueChannel {
    tx: std::sync::Mutex<Option<mpsc::UnboundedSender<Frame>>>,
}

impl QueueChannel {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: std::sync::Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

impl Channel for QueueChannel {
    fn send(&self, frame: Frame) -> Result<()> {
        let guard = self.tx.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return Err(CoreError::ChannelClosed);
        };
        tx.send(frame).map_err(|_| CoreError::ChannelClosed)
    }

    fn close(&self) {
        let mut guard = self.tx.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.take();
    }
}

struct ConnectionInner {
    session_id: SessionId,
    channel: Box<dyn Channel>,
    // Ids for event messages delivered to this client; each connection
    // numbers the broadcasts it actually received.
    event_seq: AtomicU32,
}

/// A per-client session wrapping one transport channel.
///
/// Cheap to clone; clones share the channel and are how handlers retain the
/// ability to respond after the dispatch call returns.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    #[must_use]
    pub fn new(channel: impl Channel + 'static) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                session_id: SessionId::new(),
                channel: Box::new(channel),
                event_seq: AtomicU32::new(0),
            }),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    /// Handle one inbound text message.
    ///
    /// Parse failures (including the failed lenient retry) and missing
    /// required fields reply with a top-level `error` message; the
    /// connection stays open either way.
    pub async fn receive(&self, raw: &str, dispatcher: &Dispatcher) {
        match parse_request(raw) {
            Ok(request) => {
                dispatcher
                    .execute(
                        self,
                        request.id,
                        &request.domain,
                        &request.command,
                        request.parameters,
                    )
                    .await;
            }
            Err(err) => {
                warn!("[{}] {}", self.inner.session_id, err);
                self.send_error(&err.to_string());
            }
        }
    }

    /// Send the terminal success message for a request. Raw-byte results
    /// take the binary framing path instead of the structured channel.
    pub fn send_command_response(&self, id: u32, result: CommandResult) {
        match result {
            CommandResult::Json(response) => {
                self.send_message(&ServerMessage::CommandResponse { id, response });
            }
            CommandResult::Binary(payload) => {
                self.send_frame(Frame::Binary(encode_binary_response(id, &payload)));
            }
        }
    }

    pub fn send_command_progress(&self, id: u32, message: Value) {
        self.send_message(&ServerMessage::CommandProgress { id, message });
    }

    pub fn send_command_error(&self, id: u32, message: &str, stack: Option<String>) {
        self.send_message(&ServerMessage::CommandError {
            id,
            message: message.to_string(),
            stack,
        });
    }

    /// Deliver a broadcast event to this client. Event ids are a
    /// per-connection monotonically increasing sequence.
    pub fn send_event(&self, domain: &str, event: &str, parameters: Option<Vec<Value>>) {
        let id = self.inner.event_seq.fetch_add(1, Ordering::Relaxed);
        self.send_message(&ServerMessage::Event {
            id,
            domain: domain.to_string(),
            event: event.to_string(),
            parameters,
        });
    }

    /// Send a top-level protocol error (no request id to correlate).
    pub fn send_error(&self, message: &str) {
        self.send_message(&ServerMessage::Error {
            message: message.to_string(),
        });
    }

    /// Close the underlying channel. Idempotent.
    pub fn close(&self) {
        self.inner.channel.close();
    }

    fn send_message(&self, message: &ServerMessage) {
        match message.to_json() {
            Ok(text) => self.send_frame(Frame::Text(text)),
            Err(err) => {
                // Unrepresentable payloads are dropped, never escalated; the
                // client simply does not receive this particular message.
                warn!(
                    "[{}] dropping unserializable outbound message: {}",
                    self.inner.session_id, err
                );
            }
        }
    }

    fn send_frame(&self, frame: Frame) {
        if self.inner.channel.send(frame).is_err() {
            debug!("[{}] channel closed, frame dropped", self.inner.session_id);
        }
    }
}
