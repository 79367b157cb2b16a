//! In-process transport.
//!
//! When the dispatcher runs inside a worker spawned by the host, no socket
//! exists; outbound frames are wrapped in tagged envelopes and handed to
//! whatever carries messages between parent and worker, and inbound
//! messages are redelivered straight to the [`Connection`]. The registry,
//! dispatcher, and connection stack is the same one the network path uses.

use serde::{Deserialize, Serialize};
use switchboard_core::{Channel, Connection, CoreError, Dispatcher};
use switchboard_rpc::Frame;
use tokio::sync::mpsc;
use tracing::debug;

/// What an envelope carries: serialized text messages stay strings, binary
/// frames travel as raw byte arrays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipePayload {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeOptions {
    pub binary: bool,
}

/// The tagged envelope crossing the parent/worker pipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PipeEnvelope {
    Receive {
        msg: PipePayload,
        #[serde(skip_serializing_if = "Option::is_none")]
        options: Option<PipeOptions>,
    },
}

impl PipeEnvelope {
    fn from_frame(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => PipeEnvelope::Receive {
                msg: PipePayload::Text(text),
                options: None,
            },
            Frame::Binary(bytes) => PipeEnvelope::Receive {
                msg: PipePayload::Binary(bytes.to_vec()),
                options: Some(PipeOptions { binary: true }),
            },
        }
    }
}

struct PipeChannel {
    tx: std::sync::Mutex<Option<mpsc::UnboundedSender<PipeEnvelope>>>,
}

impl Channel for PipeChannel {
    fn send(&self, frame: Frame) -> switchboard_core::Result<()> {
        let guard = self
            .tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return Err(CoreError::ChannelClosed);
        };
        tx.send(PipeEnvelope::from_frame(frame))
            .map_err(|_| CoreError::ChannelClosed)
    }

    fn close(&self) {
        let mut guard = self
            .tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.take();
    }
}

/// A [`Connection`] whose outbound side is a stream of [`PipeEnvelope`]s.
/// The caller forwards envelopes to the peer process and redelivers the
/// peer's messages through [`Connection::receive`].
#[must_use]
pub fn pipe_connection() -> (Connection, mpsc::UnboundedReceiver<PipeEnvelope>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let channel = PipeChannel {
        tx: std::sync::Mutex::new(Some(tx)),
    };
    (Connection::new(channel), rx)
}

/// Redeliver inbound pipe messages to the connection until the inbound
/// side closes, then close the connection.
pub async fn run_pipe(
    connection: Connection,
    mut inbound: mpsc::UnboundedReceiver<String>,
    dispatcher: Dispatcher,
) {
    while let Some(raw) = inbound.recv().await {
        connection.receive(&raw, &dispatcher).await;
    }
    debug!("pipe closed for session {}", connection.session_id());
    connection.close();
}
