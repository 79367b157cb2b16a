//! Host-level error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("no free port in range {start}..{end}")]
    NoFreePort { start: u16, end: u16 },

    #[error("WebSocket handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Core error: {0}")]
    Core(#[from] switchboard_core::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HostError>;
