//! Error types for the wire protocol.

/// Errors produced while parsing or building wire messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The inbound text could not be parsed as a request, even after the
    /// lenient retry. The display form is the exact text sent back to the
    /// client in a top-level `error` message.
    #[error("Malformed message ({reason}): {raw}")]
    Malformed { reason: String, raw: String },

    /// A binary frame shorter than the 4-byte id prefix.
    #[error("binary frame too short: {0} bytes")]
    FrameTooShort(usize),

    /// Outbound payload could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
