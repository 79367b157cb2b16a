//! Protocol message types.
//!
//! Inbound traffic is a stream of JSON request objects
//! (`{id, domain, command, parameters?}`); outbound traffic is a stream of
//! tagged envelopes (`{type, message}`). One JSON object per transport
//! frame in both directions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, Result};

/// A command invocation sent by a client.
///
/// The `id` is caller-supplied and correlates the request with exactly one
/// terminal response plus any number of progress messages. The host never
/// generates ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u32,
    pub domain: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Value>,
}

impl Request {
    #[must_use]
    pub fn new(id: u32, domain: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id,
            domain: domain.into(),
            command: command.into(),
            parameters: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: Vec<Value>) -> Self {
        self.parameters = parameters;
        self
    }
}

/// A host-to-client message, serialized as `{"type": ..., "message": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message", rename_all = "camelCase")]
pub enum ServerMessage {
    CommandResponse {
        id: u32,
        response: Value,
    },
    CommandProgress {
        id: u32,
        message: Value,
    },
    CommandError {
        id: u32,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },
    Event {
        id: u32,
        domain: String,
        event: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        parameters: Option<Vec<Value>>,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    /// Serialize this message to the wire form.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not representable as JSON. Callers
    /// on the host side log and drop the message in that case.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a wire-form envelope. Used by clients and tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not match any envelope shape.
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Parse an inbound request, tolerating one known truncation bug.
///
/// A strict parse is attempted first. On failure the text is re-parsed with
/// a single `'}'` appended; some transports have been observed to drop the
/// final closing brace of a frame, and the retry recovers those messages.
/// If both parses fail, or a required field is missing, the returned
/// [`ProtocolError::Malformed`] carries the *original* text.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] for unparsable or incomplete
/// requests. This class of failure is not connection-fatal.
pub fn parse_request(raw: &str) -> Result<Request> {
    let value = match serde_json::from_str::<Value>(raw) {
        Ok(v) => v,
        Err(strict_err) => {
            let mut patched = String::with_capacity(raw.len() + 1);
            patched.push_str(raw);
            patched.push('}');
            match serde_json::from_str::<Value>(&patched) {
                Ok(v) => {
                    tracing::debug!("recovered truncated request by appending closing brace");
                    v
                }
                Err(_) => {
                    return Err(ProtocolError::Malformed {
                        reason: strict_err.to_string(),
                        raw: raw.to_string(),
                    });
                }
            }
        }
    };

    request_from_value(value).map_err(|reason| ProtocolError::Malformed {
        reason,
        raw: raw.to_string(),
    })
}

fn request_from_value(value: Value) -> std::result::Result<Request, String> {
    let Value::Object(map) = value else {
        return Err("request is not an object".to_string());
    };

    let id = map
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| "missing or invalid id".to_string())?;
    let id = u32::try_from(id).map_err(|_| "id out of range".to_string())?;

    let domain = map
        .get("domain")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing domain".to_string())?
        .to_string();

    let command = map
        .get("command")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing command".to_string())?
        .to_string();

    let parameters = match map.get("parameters") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(_) => return Err("parameters is not an array".to_string()),
    };

    Ok(Request {
        id,
        domain,
        command,
        parameters,
    })
}
