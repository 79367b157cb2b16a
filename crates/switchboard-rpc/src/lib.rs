//! Wire protocol definitions for the switchboard command host.
//!
//! This crate defines the messages exchanged between a host process and its
//! clients: inbound command requests, outbound tagged envelopes
//! (responses, progress, errors, broadcast events), and the binary framing
//! escape hatch for raw-byte payloads. It contains no I/O; transports live
//! in `switchboard-host`.
//!
//! # Modules
//!
//! - [`protocol`]: request/envelope types and lenient request parsing
//! - [`framing`]: binary response frames and the [`Frame`] transport unit
//! - [`error`]: error and result types

pub mod error;
pub mod framing;
pub mod protocol;

pub use error::{ProtocolError, Result};
pub use framing::{Frame, decode_binary_response, encode_binary_response};
pub use protocol::{Request, ServerMessage, parse_request};
