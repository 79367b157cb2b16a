//! Switchboard host library: the `base` domain, both transports, and the
//! host lifecycle.
//!
//! Most users start a [`Host`] and point a WebSocket client at its port;
//! embedders running the dispatcher in-process use [`pipe::pipe_connection`]
//! instead and skip the network entirely.

pub mod base;
pub mod error;
pub mod net;
pub mod pipe;
pub mod server;

pub use base::{BaseDomain, MaintenanceRequest, broadcast_log};
pub use error::{HostError, Result};
pub use net::{DEFAULT_PORT_START, DEFAULT_PORT_WINDOW, bind_free_port};
pub use pipe::{PipeEnvelope, PipeOptions, PipePayload, pipe_connection, run_pipe};
pub use server::{Host, HostConfig};
