//! Command and event plumbing for the switchboard host.
//!
//! The pieces fit together like this: a [`DomainRegistry`] holds the
//! domains, commands, and events that modules register; a [`Dispatcher`]
//! routes parsed requests to their handlers; each client holds a
//! [`Connection`] that serializes responses, progress, and events onto its
//! transport; a [`Broadcaster`] fans events out to every live connection.
//! Transports stay out of this crate entirely, they plug in through the
//! [`Channel`] trait.

pub mod broadcast;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod modules;
pub mod registry;

pub use broadcast::Broadcaster;
pub use connection::{Channel, Connection, QueueChannel, SessionId};
pub use dispatch::{AsyncHandler, CommandResult, Dispatcher, Handler, HandlerError, Responder, SyncHandler};
pub use error::{CoreError, Result};
pub use modules::{DomainModule, ModuleResolver, ResolvedModule, StaticModuleResolver};
pub use registry::{
    ArgSpec, CommandDescription, DomainDescription, DomainRegistry, DomainVersion,
    EventDescription,
};
