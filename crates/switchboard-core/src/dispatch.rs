//! Command dispatch: handler types and execution.
//!
//! The dispatcher looks a command up in the registry and runs it, reporting
//! the outcome back through the connection that carried the request. Sync
//! handlers return a result directly; async handlers receive a [`Responder`]
//! and complete (or report progress) whenever their work finishes.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use crate::connection::Connection;
use crate::registry::DomainRegistry;

/// The value produced by a successful command.
///
/// `Binary` payloads skip structured serialization and travel as an
/// id-prefixed binary frame (see `switchboard_rpc::framing`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Json(Value),
    Binary(bytes::Bytes),
}

impl From<Value> for CommandResult {
    fn from(value: Value) -> Self {
        CommandResult::Json(value)
    }
}

impl From<bytes::Bytes> for CommandResult {
    fn from(bytes: bytes::Bytes) -> Self {
        CommandResult::Binary(bytes)
    }
}

impl From<Vec<u8>> for CommandResult {
    fn from(bytes: Vec<u8>) -> Self {
        CommandResult::Binary(bytes.into())
    }
}

/// A failure reported by a command handler.
///
/// Carries a short human-readable message for the client plus an optional
/// multi-line diagnostic string (the error's source chain) surfaced to the
/// client as the `stack` field of a `commandError`.
#[derive(Debug, Clone)]
pub struct HandlerError {
    message: String,
    stack: Option<String>,
}

impl HandlerError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Build a handler error from any error value, rendering its source
    /// chain as the diagnostic stack.
    #[must_use]
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let message = err.to_string();
        let mut stack = message.clone();
        let mut source = err.source();
        while let Some(cause) = source {
            stack.push_str("\n  caused by: ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }
        Self {
            message,
            stack: Some(stack),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HandlerError {}

pub type SyncHandler =
    Arc<dyn Fn(&[Value]) -> Result<CommandResult, HandlerError> + Send + Sync>;
pub type AsyncHandler = Arc<dyn Fn(Vec<Value>, Responder) + Send + Sync>;

/// A command implementation.
///
/// The variant decides the invocation style: `Sync` handlers produce their
/// terminal result on return, `Async` handlers are handed a [`Responder`]
/// and may spawn work that completes later.
#[derive(Clone)]
pub enum Handler {
    Sync(SyncHandler),
    Async(AsyncHandler),
}

impl Handler {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<CommandResult, HandlerError> + Send + Sync + 'static,
    {
        Handler::Sync(Arc::new(f))
    }

    pub fn async_fn<F>(f: F) -> Self
    where
        F: Fn(Vec<Value>, Responder) + Send + Sync + 'static,
    {
        Handler::Async(Arc::new(f))
    }

    #[must_use]
    pub fn is_async(&self) -> bool {
        matches!(self, Handler::Async(_))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Sync(_) => f.write_str("Handler::Sync"),
            Handler::Async(_) => f.write_str("Handler::Async"),
        }
    }
}

/// Completion/progress reporter handed to async handlers.
///
/// Exactly one terminal message reaches the client per request id: the
/// first `resolve`/`reject` call wins and later terminal calls (and any
/// progress after them) are dropped with a warning. Clones share the same
/// first-wins flag, so a handler may move copies into spawned tasks.
#[derive(Clone)]
pub struct Responder {
    connection: Connection,
    id: u32,
    done: Arc<AtomicBool>,
}

impl Responder {
    pub(crate) fn new(connection: Connection, id: u32) -> Self {
        Self {
            connection,
            id,
            done: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Emit a `commandProgress` message. May be called any number of times
    /// before the terminal response.
    pub fn progress(&self, message: impl Into<Value>) {
        if self.done.load(Ordering::SeqCst) {
            warn!("progress after terminal response dropped (id={})", self.id);
            return;
        }
        self.connection.send_command_progress(self.id, message.into());
    }

    /// Complete the command successfully.
    pub fn resolve(&self, result: impl Into<CommandResult>) {
        if self.done.swap(true, Ordering::SeqCst) {
            warn!("duplicate terminal response dropped (id={})", self.id);
            return;
        }
        self.connection.send_command_response(self.id, result.into());
    }

    /// Complete the command with an error.
    pub fn reject(&self, error: HandlerError) {
        if self.done.swap(true, Ordering::SeqCst) {
            warn!("duplicate terminal response dropped (id={})", self.id);
            return;
        }
        self.connection
            .send_command_error(self.id, error.message(), error.stack().map(String::from));
    }
}

/// Executes commands against the shared registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<RwLock<DomainRegistry>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(registry: Arc<RwLock<DomainRegistry>>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<RwLock<DomainRegistry>> {
        &self.registry
    }

    /// Execute `domain.command` with `parameters`, reporting the outcome
    /// through `connection` under the caller-supplied request id.
    ///
    /// An unknown domain or command synthesizes a `commandError` without
    /// touching any handler. There is no cross-request ordering guarantee
    /// and no id-reuse detection: reusing an id while a prior request with
    /// that id is outstanding is a caller contract violation with undefined
    /// results.
    pub async fn execute(
        &self,
        connection: &Connection,
        id: u32,
        domain: &str,
        command: &str,
        parameters: Vec<Value>,
    ) {
        trace!("executing {}.{} (id={})", domain, command, id);

        // Clone the handler out so the read lock is released before the
        // handler runs; handlers may need the write lock (hot-loading).
        let handler = {
            let registry = self.registry.read().await;
            registry.command_handler(domain, command)
        };

        let Some(handler) = handler else {
            debug!("no such command: {}.{}", domain, command);
            connection.send_command_error(id, &format!("no such command: {domain}.{command}"), None);
            return;
        };

        match handler {
            Handler::Sync(f) => match f(&parameters) {
                Ok(result) => connection.send_command_response(id, result),
                Err(err) => {
                    connection.send_command_error(
                        id,
                        err.message(),
                        err.stack().map(String::from),
                    );
                }
            },
            Handler::Async(f) => {
                let responder = Responder::new(connection.clone(), id);
                f(parameters, responder);
            }
        }
    }
}
