//! Error types for the protocol engine.

/// Errors that can occur in the registry, loader, and connection layer.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A command was registered twice under the same `(domain, name)` pair.
    /// This is a programming error in the registering module and is fatal to
    /// that module's load, not to the host.
    #[error("command {domain}.{command} is already registered")]
    DuplicateCommand { domain: String, command: String },

    /// A module path did not resolve to anything the host knows about.
    #[error("no module registered for path: {0}")]
    ModuleNotFound(String),

    /// A path resolved to something that exposes no `init` entry point.
    #[error("module {0} has no init() entry point")]
    MissingInit(String),

    /// A module's `init` failed while registering its surface.
    #[error("module {path} failed to initialize: {source}")]
    ModuleInit {
        path: String,
        #[source]
        source: Box<CoreError>,
    },

    /// The transport channel behind a connection is gone.
    #[error("channel closed")]
    ChannelClosed,

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wire protocol error.
    #[error(transparent)]
    Protocol(#[from] switchboard_rpc::ProtocolError),
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_command_display() {
        let err = CoreError::DuplicateCommand {
            domain: "fs".to_string(),
            command: "readFile".to_string(),
        };
        assert_eq!(err.to_string(), "command fs.readFile is already registered");
    }

    #[test]
    fn test_missing_init_display() {
        let err = CoreError::MissingInit("/ext/foo".to_string());
        assert!(err.to_string().contains("no init()"));
        assert!(err.to_string().contains("/ext/foo"));
    }

    #[test]
    fn test_module_init_carries_source() {
        let err = CoreError::ModuleInit {
            path: "/ext/bar".to_string(),
            source: Box::new(CoreError::DuplicateCommand {
                domain: "bar".to_string(),
                command: "run".to_string(),
            }),
        };
        assert!(err.to_string().contains("/ext/bar"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<i32>("x").unwrap_err();
        let err: CoreError = json_err.into();
        assert!(matches!(err, CoreError::Json(_)));
    }
}
