//! The `base` domain.
//!
//! Always loaded before any client traffic. It carries the one command
//! that grows the host's surface at runtime (`loadDomainModulesFromPaths`)
//! and the event channels that exist before any other domain does.

use std::sync::Arc;

use serde_json::{Value, json};
use switchboard_core::{
    ArgSpec, Broadcaster, DomainModule, DomainRegistry, DomainVersion, Handler, HandlerError,
    ModuleResolver,
};
use tokio::sync::{RwLock, mpsc};
use tracing::{error, info, warn};

/// Commands connected clients may use to manage the host process itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceRequest {
    Restart,
}

pub struct BaseDomain {
    registry: Arc<RwLock<DomainRegistry>>,
    resolver: Arc<dyn ModuleResolver>,
    broadcaster: Broadcaster,
    maintenance_tx: mpsc::UnboundedSender<MaintenanceRequest>,
}

impl BaseDomain {
    #[must_use]
    pub fn new(
        registry: Arc<RwLock<DomainRegistry>>,
        resolver: Arc<dyn ModuleResolver>,
        broadcaster: Broadcaster,
        maintenance_tx: mpsc::UnboundedSender<MaintenanceRequest>,
    ) -> Self {
        Self {
            registry,
            resolver,
            broadcaster,
            maintenance_tx,
        }
    }
}

impl DomainModule for BaseDomain {
    fn init(&self, registry: &mut DomainRegistry) -> switchboard_core::Result<()> {
        registry.register_domain("base", DomainVersion::Versioned { major: 0, minor: 1 });

        let load_registry = Arc::clone(&self.registry);
        let load_resolver = Arc::clone(&self.resolver);
        let load_broadcaster = self.broadcaster.clone();
        registry.register_command(
            "base",
            "loadDomainModulesFromPaths",
            Handler::async_fn(move |parameters, responder| {
                let paths = match module_paths(&parameters) {
                    Ok(paths) => paths,
                    Err(err) => {
                        responder.reject(err);
                        return;
                    }
                };
                let registry = Arc::clone(&load_registry);
                let resolver = Arc::clone(&load_resolver);
                let broadcaster = load_broadcaster.clone();
                tokio::spawn(async move {
                    let outcome = {
                        let mut registry = registry.write().await;
                        registry.load_modules_from_paths(&paths, resolver.as_ref())
                    };
                    match outcome {
                        Ok(loaded) => {
                            broadcaster.broadcast("base", "newDomains", None);
                            responder.resolve(json!(loaded));
                        }
                        Err(err) => {
                            error!("module load failed: {}", err);
                            responder.reject(HandlerError::from_error(&err));
                        }
                    }
                });
            }),
            "Load domain modules by path, registering their commands and events",
            vec![ArgSpec::new("paths", "array<string>")
                .with_description("Module paths to resolve and initialize")],
            vec![ArgSpec::new("success", "boolean")],
        )?;

        let restart_tx = self.maintenance_tx.clone();
        registry.register_command(
            "base",
            "restartHost",
            Handler::sync(move |_parameters| {
                info!("restart requested by client");
                if restart_tx.send(MaintenanceRequest::Restart).is_err() {
                    warn!("no maintenance listener, restart request dropped");
                }
                Ok(json!(null).into())
            }),
            "Request a controlled restart of the host process",
            vec![],
            vec![],
        )?;

        registry.register_event(
            "base",
            "newDomains",
            vec![],
        );
        registry.register_event(
            "base",
            "log",
            vec![
                ArgSpec::new("level", "string"),
                ArgSpec::new("timestamp", "string"),
                ArgSpec::new("message", "string"),
            ],
        );

        Ok(())
    }
}

/// Broadcast a `base.log` event to every connected client. Used for host
/// diagnostics that predate any other domain's event surface.
pub fn broadcast_log(broadcaster: &Broadcaster, level: &str, message: &str) {
    let timestamp = chrono::Utc::now().to_rfc3339();
    broadcaster.broadcast(
        "base",
        "log",
        Some(vec![json!(level), json!(timestamp), json!(message)]),
    );
}

fn module_paths(parameters: &[Value]) -> Result<Vec<String>, HandlerError> {
    let Some(first) = parameters.first() else {
        return Err(HandlerError::new("expected a paths array parameter"));
    };
    serde_json::from_value(first.clone())
        .map_err(|_| HandlerError::new("expected a paths array parameter"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::{CommandResult, StaticModuleResolver};

    fn base_setup() -> (
        Arc<RwLock<DomainRegistry>>,
        mpsc::UnboundedReceiver<MaintenanceRequest>,
    ) {
        let registry = Arc::new(RwLock::new(DomainRegistry::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        let base = BaseDomain::new(
            Arc::clone(&registry),
            Arc::new(StaticModuleResolver::new()),
            Broadcaster::new(),
            tx,
        );
        {
            let mut guard = registry.try_write().expect("unshared lock");
            base.init(&mut guard).unwrap();
        }
        (registry, rx)
    }

    #[tokio::test]
    async fn test_base_domain_surface() {
        let (registry, _rx) = base_setup();
        let registry = registry.read().await;
        assert!(registry.has_domain("base"));
        let descriptions = registry.domain_descriptions();
        let base = &descriptions["base"];
        assert!(base.commands.contains_key("loadDomainModulesFromPaths"));
        assert!(base.commands.contains_key("restartHost"));
        assert!(base.events.contains_key("newDomains"));
        assert!(base.events.contains_key("log"));
    }

    #[tokio::test]
    async fn test_restart_command_signals_maintenance_channel() {
        let (registry, mut rx) = base_setup();
        let handler = {
            let registry = registry.read().await;
            registry.command_handler("base", "restartHost").unwrap()
        };
        let Handler::Sync(f) = handler else {
            panic!("restartHost is synchronous");
        };
        let result = f(&[]).unwrap();
        assert!(matches!(result, CommandResult::Json(Value::Null)));
        assert_eq!(rx.try_recv().unwrap(), MaintenanceRequest::Restart);
    }

    #[test]
    fn test_module_paths_rejects_non_array() {
        assert!(module_paths(&[json!(42)]).is_err());
        assert!(module_paths(&[]).is_err());
        assert_eq!(
            module_paths(&[json!(["/ext/a", "/ext/b"])]).unwrap(),
            vec!["/ext/a".to_string(), "/ext/b".to_string()]
        );
    }
}
