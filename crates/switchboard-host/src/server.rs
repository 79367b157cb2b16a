//! Host lifecycle: startup sequence and maintenance handling.
//!
//! Startup is a sequence of fallible steps (acquire a port, start the
//! listener, load the `base` domain); the first failure aborts the rest
//! and surfaces to the caller, who never sees a half-started host.

use std::sync::Arc;

use switchboard_core::{Broadcaster, Dispatcher, DomainModule, DomainRegistry, ModuleResolver};
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::info;

use crate::base::{BaseDomain, MaintenanceRequest, broadcast_log};
use crate::error::Result;
use crate::net::{self, DEFAULT_PORT_START, DEFAULT_PORT_WINDOW};

pub struct HostConfig {
    pub port_start: u16,
    pub port_window: u16,
    /// Resolves the module paths clients pass to
    /// `base.loadDomainModulesFromPaths`.
    pub resolver: Arc<dyn ModuleResolver>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            port_start: DEFAULT_PORT_START,
            port_window: DEFAULT_PORT_WINDOW,
            resolver: Arc::new(switchboard_core::StaticModuleResolver::new()),
        }
    }
}

/// A running host: listener bound, `base` domain loaded, clients welcome.
pub struct Host {
    port: u16,
    dispatcher: Dispatcher,
    broadcaster: Broadcaster,
    maintenance_rx: mpsc::UnboundedReceiver<MaintenanceRequest>,
    listener_task: JoinHandle<()>,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl Host {
    /// Run the startup sequence. On success the returned host is fully
    /// ready; the bound port is the only externally visible side effect.
    ///
    /// # Errors
    ///
    /// Fails when no port in the window is free or the `base` domain
    /// cannot register.
    pub async fn start(config: HostConfig) -> Result<Self> {
        let (listener, port) = net::bind_free_port(config.port_start, config.port_window).await?;

        let registry = Arc::new(RwLock::new(DomainRegistry::new()));
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let broadcaster = Broadcaster::new();
        let (maintenance_tx, maintenance_rx) = mpsc::unbounded_channel();

        let listener_task = tokio::spawn(net::run_listener(
            listener,
            dispatcher.clone(),
            broadcaster.clone(),
        ));

        let base = BaseDomain::new(
            Arc::clone(&registry),
            config.resolver,
            broadcaster.clone(),
            maintenance_tx,
        );
        {
            let mut guard = registry.write().await;
            if let Err(err) = base.init(&mut guard) {
                drop(guard);
                listener_task.abort();
                return Err(err.into());
            }
        }

        info!("host listening on 127.0.0.1:{}", port);
        broadcast_log(&broadcaster, "info", &format!("host ready on port {port}"));

        Ok(Self {
            port,
            dispatcher,
            broadcaster,
            maintenance_rx,
            listener_task,
        })
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Wait for the next client-initiated maintenance request. Returns
    /// `None` if the `base` domain was torn down.
    pub async fn wait_maintenance(&mut self) -> Option<MaintenanceRequest> {
        self.maintenance_rx.recv().await
    }

    /// Stop accepting connections and drop the listener.
    pub fn shutdown(self) {
        self.listener_task.abort();
        info!("host on port {} stopped", self.port);
    }
}
