//! # Controller Runtime
//!
//! Ties the module container to the registry and runs the startup and
//! shutdown sequences.
//!
//! ## Startup Sequence
//!
//! 1. Bind the control sockets and build the modules
//! 2. Register every module (creates all inboxes)
//! 3. Initialize modules in order; the tunnel interface starts its listener
//!    and configures the engine
//! 4. Report registry status

use std::sync::Arc;

use cbt_bus::{CbtRegistry, ControllerModule, ModuleError};
use thiserror::Error;
use tincan_interface::{CtrlEndpoint, TincanError};
use tracing::{error, info};

use crate::container::{ControllerConfig, ModuleContainer};
use crate::registry::ModuleRegistry;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Tincan(#[from] TincanError),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error("{} module(s) failed to start: {}", .0.len(), join(.0))]
    Startup(Vec<ModuleError>),
}

fn join(errors: &[ModuleError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// The running controller.
pub struct ControllerRuntime {
    container: ModuleContainer,
    registry: ModuleRegistry,
}

impl ControllerRuntime {
    /// Build and register every module.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Tincan` if the control sockets cannot be bound.
    pub fn new(config: ControllerConfig) -> Result<Self, RuntimeError> {
        info!("Creating overlay controller runtime");
        let registry = ModuleRegistry::new(config.runtime.clone());
        let container = ModuleContainer::new(config, registry.cbt_registry())?;

        for module in container.modules() {
            registry.register(module)?;
        }

        Ok(Self {
            container,
            registry,
        })
    }

    /// Register an additional module before `start`.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError` if the name is taken.
    pub fn register(&self, module: Arc<dyn ControllerModule>) -> Result<(), RuntimeError> {
        self.registry.register(module)?;
        Ok(())
    }

    /// Start every module.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Startup` listing each module that failed to
    /// initialize. Modules that did start keep running.
    pub async fn start(&self) -> Result<(), RuntimeError> {
        info!("===========================================");
        info!("  Overlay Controller v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");

        let result = self.registry.start_all().await;
        self.registry.print_status();

        let endpoint = self.container.ctrl_endpoint();
        info!("Control endpoint: {}:{}", endpoint.ip, endpoint.port);
        info!("Overlays configured: {}", self.container.config.tincan.vnets.len());

        result.map_err(RuntimeError::Startup)
    }

    /// Stop every module.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");
        if let Err(errors) = self.registry.stop_all().await {
            for e in errors {
                error!(error = %e, "Module shutdown failed");
            }
        }
        self.registry.print_status();
        info!("Shutdown complete");
    }

    #[must_use]
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    #[must_use]
    pub fn cbt_registry(&self) -> Arc<CbtRegistry> {
        self.registry.cbt_registry()
    }

    /// Address the engine must send replies to.
    #[must_use]
    pub fn ctrl_endpoint(&self) -> CtrlEndpoint {
        self.container.ctrl_endpoint()
    }

    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.container.config
    }
}
