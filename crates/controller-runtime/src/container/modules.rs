//! # Module Instances
//!
//! Builds every controller module from the loaded configuration. Modules are
//! returned in start order; the tunnel interface comes first so the reverse
//! control link is requested before any other module issues a command.

use std::sync::Arc;

use cbt_bus::{CbtRegistry, ControllerModule};
use tincan_interface::{CtrlEndpoint, TincanError, TincanInterface};
use tracing::info;

use crate::container::config::ControllerConfig;

/// Holds the module instances owned by the controller.
pub struct ModuleContainer {
    pub config: ControllerConfig,
    tincan: Arc<TincanInterface>,
}

impl ModuleContainer {
    /// Bind the control sockets and build all modules.
    ///
    /// # Errors
    ///
    /// Returns `TincanError::Bind` if the control sockets cannot be bound.
    pub fn new(config: ControllerConfig, registry: Arc<CbtRegistry>) -> Result<Self, TincanError> {
        let tincan = TincanInterface::bind(
            registry,
            config.tincan.clone(),
            config.logger.engine_logging(),
        )?;
        info!(endpoint = ?tincan.endpoint(), "Tincan interface created");

        Ok(Self {
            config,
            tincan: Arc::new(tincan),
        })
    }

    /// Address the engine sends its replies to.
    #[must_use]
    pub fn ctrl_endpoint(&self) -> CtrlEndpoint {
        self.tincan.endpoint()
    }

    /// Every module, in start order.
    #[must_use]
    pub fn modules(&self) -> Vec<Arc<dyn ControllerModule>> {
        vec![Arc::clone(&self.tincan) as Arc<dyn ControllerModule>]
    }
}
