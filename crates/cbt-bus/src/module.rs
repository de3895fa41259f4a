//! # Controller Module Trait
//!
//! The contract every controller module implements to receive CBTs.
//!
//! ## Example Implementation
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use cbt_bus::{Cbt, ControllerModule, ModuleContext, ModuleError, ModuleName};
//!
//! pub struct Echo { name: ModuleName }
//!
//! #[async_trait]
//! impl ControllerModule for Echo {
//!     fn name(&self) -> &ModuleName { &self.name }
//!     async fn initialize(&self, _ctx: &ModuleContext) -> Result<(), ModuleError> { Ok(()) }
//!     async fn process_cbt(&self, cbt: Cbt) { tracing::info!(action = %cbt.action, "got CBT"); }
//! }
//! ```

use crate::cbt::{Cbt, ModuleName};
use crate::registry::CbtRegistry;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Shared services handed to a module while it initializes.
#[derive(Clone)]
pub struct ModuleContext {
    /// Routing table for emitting CBTs.
    pub registry: Arc<CbtRegistry>,
    /// Flips to `true` when the controller shuts down.
    pub shutdown: watch::Receiver<bool>,
}

impl ModuleContext {
    #[must_use]
    pub fn new(registry: Arc<CbtRegistry>, shutdown: watch::Receiver<bool>) -> Self {
        Self { registry, shutdown }
    }
}

/// Module lifecycle failures.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("[{module}] initialization failed: {message}")]
    Initialization { module: ModuleName, message: String },

    #[error("[{module}] runtime error: {message}")]
    Runtime { module: ModuleName, message: String },

    #[error("[{module}] shutdown failed: {message}")]
    Shutdown { module: ModuleName, message: String },
}

impl ModuleError {
    /// The module that failed.
    #[must_use]
    pub fn module(&self) -> &ModuleName {
        match self {
            Self::Initialization { module, .. }
            | Self::Runtime { module, .. }
            | Self::Shutdown { module, .. } => module,
        }
    }
}

/// A controller module.
///
/// The runtime registers an inbox for each module under `name()`, calls
/// `initialize` once, then calls `process_cbt` for every delivered CBT in
/// arrival order.
#[async_trait]
pub trait ControllerModule: Send + Sync {
    /// Name the module's inbox is registered under.
    fn name(&self) -> &ModuleName;

    /// One-time startup. An error aborts the module.
    async fn initialize(&self, ctx: &ModuleContext) -> Result<(), ModuleError>;

    /// Handle one CBT. Must not fail; errors are logged by the module.
    async fn process_cbt(&self, cbt: Cbt);

    /// Periodic hook.
    async fn timer_method(&self) {}

    /// Release resources before the controller exits.
    async fn terminate(&self) -> Result<(), ModuleError> {
        Ok(())
    }
}
