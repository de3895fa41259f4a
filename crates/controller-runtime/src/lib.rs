//! # Overlay Controller Runtime
//!
//! Library side of the controller daemon; `main.rs` is the entry point.
//!
//! - `container/` - configuration and module construction
//! - `registry/` - module inboxes, tasks and lifecycle status
//! - `logging` - `tracing` subscriber setup
//! - `runtime` - startup and shutdown orchestration
//!
//! ## Message Flow
//!
//! ```text
//!  LinkManager ──CBT──→ [TincanInterface inbox] ──→ process_cbt ──UDP──→ engine
//!                                                                          │
//!  ArpCache ←──CBT── classifier ←── PROCESS_TINCAN_DATA ←── listener ←──UDP┘
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod container;
pub mod logging;
pub mod registry;
pub mod runtime;

pub use container::{ConfigError, ControllerConfig, LoggerConfig, ModuleContainer, RuntimeConfig};
pub use logging::{init_logging, LoggingError};
pub use registry::{ModuleRegistry, ModuleStatus};
pub use runtime::{ControllerRuntime, RuntimeError};
