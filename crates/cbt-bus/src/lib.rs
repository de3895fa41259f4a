//! # CBT Bus - Inter-Module Message Routing
//!
//! Every controller module talks to every other module through Control Block
//! Transfers (CBTs). A CBT names its initiator and recipient, carries an action
//! tag and a typed payload, and is consumed exactly once by the recipient.
//!
//! ## Routing
//!
//! ```text
//! ┌──────────────┐  register_cbt()   ┌──────────────┐   inbox (bounded)   ┌──────────────┐
//! │  Module A    │ ────────────────→ │ CbtRegistry  │ ──────────────────→ │  Module B    │
//! └──────────────┘                   └──────────────┘                     └──────────────┘
//!        │                                   ▲
//!        │ post_update()                     │ one CBT per subscriber
//!        ▼                                   │
//! ┌──────────────┐                           │
//! │CfxSubscription│ ─────────────────────────┘
//! └──────────────┘
//! ```
//!
//! - Unknown recipients are logged and dropped, never fatal.
//! - A full inbox never blocks the sender; the CBT is dropped with a warning.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod cbt;
pub mod module;
pub mod payload;
pub mod registry;
pub mod subscription;

pub use cbt::{modules, Cbt, ModuleName};
pub use module::{ControllerModule, ModuleContext, ModuleError};
pub use payload::{
    CasDetails, CbtPayload, ConnectionResponse, DataPacket, ForwardingRuleRemoval,
    ForwardingRules, FrameClass, FrameOrigin, IccRequest, LinkQuery, LinkRequest, LocalState,
    OverlayFrame, OverlayMessage, PeerDescriptor, PeerState, TincanResponse,
};
pub use registry::{CbtInbox, CbtRegistry, DispatchError};
pub use subscription::CfxSubscription;

/// Maximum CBTs buffered per module inbox before new deliveries are dropped.
pub const DEFAULT_INBOX_CAPACITY: usize = 1000;
