//! # Tincan Interface
//!
//! Control-plane client for the external tunnel engine. Requests and replies
//! are JSON objects, one per UDP datagram, exchanged over loopback.
//!
//! ## Architecture
//!
//! - **Domain:** configuration, EtherType classification, transaction ids
//! - **Protocol:** outbound request envelopes and inbound reply parsing
//! - **Ports:** the `ControlChannel` the client sends through
//! - **Service:** `TincanClient`, the response classifier and the
//!   `TincanInterface` controller module
//! - **Adapters:** UDP sockets and the listener task
//!
//! ## Flow
//!
//! ```text
//! DO_* CBT ──→ TincanInterface ──→ TincanClient ──→ UDP ──→ engine
//!                    ▲                                        │
//!   PROCESS_TINCAN_DATA                                       │
//!                    │                                        ▼
//!              TincanListener ←────────────── UDP ←───── reply / notification
//!                    │
//!                    └─→ classifier ──→ TINCAN_RESPONSE, ARPPacket, ... ──→ CbtRegistry
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod protocol;
pub mod service;

pub use domain::{
    classify_dataframe, local_uid, AddressFamily, CtrlEndpoint, EngineLogging, TincanConfig,
    TincanError, TransactionCounter, TurnConfig, VnetConfig,
};
pub use ports::ControlChannel;
pub use protocol::{RequestEnvelope, TincanRequest};
pub use service::{classify_datagram, Emission, ResponseDispatcher, TincanClient, TincanInterface};

pub use adapters::{ControlSockets, TincanListener, UdpControlChannel};

#[cfg(any(test, feature = "test-utils"))]
pub use adapters::RecordingChannel;
