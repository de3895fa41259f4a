//! # Adapters
//!
//! Concrete implementations of the driven ports.
//!
//! - `UdpControlChannel` / `ControlSockets` - loopback UDP to the engine
//! - `TincanListener` - reply-socket reader task
//! - `RecordingChannel` - in-memory channel (requires `test-utils`)

pub mod udp;

#[cfg(any(test, feature = "test-utils"))]
pub mod recording;

pub use udp::{ControlSockets, TincanListener, UdpControlChannel};

#[cfg(any(test, feature = "test-utils"))]
pub use recording::RecordingChannel;
