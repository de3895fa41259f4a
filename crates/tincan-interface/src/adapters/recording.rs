//! In-memory control channel that records every datagram.
//!
//! Enable with the `test-utils` feature flag.
//!
//! # Example
//!
//! ```rust,ignore
//! use tincan_interface::adapters::RecordingChannel;
//! use tincan_interface::ports::ControlChannel;
//!
//! let channel = RecordingChannel::new();
//! channel.send(br#"{"IPOP":{}}"#).unwrap();
//! assert_eq!(channel.len(), 1);
//! ```

use crate::domain::TincanError;
use crate::ports::ControlChannel;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<Vec<u8>>>,
    failing: AtomicBool,
}

impl RecordingChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail with a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn datagrams(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    /// Recorded datagrams parsed as JSON. Undecodable ones become `Null`.
    #[must_use]
    pub fn envelopes(&self) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .map(|d| serde_json::from_slice(d).unwrap_or(Value::Null))
            .collect()
    }

    /// `Request.Command` of each recorded envelope.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.envelopes()
            .iter()
            .map(|e| e["IPOP"]["Request"]["Command"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl ControlChannel for RecordingChannel {
    fn send(&self, datagram: &[u8]) -> Result<(), TincanError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TincanError::Transport(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "recording channel set to fail",
            )));
        }
        self.sent.lock().push(datagram.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_order() {
        let channel = RecordingChannel::new();
        channel.send(br#"{"IPOP":{"Request":{"Command":"A"}}}"#).unwrap();
        channel.send(br#"{"IPOP":{"Request":{"Command":"B"}}}"#).unwrap();
        assert_eq!(channel.commands(), vec!["A", "B"]);
    }

    #[test]
    fn test_failing_channel_records_nothing() {
        let channel = RecordingChannel::new();
        channel.set_failing(true);
        assert!(matches!(channel.send(b"x"), Err(TincanError::Transport(_))));
        assert!(channel.is_empty());
    }
}
