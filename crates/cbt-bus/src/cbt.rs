//! # Control Block Transfer Envelope
//!
//! The unit of work exchanged between controller modules.

use crate::payload::CbtPayload;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Well-known module names used as CBT initiators and recipients.
pub mod modules {
    /// Drives the tunnel engine over the local control channel.
    pub const TINCAN_INTERFACE: &str = "TincanInterface";
    /// Resolves virtual IPs to peer MAC addresses.
    pub const ARP_CACHE: &str = "ArpCache";
    /// Floods broadcast frames and control data to overlay peers.
    pub const BROADCAST_FORWARDER: &str = "BroadcastForwarder";
    /// Owns the overlay topology and peer links.
    pub const TOPOLOGY_MANAGER: &str = "BaseTopologyManager";
    /// Manages per-peer link setup.
    pub const LINK_MANAGER: &str = "LinkManager";
}

/// Name under which a module's inbox is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleName(String);

impl ModuleName {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ModuleName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&ModuleName> for ModuleName {
    fn from(name: &ModuleName) -> Self {
        name.clone()
    }
}

impl PartialEq<str> for ModuleName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ModuleName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A Control Block Transfer.
///
/// The recipient owns the CBT once it is delivered. The `initiator` is kept so
/// replies can be routed back without the recipient knowing anything about the
/// sender's internals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cbt {
    /// Unique id of this transfer.
    pub uid: Uuid,
    /// Module that created the CBT.
    pub initiator: ModuleName,
    /// Module whose inbox receives the CBT.
    pub recipient: ModuleName,
    /// Action tag. Defaults to the payload's action name; subscriptions
    /// replace it with their topic name.
    pub action: String,
    /// Typed payload.
    pub data: CbtPayload,
    /// Optional correlation / transaction id.
    pub transaction_id: Option<u64>,
}

impl Cbt {
    /// Create a CBT whose action tag is derived from the payload.
    #[must_use]
    pub fn new(
        initiator: impl Into<ModuleName>,
        recipient: impl Into<ModuleName>,
        data: CbtPayload,
    ) -> Self {
        Self {
            uid: Uuid::new_v4(),
            initiator: initiator.into(),
            recipient: recipient.into(),
            action: data.action().to_string(),
            data,
            transaction_id: None,
        }
    }

    /// Override the action tag.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    #[must_use]
    pub fn with_transaction_id(mut self, transaction_id: u64) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::LinkQuery;

    #[test]
    fn test_action_derived_from_payload() {
        let cbt = Cbt::new(
            modules::LINK_MANAGER,
            modules::TINCAN_INTERFACE,
            CbtPayload::GetState(LinkQuery::default()),
        );
        assert_eq!(cbt.action, "DO_GET_STATE");
        assert_eq!(cbt.initiator, "LinkManager");
        assert!(cbt.transaction_id.is_none());
    }

    #[test]
    fn test_action_override_keeps_payload() {
        let cbt = Cbt::new("Owner", "Sink", CbtPayload::Echo { interface_name: None })
            .with_action("peer_updates")
            .with_transaction_id(7);
        assert_eq!(cbt.action, "peer_updates");
        assert_eq!(cbt.transaction_id, Some(7));
        assert!(matches!(cbt.data, CbtPayload::Echo { .. }));
    }

    #[test]
    fn test_each_cbt_gets_unique_uid() {
        let a = Cbt::new("A", "B", CbtPayload::Echo { interface_name: None });
        let b = Cbt::new("A", "B", CbtPayload::Echo { interface_name: None });
        assert_ne!(a.uid, b.uid);
    }
}
