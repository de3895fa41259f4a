//! # CBT Registry
//!
//! Maps module names to the inbox capability that accepts their CBTs.

use crate::cbt::{Cbt, ModuleName};
use crate::payload::CbtPayload;
use crate::DEFAULT_INBOX_CAPACITY;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Errors from routing a CBT.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No inbox is registered under the recipient name.
    #[error("No module registered as {recipient}")]
    UnknownRecipient { recipient: ModuleName },

    /// The recipient's inbox is at capacity.
    #[error("Inbox of {recipient} is full")]
    InboxFull { recipient: ModuleName },

    /// The recipient stopped reading its inbox.
    #[error("Inbox of {recipient} is closed")]
    InboxClosed { recipient: ModuleName },
}

/// Anything that can accept a CBT delivery.
pub trait CbtInbox: Send + Sync {
    /// Hand a CBT to the module. Must not block.
    fn deliver(&self, cbt: Cbt) -> Result<(), DispatchError>;
}

impl CbtInbox for mpsc::Sender<Cbt> {
    fn deliver(&self, cbt: Cbt) -> Result<(), DispatchError> {
        self.try_send(cbt).map_err(|e| match e {
            mpsc::error::TrySendError::Full(cbt) => DispatchError::InboxFull {
                recipient: cbt.recipient,
            },
            mpsc::error::TrySendError::Closed(cbt) => DispatchError::InboxClosed {
                recipient: cbt.recipient,
            },
        })
    }
}

/// Routing table from module name to inbox.
pub struct CbtRegistry {
    inboxes: RwLock<HashMap<ModuleName, Arc<dyn CbtInbox>>>,
    cbts_routed: AtomicU64,
    capacity: usize,
}

impl CbtRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INBOX_CAPACITY)
    }

    /// Create a registry whose module inboxes hold `capacity` CBTs.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inboxes: RwLock::new(HashMap::new()),
            cbts_routed: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Create a bounded inbox for `name` and return its receiving end.
    ///
    /// Registering a name twice replaces the previous inbox.
    pub fn register_module(&self, name: impl Into<ModuleName>) -> mpsc::Receiver<Cbt> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.register_inbox(name, Arc::new(sender));
        receiver
    }

    /// Register an arbitrary inbox implementation under `name`.
    pub fn register_inbox(&self, name: impl Into<ModuleName>, inbox: Arc<dyn CbtInbox>) {
        let name = name.into();
        debug!(module = %name, "Inbox registered");
        if self.inboxes.write().insert(name.clone(), inbox).is_some() {
            warn!(module = %name, "Replaced existing inbox");
        }
    }

    /// Remove the inbox registered under `name`.
    pub fn unregister(&self, name: &ModuleName) -> bool {
        self.inboxes.write().remove(name).is_some()
    }

    #[must_use]
    pub fn contains(&self, name: &ModuleName) -> bool {
        self.inboxes.read().contains_key(name)
    }

    /// Names of all registered modules, sorted.
    #[must_use]
    pub fn module_names(&self) -> Vec<ModuleName> {
        let mut names: Vec<_> = self.inboxes.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Route a CBT to its recipient.
    ///
    /// Failures are logged here; callers may ignore the result when the
    /// delivery is best-effort.
    pub fn submit(&self, cbt: Cbt) -> Result<(), DispatchError> {
        let inbox = self.inboxes.read().get(&cbt.recipient).cloned();
        let Some(inbox) = inbox else {
            warn!(
                recipient = %cbt.recipient,
                action = %cbt.action,
                initiator = %cbt.initiator,
                "CBT dropped (unknown recipient)"
            );
            return Err(DispatchError::UnknownRecipient {
                recipient: cbt.recipient,
            });
        };

        let recipient = cbt.recipient.clone();
        let action = cbt.action.clone();
        match inbox.deliver(cbt) {
            Ok(()) => {
                self.cbts_routed.fetch_add(1, Ordering::Relaxed);
                debug!(recipient = %recipient, action = %action, "CBT routed");
                Ok(())
            }
            Err(e) => {
                warn!(recipient = %recipient, action = %action, error = %e, "CBT dropped");
                Err(e)
            }
        }
    }

    /// Build and route a CBT in one step.
    pub fn register_cbt(
        &self,
        initiator: impl Into<ModuleName>,
        recipient: impl Into<ModuleName>,
        data: CbtPayload,
    ) -> Result<(), DispatchError> {
        self.submit(Cbt::new(initiator, recipient, data))
    }

    /// Total CBTs successfully handed to an inbox.
    #[must_use]
    pub fn cbts_routed(&self) -> u64 {
        self.cbts_routed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for CbtRegistry {
    fn default() -> Self {
        Self::new()
    }
}
