//! Transaction id allocation for outbound requests.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic transaction id source.
///
/// Ids start at 0 and increase by one per allocated datagram with no gaps
/// and no reuse. The engine does not reliably echo them back, so replies are
/// routed by their `Initiator` field and the id serves as an audit counter.
#[derive(Debug, Default)]
pub struct TransactionCounter {
    next: AtomicU64,
}

impl TransactionCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Ids allocated so far.
    #[must_use]
    pub fn allocated(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}
