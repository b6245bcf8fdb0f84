//! Admission permits handed out by a [`PermitBroker`](crate::broker::PermitBroker).

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

/// Identifier of a permit within its broker.
///
/// Ids are monotonic per broker and never reused: when a permit is returned
/// or reclaimed, its replacement is minted under a fresh id. This closes the
/// race where a stale reference to an old permit could double-credit the
/// broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PermitId(pub(crate) u64);

impl fmt::Display for PermitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single-use admission token.
///
/// Possession entitles the holder to run one worker against one database.
/// [`release`](Permit::release) hands the permit back to its broker; calling
/// it more than once is harmless. A permit that is dropped without release is
/// eventually reclaimed by the broker's sweep, so buggy holders cannot
/// permanently shrink capacity.
pub struct Permit {
    id: PermitId,
    released: AtomicBool,
    returns: mpsc::UnboundedSender<PermitId>,
}

impl Permit {
    pub(crate) fn new(id: PermitId, returns: mpsc::UnboundedSender<PermitId>) -> Self {
        Self {
            id,
            released: AtomicBool::new(false),
            returns,
        }
    }

    /// The id this permit was minted under.
    pub fn id(&self) -> PermitId {
        self.id
    }

    /// Returns the permit to its broker.
    ///
    /// The first call enqueues the permit id on the broker's return channel;
    /// subsequent calls are no-ops. Releasing after the broker has closed is
    /// also a no-op.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            // Send failure means the broker task is gone; nothing to credit.
            let _ = self.returns.send(self.id);
        }
    }

    /// Whether [`release`](Permit::release) has already been called.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit")
            .field("id", &self.id)
            .field("released", &self.is_released())
            .finish()
    }
}
