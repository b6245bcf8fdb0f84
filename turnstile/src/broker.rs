//! Per-database counting-semaphore broker with abandoned-permit recovery.
//!
//! A [`PermitBroker`] holds up to N outstanding [`Permit`]s and hands them to
//! waiters in request order. All mutable state is confined to a dedicated
//! broker task; acquires and releases reach it over channels, so no state is
//! ever iterated while being mutated.
//!
//! The broker keeps a weak reference to every permit it has issued. When the
//! free set runs empty while acquirers are waiting, it sweeps the live set:
//! any permit whose holder dropped it without calling
//! [`release`](Permit::release) is reclaimed and replaced under a fresh id.
//! Buggy callers therefore cannot permanently shrink capacity.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::BrokerClosed;
use crate::permit::{Permit, PermitId};

/// Retry cadence for the reclamation sweep while acquirers are starved.
const SWEEP_RETRY_INTERVAL: Duration = Duration::from_millis(100);

struct BrokerShared {
    capacity: usize,
    acquires: mpsc::UnboundedSender<oneshot::Sender<Arc<Permit>>>,
    shutdown: CancellationToken,
    available: AtomicUsize,
}

/// Handle to a per-database permit broker.
///
/// Cheap to clone; all clones drive the same broker task. The broker task
/// exits when [`close`](PermitBroker::close) is called or every handle is
/// dropped.
#[derive(Clone)]
pub struct PermitBroker {
    shared: Arc<BrokerShared>,
}

impl PermitBroker {
    /// Creates a broker with `capacity` pre-minted permits and spawns its
    /// task on the current Tokio runtime.
    ///
    /// A capacity of zero is permitted: every acquire then waits until the
    /// caller gives up or the broker is closed.
    pub fn new(capacity: usize) -> Self {
        let (acquire_tx, acquire_rx) = mpsc::unbounded_channel();
        let (return_tx, return_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let shared = Arc::new(BrokerShared {
            capacity,
            acquires: acquire_tx,
            shutdown: shutdown.clone(),
            available: AtomicUsize::new(capacity),
        });

        let mut state = BrokerState {
            free: VecDeque::with_capacity(capacity),
            live: HashMap::with_capacity(capacity),
            waiters: VecDeque::new(),
            next_id: 0,
            return_tx,
            shared: Arc::downgrade(&shared),
        };
        for _ in 0..capacity {
            state.mint();
        }

        tokio::spawn(run(state, acquire_rx, return_rx, shutdown));

        Self { shared }
    }

    /// Waits for a permit and transfers ownership to the caller.
    ///
    /// Serving order is request order. Abandoning the returned future before
    /// it resolves consumes no permit. Fails with [`BrokerClosed`] once
    /// [`close`](PermitBroker::close) has been called.
    pub async fn acquire(&self) -> Result<Arc<Permit>, BrokerClosed> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.shared
            .acquires
            .send(reply_tx)
            .map_err(|_| BrokerClosed)?;
        reply_rx.await.map_err(|_| BrokerClosed)
    }

    /// Signals the broker task to drop pending waiters and exit.
    ///
    /// Subsequent acquires fail with [`BrokerClosed`]. Permits already handed
    /// out remain valid for their holders; releasing them afterwards is a
    /// silent no-op.
    pub fn close(&self) {
        self.shared.shutdown.cancel();
    }

    /// Whether [`close`](PermitBroker::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// The fixed capacity this broker was created with.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Number of permits currently sitting in the free set.
    ///
    /// Maintained by the broker task after each state change; intended for
    /// observability and tests, not for admission decisions.
    pub fn available_permits(&self) -> usize {
        self.shared.available.load(Ordering::Relaxed)
    }
}

impl PartialEq for PermitBroker {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for PermitBroker {}

impl std::fmt::Debug for PermitBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermitBroker")
            .field("capacity", &self.shared.capacity)
            .field("available", &self.available_permits())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// State owned exclusively by the broker task.
struct BrokerState {
    free: VecDeque<Arc<Permit>>,
    live: HashMap<PermitId, Weak<Permit>>,
    waiters: VecDeque<oneshot::Sender<Arc<Permit>>>,
    next_id: u64,
    return_tx: mpsc::UnboundedSender<PermitId>,
    shared: Weak<BrokerShared>,
}

impl BrokerState {
    /// Registers a fresh permit in the live set and pushes it to the free set.
    fn mint(&mut self) {
        self.next_id += 1;
        let id = PermitId(self.next_id);
        let permit = Arc::new(Permit::new(id, self.return_tx.clone()));
        self.live.insert(id, Arc::downgrade(&permit));
        self.free.push_back(permit);
    }

    /// Handles a release arriving on the return channel.
    ///
    /// A fresh permit is minted in place of the returned one; ids of permits
    /// already reclaimed by a sweep are ignored, so a late release can never
    /// double-credit the broker.
    fn credit(&mut self, id: PermitId) {
        if self.live.remove(&id).is_some() {
            trace!(permit = %id, "permit returned");
            self.mint();
        } else {
            debug!(permit = %id, "ignoring release of a reclaimed permit");
        }
    }

    /// Reclaims permits whose holders were dropped without release.
    ///
    /// Returns the number of permits recovered.
    fn sweep(&mut self) -> usize {
        let reclaimed: Vec<PermitId> = self
            .live
            .iter()
            .filter(|(_, holder)| holder.strong_count() == 0)
            .map(|(id, _)| *id)
            .collect();
        for id in &reclaimed {
            self.live.remove(id);
            warn!(permit = %id, "permit holder dropped without release; minting replacement");
            self.mint();
        }
        reclaimed.len()
    }

    /// Hands free permits to pending waiters, sweeping when starved.
    fn pump(&mut self) {
        while !self.waiters.is_empty() {
            if self.free.is_empty() && self.sweep() == 0 {
                break;
            }
            let Some(mut permit) = self.free.pop_front() else {
                break;
            };
            let mut handed_out = false;
            while let Some(reply) = self.waiters.pop_front() {
                match reply.send(permit.clone()) {
                    Ok(()) => {
                        handed_out = true;
                        break;
                    }
                    // The waiter abandoned its acquire; the permit stays ours.
                    Err(returned) => permit = returned,
                }
            }
            if !handed_out {
                self.free.push_front(permit);
            }
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.available.store(self.free.len(), Ordering::Relaxed);
        }
    }

    /// Whether waiters are pending with nothing left to hand out.
    fn starved(&self) -> bool {
        !self.waiters.is_empty() && self.free.is_empty()
    }
}

async fn run(
    mut state: BrokerState,
    mut acquire_rx: mpsc::UnboundedReceiver<oneshot::Sender<Arc<Permit>>>,
    mut return_rx: mpsc::UnboundedReceiver<PermitId>,
    shutdown: CancellationToken,
) {
    loop {
        state.pump();
        let starved = state.starved();
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            request = acquire_rx.recv() => match request {
                Some(reply) => state.waiters.push_back(reply),
                // Every broker handle is gone; nobody can acquire anymore.
                None => break,
            },
            Some(id) = return_rx.recv() => state.credit(id),
            // Holders may vanish without producing any channel event, so a
            // starved broker re-sweeps on a timer until a permit turns up.
            _ = tokio::time::sleep(SWEEP_RETRY_INTERVAL), if starved => {}
        }
    }
    debug!(waiters = state.waiters.len(), "permit broker shut down");
    // Dropping the queued reply senders fails their acquires with BrokerClosed.
}
