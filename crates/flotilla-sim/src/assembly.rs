use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, info, warn};

use flotilla_core::{RegistryError, ShipId, ShipRecord, ShipRegistry};

use crate::world::{ShipBody, ShipWorld, StructureSurvey};

/// Per-candidate guard ensuring at most one handoff is queued at a time.
///
/// A candidate claims the guard before launching background assembly and the
/// guard releases only when the handoff executes or is dropped, so a
/// candidate can never have two continuations in the channel.
#[derive(Debug, Clone, Default)]
pub struct AssemblyGuard(Arc<AtomicBool>);

impl AssemblyGuard {
    /// Create a released guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard. Returns `false` when a handoff is already in flight.
    pub fn try_begin(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the guard; the candidate may attempt assembly again.
    pub fn finish(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Whether a handoff is currently queued or executing.
    pub fn in_flight(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A fully-built ship waiting to be committed on the authoritative thread.
///
/// Dropping a `PendingShip` releases its guard, so a handoff discarded
/// anywhere (failed re-validation, a closed channel, a dropped queue)
/// frees its candidate to retry on a later tick.
#[derive(Debug)]
pub struct PendingShip {
    body: ShipBody,
    record: ShipRecord,
    guard: AssemblyGuard,
}

impl PendingShip {
    /// Package a built body for handoff; the registry record is derived from
    /// the body's current state.
    pub fn new(body: ShipBody, guard: AssemblyGuard) -> Self {
        let record = body.to_record();
        Self {
            body,
            record,
            guard,
        }
    }

    /// Identity of the ship being handed off.
    pub fn id(&self) -> ShipId {
        self.record.id()
    }
}

impl Drop for PendingShip {
    fn drop(&mut self) {
        self.guard.finish();
    }
}

/// Worker-side sender half of the construction channel. Submitting is
/// fire-and-forget and never blocks.
#[derive(Debug, Clone)]
pub struct AssemblyProducer {
    tx: Sender<PendingShip>,
}

impl AssemblyProducer {
    /// Enqueue a handoff for the authoritative thread's next drain.
    pub fn submit(&self, pending: PendingShip) {
        let id = pending.id();
        if self.tx.send(pending).is_err() {
            // Consumer is gone (world unloading); the returned value's drop
            // releases the guard.
            info!(%id, "assembly handoff after channel close, discarded");
        }
    }
}

/// What a single drain pass did.
#[derive(Debug, Default)]
pub struct DrainSummary {
    /// Ships registered and spawned this pass.
    pub applied: Vec<ShipId>,
    /// Handoffs dropped: preconditions no longer held or registration
    /// failed. Dropping is an expected race, not an error.
    pub dropped: Vec<ShipId>,
}

impl DrainSummary {
    /// Whether the pass did nothing.
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty() && self.dropped.is_empty()
    }
}

/// The tick-synchronized construction channel.
///
/// Worker threads build ships and enqueue them through cloned
/// [`AssemblyProducer`] handles; the authoritative thread drains the queue
/// between ticks and is the only place registration happens. This is the one
/// sanctioned path for a worker to cause a registry or world mutation.
#[derive(Debug)]
pub struct AssemblyChannel {
    tx: Sender<PendingShip>,
    rx: Receiver<PendingShip>,
}

impl Default for AssemblyChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl AssemblyChannel {
    /// Create an empty channel.
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// A producer handle for a worker thread.
    pub fn producer(&self) -> AssemblyProducer {
        AssemblyProducer {
            tx: self.tx.clone(),
        }
    }

    /// Number of handoffs currently queued.
    pub fn queued(&self) -> usize {
        self.rx.len()
    }

    /// Drain every queued handoff without blocking.
    ///
    /// For each one, preconditions are re-validated against the current
    /// world (it may have changed since the worker built the ship), then
    /// registry insert and world spawn are applied as one unit. A
    /// handoff that fails re-validation is dropped silently; the candidate
    /// simply re-attempts on a later tick. Failures never propagate out of
    /// the drain.
    pub fn drain(
        &self,
        registry: &ShipRegistry,
        world: &mut dyn ShipWorld,
        survey: &dyn StructureSurvey,
    ) -> DrainSummary {
        let mut summary = DrainSummary::default();
        while let Ok(pending) = self.rx.try_recv() {
            let id = pending.id();
            if !survey.assembly_legal(pending.body.claim.center()) {
                info!(%id, "assembly dropped, structure no longer valid");
                summary.dropped.push(id);
                continue;
            }
            match registry.insert(pending.record.clone()) {
                Ok(()) => {
                    world.spawn(pending.body.clone());
                    debug!(%id, "ship assembled and spawned");
                    summary.applied.push(id);
                }
                Err(RegistryError::CellConflict { cell, owner }) => {
                    info!(%id, %cell, %owner, "assembly dropped, claim contested");
                    summary.dropped.push(id);
                }
                Err(err) => {
                    warn!(%id, %err, "ship registration failed, candidate not assembled");
                    summary.dropped.push(id);
                }
            }
        }
        summary
    }
}
