use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::claim::{CellKey, ChunkClaim};
use crate::error::{RegistryError, RegistryResult};
use crate::record::{ShipId, ShipPosition, ShipRecord, ShipStatus};

/// Live-world snapshot used to rebuild a desynced record, supplied by the
/// position-source collaborator.
#[derive(Debug, Clone)]
pub struct LiveShip {
    /// Current display name.
    pub name: String,
    /// Current position.
    pub position: ShipPosition,
    /// Current claim geometry.
    pub claim: ChunkClaim,
}

/// Collaborator that can answer "what does the live world currently know
/// about this ship?" during reconciliation.
pub trait LiveShipSource {
    /// The ship's live state, or `None` when the world no longer has it.
    fn live_ship(&self, id: ShipId) -> Option<LiveShip>;
}

/// Outcome of a [`ShipRegistry::reconcile`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// The record already had a position; nothing to repair.
    Intact,
    /// The record was rebuilt from live world state, id preserved.
    Repaired(ShipRecord),
    /// The ship could not be found in the live world (or its rebuilt claim
    /// now collides with another ship); the record was disposed of.
    UnknownLocation,
    /// No record with this id exists.
    NotFound,
}

/// The three lookup indexes, always mutated together under the write lock.
#[derive(Debug, Default)]
struct Indexes {
    by_id: HashMap<ShipId, ShipRecord>,
    by_name: HashMap<String, Vec<ShipId>>,
    by_cell: HashMap<CellKey, ShipId>,
}

impl Indexes {
    /// First ship (if any) whose claim would collide with `record`.
    fn cell_conflict(&self, record: &ShipRecord) -> Option<(CellKey, ShipId)> {
        record
            .owned_cells()
            .iter()
            .find_map(|cell| self.by_cell.get(cell).map(|owner| (*cell, *owner)))
    }

    /// Add `record` to all three indexes. Caller has already checked for
    /// duplicates and conflicts.
    fn link(&mut self, record: ShipRecord) {
        let id = record.id();
        for cell in record.owned_cells() {
            self.by_cell.insert(*cell, id);
        }
        self.by_name.entry(record.name().to_owned()).or_default().push(id);
        self.by_id.insert(id, record);
    }

    /// Remove `id` from all three indexes, returning the record it owned.
    fn unlink(&mut self, id: ShipId) -> Option<ShipRecord> {
        let record = self.by_id.remove(&id)?;
        for cell in record.owned_cells() {
            self.by_cell.remove(cell);
        }
        if let Some(ids) = self.by_name.get_mut(record.name()) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_name.remove(record.name());
            }
        }
        Some(record)
    }
}

/// The multi-attribute indexed store of all ship records for one world.
///
/// One instance exists per loaded world. Mutations (`insert`, `remove`,
/// `reconcile`) serialize through an internal write lock; reads run
/// concurrently under the read lock and always observe either the pre- or
/// post-state of a mutation, never a record present in one index and absent
/// from another.
#[derive(Debug, Default)]
pub struct ShipRegistry {
    inner: RwLock<Indexes>,
}

impl ShipRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Indexes> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Indexes> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a record to the identity, name, and per-cell indexes.
    ///
    /// All-or-nothing: on [`RegistryError::DuplicateId`] or
    /// [`RegistryError::CellConflict`] no index is touched.
    pub fn insert(&self, record: ShipRecord) -> RegistryResult<()> {
        let mut idx = self.write();
        if idx.by_id.contains_key(&record.id()) {
            return Err(RegistryError::DuplicateId(record.id()));
        }
        if let Some((cell, owner)) = idx.cell_conflict(&record) {
            return Err(RegistryError::CellConflict { cell, owner });
        }
        debug!(id = %record.id(), name = record.name(), cells = record.owned_cells().len(), "ship registered");
        idx.link(record);
        Ok(())
    }

    /// Remove a record and all its index entries atomically.
    ///
    /// Returns `false` when the id was not present; removing twice is a
    /// no-op, not an error.
    pub fn remove(&self, id: ShipId) -> bool {
        let removed = self.write().unlink(id).is_some();
        if removed {
            debug!(%id, "ship removed");
        }
        removed
    }

    /// Look up a record by id.
    pub fn get(&self, id: ShipId) -> Option<ShipRecord> {
        self.read().by_id.get(&id).cloned()
    }

    /// Whether a record with this id is registered.
    pub fn contains(&self, id: ShipId) -> bool {
        self.read().by_id.contains_key(&id)
    }

    /// Look up a record by display name.
    ///
    /// Names are not unique; when several ships share one, the earliest
    /// registered match is returned. Callers needing to disambiguate should
    /// walk [`ShipRegistry::all_records`] themselves.
    pub fn get_by_name(&self, name: &str) -> Option<ShipRecord> {
        let idx = self.read();
        let id = idx.by_name.get(name)?.first()?;
        idx.by_id.get(id).cloned()
    }

    /// The ship owning `cell`, if any.
    pub fn find_owner_of_cell(&self, cell: CellKey) -> Option<ShipRecord> {
        let idx = self.read();
        let id = idx.by_cell.get(&cell)?;
        idx.by_id.get(id).cloned()
    }

    /// Iterate over every record, snapshot-consistent at the moment this is
    /// called. Mutations made while iterating affect the registry, not the
    /// returned sequence.
    pub fn all_records(&self) -> impl Iterator<Item = ShipRecord> + use<> {
        let snapshot: Vec<ShipRecord> = self.read().by_id.values().cloned().collect();
        snapshot.into_iter()
    }

    /// Number of registered ships.
    pub fn len(&self) -> usize {
        self.read().by_id.len()
    }

    /// Whether the registry holds no ships.
    pub fn is_empty(&self) -> bool {
        self.read().by_id.is_empty()
    }

    /// Classify every ship for operator-facing listings.
    pub fn census(&self) -> Vec<(ShipRecord, ShipStatus)> {
        self.all_records()
            .map(|record| {
                let status = record.status();
                (record, status)
            })
            .collect()
    }

    /// Repair a record whose position is unknown.
    ///
    /// When the id is still findable in the live world, the record is
    /// replaced by one freshly derived from live state (same id, live name,
    /// position, and claim). Otherwise (including when the rebuilt claim
    /// would collide with another ship) the record is disposed of and the
    /// caller sees [`Reconciliation::UnknownLocation`].
    pub fn reconcile(&self, id: ShipId, live: &dyn LiveShipSource) -> Reconciliation {
        let mut idx = self.write();
        let Some(existing) = idx.by_id.get(&id) else {
            return Reconciliation::NotFound;
        };
        if existing.position().is_some() {
            return Reconciliation::Intact;
        }

        let Some(state) = live.live_ship(id) else {
            idx.unlink(id);
            debug!(%id, "desynced ship not in live world, disposed");
            return Reconciliation::UnknownLocation;
        };

        let rebuilt = ShipRecord::new(id, state.name, Some(state.position), state.claim);
        let collides = rebuilt
            .owned_cells()
            .iter()
            .any(|cell| idx.by_cell.get(cell).is_some_and(|owner| *owner != id));
        idx.unlink(id);
        if collides {
            warn!(%id, "rebuilt claim collides with another ship, record disposed");
            return Reconciliation::UnknownLocation;
        }
        idx.link(rebuilt.clone());
        debug!(%id, "ship record rebuilt from live world");
        Reconciliation::Repaired(rebuilt)
    }
}
