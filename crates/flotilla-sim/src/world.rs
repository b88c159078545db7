use std::collections::HashMap;

use flotilla_core::{CellKey, ChunkClaim, ShipId, ShipPosition, ShipRecord};

/// Handle to a ship's live physics representation in the world entity list.
///
/// Bodies are produced by worker threads during assembly and owned by
/// whatever implements [`ShipWorld`]; the registry only ever stores the
/// derived [`ShipRecord`].
#[derive(Debug, Clone)]
pub struct ShipBody {
    /// Identity shared with the registry record.
    pub id: ShipId,
    /// Display name.
    pub name: String,
    /// Current position of the representation's reference point.
    pub position: ShipPosition,
    /// The claim geometry the representation occupies.
    pub claim: ChunkClaim,
}

impl ShipBody {
    /// Create a body handle.
    pub fn new(id: ShipId, name: impl Into<String>, position: ShipPosition, claim: ChunkClaim) -> Self {
        Self {
            id,
            name: name.into(),
            position,
            claim,
        }
    }

    /// Derive the registry record describing this body's current state.
    pub fn to_record(&self) -> ShipRecord {
        ShipRecord::new(self.id, self.name.clone(), Some(self.position), self.claim)
    }
}

/// The live-world entity list, as far as ship lifecycles are concerned.
///
/// Implemented by the embedding engine; only the authoritative thread may
/// call the mutating methods.
pub trait ShipWorld {
    /// Add a ship's physics representation to the live entity list.
    fn spawn(&mut self, body: ShipBody);

    /// Remove a representation. Returns `false` when the id is absent;
    /// despawning twice is a no-op.
    fn despawn(&mut self, id: ShipId) -> bool;

    /// Look up a live representation by id.
    fn body(&self, id: ShipId) -> Option<&ShipBody>;
}

/// Structural collaborator answering whether assembly is currently legal at
/// a location (required blocks present, target space clear, and so on).
pub trait StructureSurvey {
    /// `true` when the structure at `at` may become a ship right now.
    fn assembly_legal(&self, at: CellKey) -> bool;
}

/// In-memory [`ShipWorld`] for embedders without an engine-side entity list
/// (headless simulation, tests).
#[derive(Debug, Default)]
pub struct ShipRoster {
    bodies: HashMap<ShipId, ShipBody>,
}

impl ShipRoster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live bodies.
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// Whether no bodies are live.
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Iterate over all live bodies.
    pub fn iter(&self) -> impl Iterator<Item = &ShipBody> {
        self.bodies.values()
    }
}

impl ShipWorld for ShipRoster {
    fn spawn(&mut self, body: ShipBody) {
        self.bodies.insert(body.id, body);
    }

    fn despawn(&mut self, id: ShipId) -> bool {
        self.bodies.remove(&id).is_some()
    }

    fn body(&self, id: ShipId) -> Option<&ShipBody> {
        self.bodies.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_to_record_carries_position_and_cells() {
        let id = ShipId::new();
        let body = ShipBody::new(
            id,
            "Skiff",
            ShipPosition::new(8.0, 72.0, 8.0),
            ChunkClaim::new(0, 0, 1),
        );
        let record = body.to_record();
        assert_eq!(record.id(), id);
        assert_eq!(record.name(), "Skiff");
        assert_eq!(record.position(), Some(ShipPosition::new(8.0, 72.0, 8.0)));
        assert_eq!(record.owned_cells().len(), 9);
    }

    #[test]
    fn roster_spawn_despawn_roundtrip() {
        let mut roster = ShipRoster::new();
        let body = ShipBody::new(
            ShipId::new(),
            "Skiff",
            ShipPosition::new(0.0, 64.0, 0.0),
            ChunkClaim::new(0, 0, 0),
        );
        let id = body.id;
        roster.spawn(body);
        assert_eq!(roster.len(), 1);
        assert!(roster.body(id).is_some());
        assert!(roster.despawn(id));
        assert!(!roster.despawn(id));
        assert!(roster.is_empty());
    }
}
