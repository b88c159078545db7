use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::claim::{CellKey, ChunkClaim};
use crate::error::{RegistryError, RegistryResult};

/// Unique identity token for a ship, assigned once at creation and never
/// reused while a record with it exists in a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShipId(pub Uuid);

impl ShipId {
    /// Generate a new random ship ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ShipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ShipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// World-space position of a ship's reference point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShipPosition {
    /// East-west coordinate.
    pub x: f64,
    /// Altitude.
    pub y: f64,
    /// North-south coordinate.
    pub z: f64,
}

impl ShipPosition {
    /// Create a position from its three components.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Whether this is exactly the world origin. Ships parked there have
    /// never been moved by the simulation.
    pub fn is_origin(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }
}

/// Operator-facing classification of a ship record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShipStatus {
    /// Position known; the ship is participating in the world normally.
    Located,
    /// Position missing, probable desync; the record awaits
    /// [`reconcile`](crate::registry::ShipRegistry::reconcile).
    AwaitingReconcile,
    /// Reported position is exactly the world origin; parked and likely
    /// never simulated.
    Idle,
}

/// One ship's registry entry: identity, display name, last-known position,
/// and the spatial cells it owns.
///
/// The owned-cell set is a snapshot: once a record is committed to a
/// registry, a change of cell ownership means replacing the whole record,
/// never editing the set in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipRecord {
    id: ShipId,
    name: String,
    position: Option<ShipPosition>,
    owned_cells: HashSet<CellKey>,
    claim: Option<ChunkClaim>,
}

impl ShipRecord {
    /// Construct a record from a live structure's current state. The cell
    /// set is derived from `claim`.
    pub fn new(
        id: ShipId,
        name: impl Into<String>,
        position: Option<ShipPosition>,
        claim: ChunkClaim,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            position,
            owned_cells: claim.cells(),
            claim: Some(claim),
        }
    }

    /// Construct a reconciliation placeholder carrying only an identity:
    /// empty name, unknown position, no claimed cells.
    pub fn placeholder(id: ShipId) -> Self {
        Self {
            id,
            name: String::new(),
            position: None,
            owned_cells: HashSet::new(),
            claim: None,
        }
    }

    /// Start building a record field by field.
    pub fn builder() -> ShipRecordBuilder {
        ShipRecordBuilder::default()
    }

    /// The ship's identity token.
    pub fn id(&self) -> ShipId {
        self.id
    }

    /// The ship's display name. Not guaranteed unique.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the display name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Last-known position; `None` means the position needs reconciliation.
    pub fn position(&self) -> Option<ShipPosition> {
        self.position
    }

    /// Update the last-known position.
    pub fn set_position(&mut self, position: Option<ShipPosition>) {
        self.position = position;
    }

    /// The cells this ship occupies. Records with `None` position or an
    /// empty claim own no cells.
    pub fn owned_cells(&self) -> &HashSet<CellKey> {
        &self.owned_cells
    }

    /// The center+radius geometry that generated the owned-cell set.
    pub fn claim(&self) -> Option<ChunkClaim> {
        self.claim
    }

    /// Classify this record for operator-facing listings.
    pub fn status(&self) -> ShipStatus {
        match self.position {
            None => ShipStatus::AwaitingReconcile,
            Some(p) if p.is_origin() => ShipStatus::Idle,
            Some(_) => ShipStatus::Located,
        }
    }
}

/// Field-by-field construction of a [`ShipRecord`].
///
/// Building without an id is a usage error and fails with
/// [`RegistryError::InvalidRecord`].
#[derive(Debug, Default)]
pub struct ShipRecordBuilder {
    id: Option<ShipId>,
    name: String,
    position: Option<ShipPosition>,
    claim: Option<ChunkClaim>,
}

impl ShipRecordBuilder {
    /// Set the ship's identity token. Required.
    pub fn id(mut self, id: ShipId) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the last-known position.
    pub fn position(mut self, position: ShipPosition) -> Self {
        self.position = Some(position);
        self
    }

    /// Set the claim geometry; the owned-cell set is derived from it.
    pub fn claim(mut self, claim: ChunkClaim) -> Self {
        self.claim = Some(claim);
        self
    }

    /// Finish building. Fails when no id was supplied.
    pub fn build(self) -> RegistryResult<ShipRecord> {
        let id = self
            .id
            .ok_or_else(|| RegistryError::InvalidRecord("record built without an id".into()))?;
        let owned_cells = self.claim.map(|c| c.cells()).unwrap_or_default();
        Ok(ShipRecord {
            id,
            name: self.name,
            position: self.position,
            owned_cells,
            claim: self.claim,
        })
    }
}
