use tracing::{debug, info};

use flotilla_core::{ShipId, ShipPosition, ShipRegistry};

use crate::world::ShipWorld;

/// The altitude bands that mark a ship as a runaway.
///
/// The glitch band is a narrow window just above the world height limit that
/// ships end up in through a known simulation artifact; the bounds were
/// observed empirically, so they are configuration rather than constants.
/// The escape limit catches ships that left the simulatable volume entirely.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunawayBand {
    /// Exclusive lower bound of the glitch band.
    pub glitch_floor: f64,
    /// Exclusive upper bound of the glitch band.
    pub glitch_ceiling: f64,
    /// Altitudes beyond this magnitude, in either direction, count as
    /// escaped.
    pub escape_limit: f64,
}

impl Default for RunawayBand {
    fn default() -> Self {
        Self {
            glitch_floor: 460.0,
            glitch_ceiling: 464.0,
            escape_limit: 10_000.0,
        }
    }
}

impl RunawayBand {
    /// Override the glitch band bounds.
    pub fn with_glitch_band(mut self, floor: f64, ceiling: f64) -> Self {
        self.glitch_floor = floor;
        self.glitch_ceiling = ceiling;
        self
    }

    /// Override the escape limit.
    pub fn with_escape_limit(mut self, limit: f64) -> Self {
        self.escape_limit = limit;
        self
    }

    /// Whether a ship at `position` is a runaway.
    pub fn is_runaway(&self, position: ShipPosition) -> bool {
        let y = position.y;
        (y > self.glitch_floor && y < self.glitch_ceiling) || y.abs() > self.escape_limit
    }
}

/// Per-ship result of a runaway sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    /// The ship that was flagged.
    pub id: ShipId,
    /// Whether the registry still held the record when the sweep acted.
    /// `false` means it vanished between listing and acting because a
    /// concurrent teardown won the race, which is not an error.
    pub removed: bool,
}

/// Structured result of an operator-initiated teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// The ship existed and was removed.
    Removed,
    /// No ship with that id.
    NotFound,
}

/// Scan the registry and tear down every runaway ship.
///
/// Ships with unknown position are skipped until reconciled. The scan is
/// read-then-act over a registry snapshot: a record that disappears before
/// the sweep reaches it is reported with `removed = false` and the sweep
/// carries on.
pub fn runaway_sweep(
    registry: &ShipRegistry,
    world: &mut dyn ShipWorld,
    band: &RunawayBand,
) -> Vec<SweepOutcome> {
    let mut outcomes = Vec::new();
    for record in registry.all_records() {
        let Some(position) = record.position() else {
            continue;
        };
        if !band.is_runaway(position) {
            continue;
        }
        let id = record.id();
        world.despawn(id);
        let removed = registry.remove(id);
        if removed {
            debug!(%id, y = position.y, "runaway ship torn down");
        } else {
            info!(%id, "runaway already gone, skipping");
        }
        outcomes.push(SweepOutcome { id, removed });
    }
    outcomes
}

/// Tear down one ship by id: despawn its representation, then remove the
/// record. Safe to call for ids that never existed.
pub fn teardown_ship(
    registry: &ShipRegistry,
    world: &mut dyn ShipWorld,
    id: ShipId,
) -> TeardownOutcome {
    world.despawn(id);
    if registry.remove(id) {
        debug!(%id, "ship torn down by operator");
        TeardownOutcome::Removed
    } else {
        TeardownOutcome::NotFound
    }
}
