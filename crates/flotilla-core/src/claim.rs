use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single spatial cell on the world's (x, z) grid, packed into one signed
/// 64-bit key: `x` in the high 32 bits, `z` in the low 32 bits.
///
/// The packed value doubles as the persisted form of the key, so the bit
/// layout is load-bearing: changing it would orphan every claim written to
/// disk. It serializes as the raw integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellKey(i64);

impl CellKey {
    /// Pack a cell coordinate pair into a key.
    pub fn new(x: i32, z: i32) -> Self {
        Self((i64::from(x) << 32) | (i64::from(z) & 0xFFFF_FFFF))
    }

    /// The x (high-bits) component.
    pub fn x(self) -> i32 {
        (self.0 >> 32) as i32
    }

    /// The z (low-bits) component.
    pub fn z(self) -> i32 {
        self.0 as i32
    }

    /// The packed 64-bit form, as stored in indexes and on disk.
    pub fn raw(self) -> i64 {
        self.0
    }

    /// Rebuild a key from its packed form.
    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x(), self.z())
    }
}

/// The center cell + radius geometry describing the square region of cells a
/// ship owns.
///
/// A claim is a generator, not a container: [`ChunkClaim::cells`] derives the
/// concrete owned-cell set that the registry indexes, and the claim itself is
/// kept on the record for re-derivation and debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkClaim {
    /// Center cell x coordinate.
    pub center_x: i32,
    /// Center cell z coordinate.
    pub center_z: i32,
    /// Number of cells claimed in each direction from the center.
    pub radius: u32,
}

impl ChunkClaim {
    /// Create a claim centered on `(center_x, center_z)` extending `radius`
    /// cells in each direction.
    pub fn new(center_x: i32, center_z: i32, radius: u32) -> Self {
        Self {
            center_x,
            center_z,
            radius,
        }
    }

    /// The key of the center cell.
    pub fn center(&self) -> CellKey {
        CellKey::new(self.center_x, self.center_z)
    }

    /// Derive every cell `(x, z)` with `center - radius <= x,z <= center +
    /// radius`. Pure and deterministic.
    pub fn cells(&self) -> HashSet<CellKey> {
        let r = self.radius as i32;
        let mut cells = HashSet::with_capacity(self.cell_count());
        for x in (self.center_x - r)..=(self.center_x + r) {
            for z in (self.center_z - r)..=(self.center_z + r) {
                cells.insert(CellKey::new(x, z));
            }
        }
        cells
    }

    /// Whether `cell` falls inside this claim.
    pub fn contains(&self, cell: CellKey) -> bool {
        let r = self.radius as i32;
        (cell.x() - self.center_x).abs() <= r && (cell.z() - self.center_z).abs() <= r
    }

    /// Number of cells this claim covers: `(2 * radius + 1)^2`.
    pub fn cell_count(&self) -> usize {
        let side = 2 * self.radius as usize + 1;
        side * side
    }
}
