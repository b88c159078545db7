//! Core ship-tracking types for Flotilla: records, chunk claims, and the
//! indexed ship registry.
//!
//! This crate defines the data model shared by the simulation and any
//! operator-facing surface. A [`ShipRegistry`] can be queried from any
//! thread; all mutation serializes through its internal lock, so the
//! simulation thread and command handlers never observe half-applied state.

/// Cell keys and the center+radius claim geometry.
pub mod claim;
/// Error types used throughout the crate.
pub mod error;
/// Ship identity, position, and record types.
pub mod record;
/// The multi-attribute indexed ship store.
pub mod registry;

/// Re-export claim geometry types.
pub use claim::{CellKey, ChunkClaim};
/// Re-export error types.
pub use error::{RegistryError, RegistryResult};
/// Re-export record types.
pub use record::{ShipId, ShipPosition, ShipRecord, ShipRecordBuilder, ShipStatus};
/// Re-export registry types.
pub use registry::{LiveShip, LiveShipSource, Reconciliation, ShipRegistry};
