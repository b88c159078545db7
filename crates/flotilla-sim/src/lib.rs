//! Tick-based ship lifecycle for Flotilla.
//!
//! Worker threads evaluate candidate structures and build ship bodies in
//! parallel with the authoritative tick thread; the construction channel is
//! the only path by which their results reach the registry and the world.
//! Anchors carry the one-shot assemble/disassemble triggers that drive the
//! lifecycle, and maintenance sweeps tear down ships the simulation has
//! lost control of.

/// Physics anchors, the assembly state machine, and assembler dispatch.
pub mod anchor;
/// The tick-synchronized construction channel.
pub mod assembly;
/// Runaway detection, sweeps, and operator teardown.
pub mod runaway;
/// The authoritative tick driver.
pub mod simulation;
/// Ship bodies and the world/structure collaborator traits.
pub mod world;

/// Re-export anchor types.
pub use anchor::{
    AnchorContext, AnchorState, AssemblyRequest, CoreSlot, PhysicsAnchor, ShipAssembler,
    ThreadedAssembler,
};
/// Re-export construction channel types.
pub use assembly::{AssemblyChannel, AssemblyGuard, AssemblyProducer, DrainSummary, PendingShip};
/// Re-export maintenance types.
pub use runaway::{RunawayBand, SweepOutcome, TeardownOutcome, runaway_sweep, teardown_ship};
/// Re-export the tick driver.
pub use simulation::ShipSimulation;
/// Re-export world collaborator types.
pub use world::{ShipBody, ShipRoster, ShipWorld, StructureSurvey};
