use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use flotilla_core::{CellKey, ShipId, ShipRegistry};

use crate::anchor::{AnchorContext, PhysicsAnchor, ShipAssembler};
use crate::assembly::{AssemblyChannel, DrainSummary};
use crate::runaway::{RunawayBand, SweepOutcome, TeardownOutcome, runaway_sweep, teardown_ship};
use crate::world::{ShipWorld, StructureSurvey};

/// Number of recent ticks kept for the tick-rate readout.
const TICK_WINDOW: usize = 100;

/// The authoritative thread's loop body.
///
/// Owns the registry, the consumer end of the construction channel, the
/// anchor set, and the world handle. Each [`ShipSimulation::tick`] first
/// drains the channel, committing ships that workers finished since the
/// last tick, then evaluates every anchor's state machine. Operator actions
/// go through the same instance on the same thread, so all world and
/// registry mutation stays single-threaded.
pub struct ShipSimulation<W: ShipWorld> {
    registry: Arc<ShipRegistry>,
    channel: AssemblyChannel,
    anchors: HashMap<CellKey, PhysicsAnchor>,
    world: W,
    survey: Box<dyn StructureSurvey>,
    assembler: Box<dyn ShipAssembler>,
    ticks: u64,
    tick_times: VecDeque<Duration>,
}

impl<W: ShipWorld> std::fmt::Debug for ShipSimulation<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShipSimulation")
            .field("ticks", &self.ticks)
            .field("ships", &self.registry.len())
            .field("anchors", &self.anchors.len())
            .finish_non_exhaustive()
    }
}

impl<W: ShipWorld> ShipSimulation<W> {
    /// Assemble the driver from its parts. `channel` must be the channel
    /// whose producer handles the assembler submits through.
    pub fn new(
        registry: Arc<ShipRegistry>,
        world: W,
        survey: impl StructureSurvey + 'static,
        assembler: impl ShipAssembler + 'static,
        channel: AssemblyChannel,
    ) -> Self {
        Self {
            registry,
            channel,
            anchors: HashMap::new(),
            world,
            survey: Box::new(survey),
            assembler: Box::new(assembler),
            ticks: 0,
            tick_times: VecDeque::with_capacity(TICK_WINDOW),
        }
    }

    /// The shared registry handle.
    pub fn registry(&self) -> &Arc<ShipRegistry> {
        &self.registry
    }

    /// The live world.
    pub fn world(&self) -> &W {
        &self.world
    }

    /// Mutable access to the live world. Authoritative thread only.
    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    /// Track an anchor, keyed by its location. A structure re-placed at the
    /// same cell replaces the old anchor.
    pub fn add_anchor(&mut self, anchor: PhysicsAnchor) {
        self.anchors.insert(anchor.location(), anchor);
    }

    /// The anchor at `location`, if any.
    pub fn anchor(&self, location: CellKey) -> Option<&PhysicsAnchor> {
        self.anchors.get(&location)
    }

    /// Mutable access to the anchor at `location`, for trigger requests.
    pub fn anchor_mut(&mut self, location: CellKey) -> Option<&mut PhysicsAnchor> {
        self.anchors.get_mut(&location)
    }

    /// Drop the anchor at `location` (its owning structure was removed).
    /// The ship it may own is untouched; tear that down separately.
    pub fn remove_anchor(&mut self, location: CellKey) -> Option<PhysicsAnchor> {
        self.anchors.remove(&location)
    }

    /// Advance one tick: drain the construction channel, then evaluate every
    /// anchor.
    pub fn tick(&mut self) -> DrainSummary {
        let started = Instant::now();

        let summary = self
            .channel
            .drain(&self.registry, &mut self.world, self.survey.as_ref());

        let mut ctx = AnchorContext {
            registry: &self.registry,
            world: &mut self.world,
            survey: self.survey.as_ref(),
            assembler: self.assembler.as_ref(),
        };
        for anchor in self.anchors.values_mut() {
            anchor.tick(&mut ctx);
        }

        self.ticks += 1;
        if self.tick_times.len() == TICK_WINDOW {
            self.tick_times.pop_front();
        }
        self.tick_times.push_back(started.elapsed());
        summary
    }

    /// Advance the simulation by `n` ticks.
    pub fn run(&mut self, n: u64) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Number of ticks evaluated so far.
    pub fn current_tick(&self) -> u64 {
        self.ticks
    }

    /// Average ticks per second over the recent window, or `None` before the
    /// first tick (or when ticks complete too fast to measure).
    pub fn ticks_per_second(&self) -> Option<f64> {
        if self.tick_times.is_empty() {
            return None;
        }
        let total: Duration = self.tick_times.iter().sum();
        let seconds = total.as_secs_f64();
        if seconds == 0.0 {
            return None;
        }
        Some(self.tick_times.len() as f64 / seconds)
    }

    /// Run a runaway sweep against the current registry and world.
    pub fn sweep_runaways(&mut self, band: &RunawayBand) -> Vec<SweepOutcome> {
        runaway_sweep(&self.registry, &mut self.world, band)
    }

    /// Operator teardown of one ship by id.
    pub fn teardown(&mut self, id: ShipId) -> TeardownOutcome {
        teardown_ship(&self.registry, &mut self.world, id)
    }
}

#[cfg(test)]
mod tests {
    use flotilla_core::{ChunkClaim, ShipPosition};

    use super::*;
    use crate::anchor::{AnchorState, AssemblyRequest, CoreSlot};
    use crate::assembly::{AssemblyProducer, PendingShip};
    use crate::world::{ShipBody, ShipRoster};

    struct OpenWater;

    impl StructureSurvey for OpenWater {
        fn assembly_legal(&self, _at: CellKey) -> bool {
            true
        }
    }

    struct InlineAssembler {
        producer: AssemblyProducer,
    }

    impl ShipAssembler for InlineAssembler {
        fn launch(&self, request: AssemblyRequest) {
            let body = ShipBody::new(
                request.ship,
                "Built",
                ShipPosition::new(0.0, 72.0, 0.0),
                ChunkClaim::new(request.origin.x(), request.origin.z(), 1),
            );
            self.producer.submit(PendingShip::new(body, request.guard.clone()));
        }
    }

    fn simulation() -> ShipSimulation<ShipRoster> {
        let channel = AssemblyChannel::new();
        let assembler = InlineAssembler {
            producer: channel.producer(),
        };
        ShipSimulation::new(
            Arc::new(ShipRegistry::new()),
            ShipRoster::new(),
            OpenWater,
            assembler,
            channel,
        )
    }

    fn ready_anchor(location: CellKey) -> PhysicsAnchor {
        let mut anchor = PhysicsAnchor::new(location);
        anchor.install_core(CoreSlot::Main);
        anchor
    }

    #[test]
    fn assembly_lands_on_the_following_tick() {
        let mut sim = simulation();
        let at = CellKey::new(0, 0);
        sim.add_anchor(ready_anchor(at));

        sim.anchor_mut(at).unwrap().request_assemble();
        let summary = sim.tick();
        assert!(summary.is_empty());
        assert_eq!(sim.anchor(at).unwrap().state(), AnchorState::Assembling);

        let summary = sim.tick();
        assert_eq!(summary.applied.len(), 1);
        assert_eq!(sim.anchor(at).unwrap().state(), AnchorState::Active);

        let id = sim.anchor(at).unwrap().ship().unwrap();
        assert!(sim.registry().contains(id));
        assert!(sim.world().body(id).is_some());
        assert_eq!(sim.current_tick(), 2);
    }

    #[test]
    fn contested_assembly_resolves_to_exactly_one_owner() {
        let mut sim = simulation();
        // Two anchors whose radius-1 claims would overlap.
        let near = CellKey::new(0, 0);
        let close = CellKey::new(1, 0);
        sim.add_anchor(ready_anchor(near));
        sim.add_anchor(ready_anchor(close));

        sim.anchor_mut(near).unwrap().request_assemble();
        sim.anchor_mut(close).unwrap().request_assemble();
        sim.tick();
        let summary = sim.tick();

        // One handoff applies, the other drops; never both.
        assert_eq!(summary.applied.len() + summary.dropped.len(), 2);
        assert_eq!(summary.applied.len(), 1);
        assert_eq!(sim.registry().len(), 1);

        // Claims stay disjoint: every indexed cell has exactly one owner.
        let records: Vec<_> = sim.registry().all_records().collect();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn disassembly_and_reassembly_cycle() {
        let mut sim = simulation();
        let at = CellKey::new(0, 0);
        sim.add_anchor(ready_anchor(at));

        sim.anchor_mut(at).unwrap().request_assemble();
        sim.run(2);
        let first = sim.anchor(at).unwrap().ship().unwrap();

        sim.anchor_mut(at).unwrap().request_disassemble();
        sim.tick();
        assert_eq!(sim.anchor(at).unwrap().state(), AnchorState::Dormant);
        assert!(!sim.registry().contains(first));
        assert!(sim.world().is_empty());

        // The freed claim is assemblable again.
        sim.anchor_mut(at).unwrap().request_assemble();
        sim.run(2);
        let second = sim.anchor(at).unwrap().ship().unwrap();
        assert_ne!(first, second);
        assert!(sim.registry().contains(second));
    }

    #[test]
    fn operator_teardown_through_driver() {
        let mut sim = simulation();
        let at = CellKey::new(0, 0);
        sim.add_anchor(ready_anchor(at));
        sim.anchor_mut(at).unwrap().request_assemble();
        sim.run(2);
        let id = sim.anchor(at).unwrap().ship().unwrap();

        assert_eq!(sim.teardown(id), TeardownOutcome::Removed);
        assert_eq!(sim.teardown(id), TeardownOutcome::NotFound);

        // Anchor notices on its next tick.
        sim.tick();
        assert_eq!(sim.anchor(at).unwrap().state(), AnchorState::Dormant);
    }

    #[test]
    fn sweep_through_driver_tears_down_runaway() {
        use flotilla_core::ShipRecord;

        let mut sim = simulation();
        let id = ShipId::new();
        let position = ShipPosition::new(0.0, 463.5, 0.0);
        let claim = ChunkClaim::new(30, 30, 0);
        sim.registry()
            .insert(ShipRecord::new(id, "Glitched", Some(position), claim))
            .unwrap();
        sim.world_mut()
            .spawn(ShipBody::new(id, "Glitched", position, claim));

        let outcomes = sim.sweep_runaways(&RunawayBand::default());
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].removed);
        assert!(!sim.registry().contains(id));
        assert!(sim.world().is_empty());
    }

    #[test]
    fn tick_rate_readout_appears_after_ticks() {
        let mut sim = simulation();
        assert!(sim.ticks_per_second().is_none());
        sim.run(5);
        assert_eq!(sim.current_tick(), 5);
        // Sub-nanosecond ticks can defeat the clock; the readout is allowed
        // to stay unavailable but must never be zero or negative.
        if let Some(tps) = sim.ticks_per_second() {
            assert!(tps > 0.0);
        }
    }

    #[test]
    fn removed_anchor_no_longer_ticks() {
        let mut sim = simulation();
        let at = CellKey::new(3, 3);
        sim.add_anchor(ready_anchor(at));
        let removed = sim.remove_anchor(at);
        assert!(removed.is_some());
        assert!(sim.anchor(at).is_none());

        sim.tick();
        assert!(sim.registry().is_empty());
    }
}
