use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use tracing::{debug, info};

use flotilla_core::{CellKey, ShipId, ShipRegistry};

use crate::assembly::{AssemblyGuard, AssemblyProducer, PendingShip};
use crate::world::{ShipBody, ShipWorld, StructureSurvey};

/// The anchor's core item slots. The [`CoreSlot::Main`] slot gates assembly:
/// without it occupied the structure cannot become or stay a ship candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreSlot {
    /// Upper port-side auxiliary core.
    UpperPort,
    /// Lower port-side auxiliary core.
    LowerPort,
    /// The central core required to maintain a ship.
    Main,
    /// Lower starboard-side auxiliary core.
    LowerStarboard,
    /// Upper starboard-side auxiliary core.
    UpperStarboard,
}

/// Assembly lifecycle state of one anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorState {
    /// No physics representation and none requested.
    Dormant,
    /// A handoff is in flight on the construction channel.
    Assembling,
    /// The ship representation exists in registry and world.
    Active,
}

/// Parameters handed to a worker evaluating one assembly attempt.
#[derive(Debug, Clone)]
pub struct AssemblyRequest {
    /// Pre-assigned identity for the ship, should assembly succeed.
    pub ship: ShipId,
    /// Cell containing the requesting anchor.
    pub origin: CellKey,
    /// The candidate's in-flight guard; release it if evaluation produces
    /// nothing to enqueue.
    pub guard: AssemblyGuard,
}

/// Dispatches structure evaluation off the authoritative thread.
///
/// Implementations build the ship body on a worker and submit the result
/// through the construction channel; they never touch the registry or world
/// directly.
pub trait ShipAssembler {
    /// Begin background assembly of the candidate described by `request`.
    /// Fire-and-forget: the authoritative thread does not wait.
    fn launch(&self, request: AssemblyRequest);
}

/// A [`ShipAssembler`] running an evaluation function on a fresh worker
/// thread per attempt.
///
/// The function inspects the structure at the request origin and either
/// returns the built body (submitted through the channel) or `None` when the
/// structure does not qualify (guard released, candidate may retry).
pub struct ThreadedAssembler<F> {
    evaluate: Arc<F>,
    producer: AssemblyProducer,
}

impl<F> ThreadedAssembler<F>
where
    F: Fn(&AssemblyRequest) -> Option<ShipBody> + Send + Sync + 'static,
{
    /// Create an assembler submitting through `producer`.
    pub fn new(producer: AssemblyProducer, evaluate: F) -> Self {
        Self {
            evaluate: Arc::new(evaluate),
            producer,
        }
    }
}

impl<F> std::fmt::Debug for ThreadedAssembler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadedAssembler").finish_non_exhaustive()
    }
}

impl<F> ShipAssembler for ThreadedAssembler<F>
where
    F: Fn(&AssemblyRequest) -> Option<ShipBody> + Send + Sync + 'static,
{
    fn launch(&self, request: AssemblyRequest) {
        let evaluate = Arc::clone(&self.evaluate);
        let producer = self.producer.clone();
        thread::spawn(move || match evaluate(&request) {
            Some(body) => producer.submit(PendingShip::new(body, request.guard.clone())),
            None => {
                debug!(ship = %request.ship, "structure evaluation produced no ship");
                request.guard.finish();
            }
        });
    }
}

/// Everything an anchor needs to evaluate one tick. Built fresh by the tick
/// driver; only ever used on the authoritative thread.
pub struct AnchorContext<'a> {
    /// Registry of committed ships.
    pub registry: &'a ShipRegistry,
    /// Live world entity list.
    pub world: &'a mut dyn ShipWorld,
    /// Structural legality collaborator.
    pub survey: &'a dyn StructureSurvey,
    /// Background evaluation dispatcher.
    pub assembler: &'a dyn ShipAssembler,
}

/// The per-candidate structure carrying assembly triggers and lifecycle
/// state, one per anchor block location.
///
/// `assemble`/`disassemble` are one-shot: external actors raise them and the
/// tick consumes and clears them exactly once, whatever branch runs. The
/// `align` and physics-enabled flags persist until explicitly toggled, except
/// that an anchor outside any ship claim has both forced off.
#[derive(Debug)]
pub struct PhysicsAnchor {
    location: CellKey,
    cores: HashSet<CoreSlot>,
    assemble_requested: bool,
    disassemble_requested: bool,
    align_requested: bool,
    physics_enabled: bool,
    state: AnchorState,
    ship: Option<ShipId>,
    pending: Option<ShipId>,
    guard: AssemblyGuard,
}

impl PhysicsAnchor {
    /// Create a dormant anchor at `location` with empty core slots.
    pub fn new(location: CellKey) -> Self {
        Self {
            location,
            cores: HashSet::new(),
            assemble_requested: false,
            disassemble_requested: false,
            align_requested: false,
            physics_enabled: false,
            state: AnchorState::Dormant,
            ship: None,
            pending: None,
            guard: AssemblyGuard::new(),
        }
    }

    /// The cell containing this anchor.
    pub fn location(&self) -> CellKey {
        self.location
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AnchorState {
        self.state
    }

    /// Identity of the owned ship while [`AnchorState::Active`].
    pub fn ship(&self) -> Option<ShipId> {
        self.ship
    }

    /// Whether an assembly handoff is currently in flight.
    pub fn assembly_in_flight(&self) -> bool {
        self.guard.in_flight()
    }

    /// Whether physics simulation is enabled for the owned ship.
    pub fn physics_enabled(&self) -> bool {
        self.physics_enabled
    }

    /// Whether the ship is being asked to align to the cell grid.
    pub fn align_requested(&self) -> bool {
        self.align_requested
    }

    /// Whether an assemble was requested and not yet consumed by a tick.
    pub fn assemble_requested(&self) -> bool {
        self.assemble_requested
    }

    /// Whether a disassemble was requested and not yet consumed by a tick.
    pub fn disassemble_requested(&self) -> bool {
        self.disassemble_requested
    }

    /// Raise the one-shot assemble trigger for the next tick.
    pub fn request_assemble(&mut self) {
        self.assemble_requested = true;
    }

    /// Raise the one-shot disassemble trigger for the next tick.
    pub fn request_disassemble(&mut self) {
        self.disassemble_requested = true;
    }

    /// Enable or disable physics simulation for the owned ship.
    pub fn set_physics_enabled(&mut self, enabled: bool) {
        self.physics_enabled = enabled;
    }

    /// Flip the align flag.
    pub fn toggle_align(&mut self) {
        self.align_requested = !self.align_requested;
    }

    /// Occupy a core slot.
    pub fn install_core(&mut self, slot: CoreSlot) {
        self.cores.insert(slot);
    }

    /// Empty a core slot.
    pub fn remove_core(&mut self, slot: CoreSlot) {
        self.cores.remove(&slot);
    }

    /// Whether the main core is present, the structural requirement for
    /// becoming or staying a ship.
    pub fn can_maintain_ship(&self) -> bool {
        self.cores.contains(&CoreSlot::Main)
    }

    /// Evaluate one tick of the assembly state machine.
    ///
    /// Runs on the authoritative thread only. Whatever branch executes, the
    /// one-shot triggers are cleared before returning.
    pub fn tick(&mut self, ctx: &mut AnchorContext<'_>) {
        // Settle a handoff launched on an earlier tick: the guard clears when
        // the channel drain executes or drops it.
        if self.state == AnchorState::Assembling && !self.guard.in_flight() {
            match self.pending.take() {
                Some(id) if ctx.registry.contains(id) => {
                    debug!(%id, "assembly committed, anchor active");
                    self.ship = Some(id);
                    self.state = AnchorState::Active;
                }
                _ => self.state = AnchorState::Dormant,
            }
        }

        // A representation destroyed externally (runaway sweep, operator
        // teardown) leaves the anchor dormant.
        if self.state == AnchorState::Active
            && self.ship.is_some_and(|id| !ctx.registry.contains(id))
        {
            self.ship = None;
            self.state = AnchorState::Dormant;
        }

        match self.state {
            AnchorState::Dormant => {
                if self.assemble_requested
                    && self.ship.is_none()
                    && self.can_maintain_ship()
                    && ctx.registry.find_owner_of_cell(self.location).is_none()
                    && ctx.survey.assembly_legal(self.location)
                    && self.guard.try_begin()
                {
                    let ship = ShipId::new();
                    self.pending = Some(ship);
                    self.state = AnchorState::Assembling;
                    ctx.assembler.launch(AssemblyRequest {
                        ship,
                        origin: self.location,
                        guard: self.guard.clone(),
                    });
                }
            }
            AnchorState::Active => {
                if self.disassemble_requested {
                    self.teardown(ctx);
                }
            }
            AnchorState::Assembling => {}
        }

        // A structure outside any ship cannot request simulation features.
        if ctx.registry.find_owner_of_cell(self.location).is_none() {
            self.physics_enabled = false;
            self.align_requested = false;
        }

        // The triggers mean "requested this tick", never "requested at some
        // point"; they expire whatever happened above.
        self.assemble_requested = false;
        self.disassemble_requested = false;
    }

    /// Tear down the owned representation: despawn from the world, remove
    /// from the registry. Idempotent: a dormant anchor stays dormant.
    fn teardown(&mut self, ctx: &mut AnchorContext<'_>) {
        if let Some(id) = self.ship.take() {
            ctx.world.despawn(id);
            if !ctx.registry.remove(id) {
                info!(%id, "ship already removed during teardown");
            }
        }
        self.state = AnchorState::Dormant;
    }
}

#[cfg(test)]
mod tests {
    use flotilla_core::{ChunkClaim, ShipPosition, ShipRecord};

    use super::*;
    use crate::assembly::AssemblyChannel;
    use crate::world::ShipRoster;

    struct OpenWater;

    impl StructureSurvey for OpenWater {
        fn assembly_legal(&self, _at: CellKey) -> bool {
            true
        }
    }

    /// Builds the ship inline on the calling thread, so tests stay
    /// deterministic without sleeping.
    struct InlineAssembler {
        producer: AssemblyProducer,
    }

    impl ShipAssembler for InlineAssembler {
        fn launch(&self, request: AssemblyRequest) {
            let body = ShipBody::new(
                request.ship,
                "Launch",
                ShipPosition::new(0.0, 72.0, 0.0),
                ChunkClaim::new(request.origin.x(), request.origin.z(), 1),
            );
            self.producer.submit(PendingShip::new(body, request.guard.clone()));
        }
    }

    /// Never produces a ship; releases the guard like a failed evaluation.
    struct RefusingAssembler;

    impl ShipAssembler for RefusingAssembler {
        fn launch(&self, request: AssemblyRequest) {
            request.guard.finish();
        }
    }

    struct Rig {
        channel: AssemblyChannel,
        registry: ShipRegistry,
        world: ShipRoster,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                channel: AssemblyChannel::new(),
                registry: ShipRegistry::new(),
                world: ShipRoster::new(),
            }
        }

        fn drain(&mut self) {
            self.channel
                .drain(&self.registry, &mut self.world, &OpenWater);
        }

        fn tick(&mut self, anchor: &mut PhysicsAnchor, assembler: &dyn ShipAssembler) {
            let mut ctx = AnchorContext {
                registry: &self.registry,
                world: &mut self.world,
                survey: &OpenWater,
                assembler,
            };
            anchor.tick(&mut ctx);
        }
    }

    fn ready_anchor(location: CellKey) -> PhysicsAnchor {
        let mut anchor = PhysicsAnchor::new(location);
        anchor.install_core(CoreSlot::Main);
        anchor
    }

    #[test]
    fn full_assembly_cycle() {
        let mut rig = Rig::new();
        let assembler = InlineAssembler {
            producer: rig.channel.producer(),
        };
        let mut anchor = ready_anchor(CellKey::new(0, 0));

        anchor.request_assemble();
        rig.tick(&mut anchor, &assembler);
        assert_eq!(anchor.state(), AnchorState::Assembling);
        assert!(anchor.assembly_in_flight());

        // The authoritative thread drains between ticks; next tick settles.
        rig.drain();
        rig.tick(&mut anchor, &assembler);
        assert_eq!(anchor.state(), AnchorState::Active);
        let id = anchor.ship().unwrap();
        assert!(rig.registry.contains(id));
        assert!(rig.world.body(id).is_some());
    }

    #[test]
    fn assemble_requires_main_core() {
        let mut rig = Rig::new();
        let assembler = InlineAssembler {
            producer: rig.channel.producer(),
        };
        let mut anchor = PhysicsAnchor::new(CellKey::new(0, 0));

        anchor.request_assemble();
        rig.tick(&mut anchor, &assembler);
        assert_eq!(anchor.state(), AnchorState::Dormant);
        assert_eq!(rig.channel.queued(), 0);
    }

    #[test]
    fn assemble_refused_inside_existing_claim() {
        let mut rig = Rig::new();
        rig.registry
            .insert(ShipRecord::new(
                ShipId::new(),
                "Incumbent",
                Some(ShipPosition::new(0.0, 64.0, 0.0)),
                ChunkClaim::new(0, 0, 1),
            ))
            .unwrap();
        let assembler = InlineAssembler {
            producer: rig.channel.producer(),
        };
        let mut anchor = ready_anchor(CellKey::new(1, 1));

        anchor.request_assemble();
        rig.tick(&mut anchor, &assembler);
        assert_eq!(anchor.state(), AnchorState::Dormant);
        assert_eq!(rig.channel.queued(), 0);
    }

    #[test]
    fn dropped_evaluation_reverts_to_dormant() {
        let mut rig = Rig::new();
        let mut anchor = ready_anchor(CellKey::new(0, 0));

        anchor.request_assemble();
        rig.tick(&mut anchor, &RefusingAssembler);
        // Guard already released; next tick settles back to dormant.
        rig.tick(&mut anchor, &RefusingAssembler);
        assert_eq!(anchor.state(), AnchorState::Dormant);
        assert!(anchor.ship().is_none());
        assert!(!anchor.assembly_in_flight());
    }

    #[test]
    fn one_shot_triggers_clear_every_tick() {
        let mut rig = Rig::new();
        let assembler = InlineAssembler {
            producer: rig.channel.producer(),
        };

        // No core: the assemble branch is not taken, trigger still clears.
        let mut anchor = PhysicsAnchor::new(CellKey::new(0, 0));
        anchor.request_assemble();
        anchor.request_disassemble();
        assert!(anchor.assemble_requested());
        assert!(anchor.disassemble_requested());
        rig.tick(&mut anchor, &assembler);
        assert!(!anchor.assemble_requested());
        assert!(!anchor.disassemble_requested());
    }

    #[test]
    fn disassemble_tears_down_synchronously_and_is_idempotent() {
        let mut rig = Rig::new();
        let assembler = InlineAssembler {
            producer: rig.channel.producer(),
        };
        let mut anchor = ready_anchor(CellKey::new(0, 0));

        anchor.request_assemble();
        rig.tick(&mut anchor, &assembler);
        rig.drain();
        rig.tick(&mut anchor, &assembler);
        let id = anchor.ship().unwrap();

        anchor.request_disassemble();
        rig.tick(&mut anchor, &assembler);
        assert_eq!(anchor.state(), AnchorState::Dormant);
        assert!(!rig.registry.contains(id));
        assert!(rig.world.body(id).is_none());

        // Tearing down again is a no-op.
        anchor.request_disassemble();
        rig.tick(&mut anchor, &assembler);
        assert_eq!(anchor.state(), AnchorState::Dormant);
    }

    #[test]
    fn anchor_outside_ship_cannot_keep_physics_flags() {
        let mut rig = Rig::new();
        let assembler = InlineAssembler {
            producer: rig.channel.producer(),
        };
        let mut anchor = ready_anchor(CellKey::new(0, 0));

        anchor.set_physics_enabled(true);
        anchor.toggle_align();
        assert!(anchor.physics_enabled());
        assert!(anchor.align_requested());

        rig.tick(&mut anchor, &assembler);
        assert!(!anchor.physics_enabled());
        assert!(!anchor.align_requested());
    }

    #[test]
    fn active_anchor_keeps_physics_flags() {
        let mut rig = Rig::new();
        let assembler = InlineAssembler {
            producer: rig.channel.producer(),
        };
        let mut anchor = ready_anchor(CellKey::new(0, 0));

        anchor.request_assemble();
        rig.tick(&mut anchor, &assembler);
        rig.drain();
        rig.tick(&mut anchor, &assembler);
        assert_eq!(anchor.state(), AnchorState::Active);

        anchor.set_physics_enabled(true);
        anchor.toggle_align();
        rig.tick(&mut anchor, &assembler);
        assert!(anchor.physics_enabled());
        assert!(anchor.align_requested());
    }

    #[test]
    fn external_teardown_leaves_anchor_dormant() {
        let mut rig = Rig::new();
        let assembler = InlineAssembler {
            producer: rig.channel.producer(),
        };
        let mut anchor = ready_anchor(CellKey::new(0, 0));

        anchor.request_assemble();
        rig.tick(&mut anchor, &assembler);
        rig.drain();
        rig.tick(&mut anchor, &assembler);
        let id = anchor.ship().unwrap();

        // Someone else removed the ship (operator action, runaway sweep).
        rig.world.despawn(id);
        rig.registry.remove(id);

        rig.tick(&mut anchor, &assembler);
        assert_eq!(anchor.state(), AnchorState::Dormant);
        assert!(anchor.ship().is_none());
    }

    #[test]
    fn no_double_enqueue_while_handoff_in_flight() {
        let mut rig = Rig::new();
        let assembler = InlineAssembler {
            producer: rig.channel.producer(),
        };
        let mut anchor = ready_anchor(CellKey::new(0, 0));

        anchor.request_assemble();
        rig.tick(&mut anchor, &assembler);
        assert_eq!(rig.channel.queued(), 1);

        // A second request before the drain must not enqueue again.
        anchor.request_assemble();
        rig.tick(&mut anchor, &assembler);
        assert_eq!(rig.channel.queued(), 1);
    }
}
