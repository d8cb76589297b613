use tracing::{debug, trace, warn};

use super::{MovementConfig, MovementContext};
use crate::coordinator::{MoveOutcome, OccupancyError};
use crate::grid::{Direction, EntityId, MovementModifier, TileCoord, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    InFlight,
    /// A step finished this tick. `chained` is set when a slide immediately
    /// started the next step.
    Arrived { tile: TileCoord, chained: bool },
}

/// Interpolated position for a step in flight. Jumps add a parabolic arc on
/// the vertical axis that peaks at `jump_height` halfway through.
pub fn sample_world_position(
    start: Vec3,
    target: Vec3,
    progress: f32,
    modifier: MovementModifier,
    jump_height: f32,
) -> Vec3 {
    let t = progress.clamp(0.0, 1.0);
    let mut position = start.lerp(target, t);
    if modifier.is_jump() {
        position.y += 4.0 * t * (1.0 - t) * jump_height;
    }
    position
}

/// Per-entity grid motion state machine.
///
/// The logical tile switches to the destination the moment a step is
/// accepted; the world position catches up over the following ticks.
#[derive(Debug, Clone)]
pub struct GridMovementController {
    entity: EntityId,
    config: MovementConfig,
    tile: TileCoord,
    facing: Direction,
    moving: bool,
    sliding: bool,
    modifier: MovementModifier,
    progress: f32,
    start_world: Vec3,
    target_world: Vec3,
    world_position: Vec3,
    slide_chain: u32,
    steps_taken: u64,
}

impl GridMovementController {
    pub fn new(entity: EntityId, spawn: TileCoord, config: MovementConfig) -> Self {
        let center = cell_center(&config, spawn);
        Self {
            entity,
            config,
            tile: spawn,
            facing: Direction::default(),
            moving: false,
            sliding: false,
            modifier: MovementModifier::Normal,
            progress: 0.0,
            start_world: center,
            target_world: center,
            world_position: center,
            slide_chain: 0,
            steps_taken: 0,
        }
    }

    /// Claims the spawn tile with the coordinator.
    pub fn activate(&mut self, ctx: &mut MovementContext<'_>) -> Result<(), OccupancyError> {
        match ctx.coordinator.as_deref_mut() {
            Some(coordinator) => coordinator.register_entity(self.entity, self.tile),
            None => {
                trace!(entity = ?self.entity, "activate_without_coordinator");
                Ok(())
            }
        }
    }

    pub fn deactivate(&mut self, ctx: &mut MovementContext<'_>) {
        self.force_stop();
        if let Some(coordinator) = ctx.coordinator.as_deref_mut() {
            coordinator.unregister_entity(self.entity);
        }
    }

    /// Starts one step. Refused while a step is in flight or when the target
    /// is blocked; a refusal leaves position and motion state untouched.
    pub fn try_move(&mut self, direction: Direction, ctx: &mut MovementContext<'_>) -> bool {
        if self.moving {
            trace!(entity = ?self.entity, %direction, "move_rejected_in_flight");
            return false;
        }
        self.facing = direction;
        let target = self.tile.neighbor(direction);
        let outcome = self.query(target, direction, ctx);
        if !outcome.allowed {
            self.sliding = false;
            return false;
        }
        self.slide_chain = 0;
        self.begin_move(target, direction, outcome.modifier, ctx);
        true
    }

    pub fn is_blocked(&self, direction: Direction, ctx: &MovementContext<'_>) -> bool {
        let target = self.tile.neighbor(direction);
        !self.query(target, direction, ctx).allowed
    }

    pub fn update(&mut self, dt: f32, ctx: &mut MovementContext<'_>) -> TickOutcome {
        if !self.moving {
            return TickOutcome::Idle;
        }
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let speed = self.config.base_speed * self.modifier.speed_multiplier();
        self.progress += dt * speed;
        if self.progress >= 1.0 {
            return self.complete(ctx);
        }
        self.world_position = sample_world_position(
            self.start_world,
            self.target_world,
            self.progress,
            self.modifier,
            self.config.jump_height,
        );
        TickOutcome::InFlight
    }

    /// Cancels motion and snaps to the logical tile. No enter/exit callbacks
    /// fire, so the tile the mover now stands on never saw it arrive.
    pub fn force_stop(&mut self) {
        if self.moving {
            debug!(entity = ?self.entity, tile = %self.tile, "move_force_stopped");
        }
        self.moving = false;
        self.sliding = false;
        self.progress = 0.0;
        self.slide_chain = 0;
        self.snap_to_tile();
    }

    /// Teleports within the current elevation layer.
    pub fn set_grid_position(
        &mut self,
        x: i32,
        y: i32,
        ctx: &mut MovementContext<'_>,
    ) -> Result<(), OccupancyError> {
        self.teleport(TileCoord::new(x, y, self.tile.elevation), ctx)
    }

    /// Moves the occupancy claim and snaps without callbacks. Motion is
    /// cancelled even when the destination turns out to be claimed.
    pub fn teleport(
        &mut self,
        tile: TileCoord,
        ctx: &mut MovementContext<'_>,
    ) -> Result<(), OccupancyError> {
        self.force_stop();
        if let Some(coordinator) = ctx.coordinator.as_deref_mut() {
            if let Err(err) = coordinator.move_entity(self.entity, self.tile, tile) {
                debug!(entity = ?self.entity, %tile, error = %err, "teleport_refused");
                return Err(err);
            }
        }
        debug!(entity = ?self.entity, from = %self.tile, to = %tile, "teleported");
        self.tile = tile;
        self.snap_to_tile();
        Ok(())
    }

    /// Uses whatever is in reach: the best registry interactable on the faced
    /// or current tile, otherwise interact triggers on the faced tile.
    pub fn try_interact(&mut self, ctx: &mut MovementContext<'_>) -> bool {
        if self.moving {
            return false;
        }
        let faced = self.faced_tile();
        if let Some(registry) = ctx.registry.as_deref_mut() {
            if let Some(object) = registry.best_interactable(self.entity, self.tile, &[faced, self.tile]) {
                if registry.interact(object, self.entity) {
                    debug!(entity = ?self.entity, object = object.0, "interacted");
                    return true;
                }
            }
        }
        match ctx.triggers.as_deref_mut() {
            Some(triggers) => triggers.try_interact(self.entity, faced, self.facing),
            None => false,
        }
    }

    pub fn interaction_prompt(&self, ctx: &MovementContext<'_>) -> Option<String> {
        if self.moving {
            return None;
        }
        let registry = ctx.registry()?;
        let object = registry.best_interactable(self.entity, self.tile, &[self.faced_tile(), self.tile])?;
        registry.interaction_prompt(object)
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn config(&self) -> &MovementConfig {
        &self.config
    }

    pub fn tile(&self) -> TileCoord {
        self.tile
    }

    pub fn grid_x(&self) -> i32 {
        self.tile.x
    }

    pub fn grid_y(&self) -> i32 {
        self.tile.y
    }

    pub fn elevation(&self) -> i32 {
        self.tile.elevation
    }

    pub fn facing(&self) -> Direction {
        self.facing
    }

    pub fn faced_tile(&self) -> TileCoord {
        self.tile.neighbor(self.facing)
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }

    pub fn is_sliding(&self) -> bool {
        self.sliding
    }

    pub fn modifier(&self) -> MovementModifier {
        self.modifier
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn start_world_position(&self) -> Vec3 {
        self.start_world
    }

    pub fn target_world_position(&self) -> Vec3 {
        self.target_world
    }

    pub fn world_position(&self) -> Vec3 {
        self.world_position
    }

    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }

    fn query(&self, target: TileCoord, direction: Direction, ctx: &MovementContext<'_>) -> MoveOutcome {
        match ctx.coordinator() {
            Some(coordinator) => coordinator.can_move(self.tile, target, direction, self.entity),
            None => {
                trace!(entity = ?self.entity, "move_unchecked_without_coordinator");
                MoveOutcome::UNCHECKED
            }
        }
    }

    fn begin_move(
        &mut self,
        target: TileCoord,
        direction: Direction,
        modifier: MovementModifier,
        ctx: &mut MovementContext<'_>,
    ) {
        let from = self.tile;
        if let Some(coordinator) = ctx.coordinator.as_deref_mut() {
            coordinator.trigger_exit(self.entity, from, direction);
        }
        if let Some(triggers) = ctx.triggers.as_deref_mut() {
            triggers.on_tile_exit(self.entity, from, direction);
        }
        if let Some(registry) = ctx.registry.as_deref_mut() {
            registry.notify_exit(from, self.entity);
        }
        if let Some(coordinator) = ctx.coordinator.as_deref_mut() {
            if let Err(err) = coordinator.move_entity(self.entity, from, target) {
                warn!(entity = ?self.entity, %from, to = %target, error = %err, "occupancy_transfer_failed");
            }
            let delta = coordinator.classify(target).elevation_delta;
            if delta != 0 {
                let landing = target.with_elevation(target.elevation + delta);
                if let Err(err) = coordinator.reserve_landing(self.entity, landing) {
                    warn!(entity = ?self.entity, %landing, error = %err, "landing_reservation_failed");
                }
            }
        }

        self.tile = target;
        self.start_world = self.world_position;
        self.target_world = cell_center(&self.config, target);
        self.moving = true;
        self.progress = 0.0;
        self.modifier = modifier;
        self.sliding = modifier.is_slide();
        self.steps_taken += 1;
        debug!(entity = ?self.entity, %from, to = %target, %modifier, "move_started");
    }

    fn complete(&mut self, ctx: &mut MovementContext<'_>) -> TickOutcome {
        self.progress = 1.0;
        self.moving = false;
        self.world_position = self.target_world;

        self.apply_elevation_change(ctx);
        let tile = self.tile;
        if let Some(coordinator) = ctx.coordinator.as_deref_mut() {
            coordinator.trigger_enter(self.entity, tile);
        }
        if let Some(triggers) = ctx.triggers.as_deref_mut() {
            triggers.on_tile_enter(self.entity, tile, self.facing);
        }
        if let Some(registry) = ctx.registry.as_deref_mut() {
            registry.notify_enter(tile, self.entity);
        }
        trace!(entity = ?self.entity, %tile, "move_completed");

        let chained = self.sliding && self.continue_slide(ctx);
        TickOutcome::Arrived { tile, chained }
    }

    fn apply_elevation_change(&mut self, ctx: &mut MovementContext<'_>) {
        let Some(coordinator) = ctx.coordinator.as_deref_mut() else {
            return;
        };
        let delta = coordinator.classify(self.tile).elevation_delta;
        if delta == 0 {
            return;
        }
        let landed = self.tile.with_elevation(self.tile.elevation + delta);
        if let Err(err) = coordinator.move_entity(self.entity, self.tile, landed) {
            warn!(entity = ?self.entity, tile = %self.tile, error = %err, "elevation_change_refused");
            return;
        }
        debug!(entity = ?self.entity, from = %self.tile, to = %landed, "elevation_changed");
        self.tile = landed;
        self.world_position.z = landed.elevation as f32 * self.config.layer_depth;
        self.target_world = self.world_position;
    }

    /// One continuation step per completed slide step; the tick loop drives
    /// the chain, so its depth never grows the call stack.
    fn continue_slide(&mut self, ctx: &mut MovementContext<'_>) -> bool {
        if self.slide_chain >= self.config.max_slide_chain {
            debug!(entity = ?self.entity, tile = %self.tile, chain = self.slide_chain, "slide_chain_capped");
            self.sliding = false;
            return false;
        }
        let direction = self.facing;
        let next = self.tile.neighbor(direction);
        let outcome = self.query(next, direction, ctx);
        if !outcome.allowed {
            self.sliding = false;
            return false;
        }
        self.slide_chain += 1;
        self.begin_move(next, direction, outcome.modifier, ctx);
        true
    }

    fn snap_to_tile(&mut self) {
        let center = cell_center(&self.config, self.tile);
        self.start_world = center;
        self.target_world = center;
        self.world_position = center;
    }
}

fn cell_center(config: &MovementConfig, tile: TileCoord) -> Vec3 {
    let half = config.tile_size / 2.0;
    Vec3::new(
        tile.x as f32 * config.tile_size + half,
        tile.y as f32 * config.tile_size + half,
        tile.elevation as f32 * config.layer_depth,
    )
}
