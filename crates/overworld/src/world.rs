//! Overworld facade: owns the shared collaborators and every grid mover.
//!
//! Movers tick in entity-id order, one at a time, so each tick has a single
//! writer for the occupancy record and the registries.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info};

use crate::coordinator::{MovementCoordinator, OccupancyError, TerrainEvent};
use crate::grid::{Direction, EntityId, TileCoord};
use crate::level::LevelData;
use crate::motion::{GridMovementController, MovementConfig, MovementContext, TickOutcome};
use crate::registry::TileEntityRegistry;
use crate::triggers::{TileTriggerDispatcher, TriggerEvent};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("entity {0:?} is already spawned")]
    AlreadySpawned(EntityId),
    #[error("entity {0:?} is not spawned")]
    UnknownMover(EntityId),
    #[error(transparent)]
    Occupancy(#[from] OccupancyError),
}

pub struct Overworld {
    config: MovementConfig,
    coordinator: Option<MovementCoordinator>,
    registry: Option<TileEntityRegistry>,
    triggers: Option<TileTriggerDispatcher>,
    movers: BTreeMap<EntityId, GridMovementController>,
}

impl Overworld {
    /// Every collaborator present and empty.
    pub fn new(config: MovementConfig) -> Self {
        Self {
            config,
            coordinator: Some(MovementCoordinator::default()),
            registry: Some(TileEntityRegistry::new()),
            triggers: Some(TileTriggerDispatcher::new()),
            movers: BTreeMap::new(),
        }
    }

    /// No collaborators: movement is unchecked until some are installed.
    pub fn detached(config: MovementConfig) -> Self {
        Self {
            config,
            coordinator: None,
            registry: None,
            triggers: None,
            movers: BTreeMap::new(),
        }
    }

    /// Terrain and triggers come from the level; objects are left to the
    /// caller since their behavior is game specific.
    pub fn from_level(level: LevelData, config: MovementConfig) -> Self {
        let mut triggers = TileTriggerDispatcher::new();
        for trigger in level.triggers {
            triggers.add(trigger);
        }
        info!(
            level = %level.name,
            tiles = level.terrain.len(),
            triggers = triggers.len(),
            "overworld_loaded"
        );
        Self {
            config,
            coordinator: Some(MovementCoordinator::new(level.terrain)),
            registry: Some(TileEntityRegistry::new()),
            triggers: Some(triggers),
            movers: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &MovementConfig {
        &self.config
    }

    pub fn coordinator(&self) -> Option<&MovementCoordinator> {
        self.coordinator.as_ref()
    }

    pub fn coordinator_mut(&mut self) -> Option<&mut MovementCoordinator> {
        self.coordinator.as_mut()
    }

    pub fn set_coordinator(&mut self, coordinator: Option<MovementCoordinator>) {
        self.coordinator = coordinator;
    }

    pub fn registry(&self) -> Option<&TileEntityRegistry> {
        self.registry.as_ref()
    }

    pub fn registry_mut(&mut self) -> Option<&mut TileEntityRegistry> {
        self.registry.as_mut()
    }

    pub fn set_registry(&mut self, registry: Option<TileEntityRegistry>) {
        self.registry = registry;
    }

    pub fn triggers(&self) -> Option<&TileTriggerDispatcher> {
        self.triggers.as_ref()
    }

    pub fn triggers_mut(&mut self) -> Option<&mut TileTriggerDispatcher> {
        self.triggers.as_mut()
    }

    pub fn set_triggers(&mut self, triggers: Option<TileTriggerDispatcher>) {
        self.triggers = triggers;
    }

    pub fn mover(&self, entity: EntityId) -> Option<&GridMovementController> {
        self.movers.get(&entity)
    }

    pub fn movers(&self) -> impl Iterator<Item = &GridMovementController> {
        self.movers.values()
    }

    pub fn mover_count(&self) -> usize {
        self.movers.len()
    }

    pub fn spawn_mover(&mut self, entity: EntityId, tile: TileCoord) -> Result<(), WorldError> {
        if self.movers.contains_key(&entity) {
            return Err(WorldError::AlreadySpawned(entity));
        }
        let mut controller = GridMovementController::new(entity, tile, self.config);
        let (_, mut ctx) = self.split();
        controller.activate(&mut ctx)?;
        self.movers.insert(entity, controller);
        info!(entity = ?entity, %tile, "mover_spawned");
        Ok(())
    }

    pub fn despawn_mover(&mut self, entity: EntityId) -> Option<GridMovementController> {
        let mut controller = self.movers.remove(&entity)?;
        let (_, mut ctx) = self.split();
        controller.deactivate(&mut ctx);
        info!(entity = ?entity, tile = %controller.tile(), "mover_despawned");
        Some(controller)
    }

    pub fn command_move(&mut self, entity: EntityId, direction: Direction) -> bool {
        let (movers, mut ctx) = self.split();
        match movers.get_mut(&entity) {
            Some(controller) => controller.try_move(direction, &mut ctx),
            None => {
                debug!(entity = ?entity, "move_for_unknown_mover");
                false
            }
        }
    }

    pub fn command_interact(&mut self, entity: EntityId) -> bool {
        let (movers, mut ctx) = self.split();
        movers
            .get_mut(&entity)
            .is_some_and(|controller| controller.try_interact(&mut ctx))
    }

    pub fn command_stop(&mut self, entity: EntityId) -> bool {
        match self.movers.get_mut(&entity) {
            Some(controller) => {
                controller.force_stop();
                true
            }
            None => false,
        }
    }

    pub fn teleport_mover(&mut self, entity: EntityId, tile: TileCoord) -> Result<(), WorldError> {
        let (movers, mut ctx) = self.split();
        let controller = movers
            .get_mut(&entity)
            .ok_or(WorldError::UnknownMover(entity))?;
        controller.teleport(tile, &mut ctx)?;
        Ok(())
    }

    pub fn is_blocked(&mut self, entity: EntityId, direction: Direction) -> bool {
        let (movers, ctx) = self.split();
        movers
            .get(&entity)
            .map_or(true, |controller| controller.is_blocked(direction, &ctx))
    }

    pub fn interaction_prompt(&mut self, entity: EntityId) -> Option<String> {
        let (movers, ctx) = self.split();
        movers.get(&entity)?.interaction_prompt(&ctx)
    }

    /// Advances every mover by `dt` seconds.
    pub fn update(&mut self, dt: f32) -> Vec<(EntityId, TickOutcome)> {
        let (movers, mut ctx) = self.split();
        movers
            .iter_mut()
            .map(|(entity, controller)| (*entity, controller.update(dt, &mut ctx)))
            .collect()
    }

    pub fn drain_terrain_events(&mut self) -> Vec<TerrainEvent> {
        self.coordinator
            .as_mut()
            .map(|coordinator| coordinator.drain_events().collect())
            .unwrap_or_default()
    }

    pub fn drain_trigger_events(&mut self) -> Vec<TriggerEvent> {
        self.triggers
            .as_mut()
            .map(|triggers| triggers.drain().collect())
            .unwrap_or_default()
    }

    fn split(&mut self) -> (&mut BTreeMap<EntityId, GridMovementController>, MovementContext<'_>) {
        let Self {
            coordinator,
            registry,
            triggers,
            movers,
            ..
        } = self;
        (
            movers,
            MovementContext::new(coordinator.as_mut(), registry.as_mut(), triggers.as_mut()),
        )
    }
}
