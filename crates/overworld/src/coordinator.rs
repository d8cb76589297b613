//! Movement/occupancy coordinator.
//!
//! Answers "may this mover step from A to B" by combining the terrain source,
//! the occupancy record of moving entities and direction-keyed tile rules.
//! The occupancy record tracks destinations, not visual positions: a claim
//! moves the instant a step is accepted.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::grid::{Direction, EntityId, MovementModifier, TileCoord};
use crate::terrain::{TerrainClassification, TerrainSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    pub allowed: bool,
    /// Only meaningful when `allowed` is true.
    pub modifier: MovementModifier,
}

impl MoveOutcome {
    pub const BLOCKED: MoveOutcome = MoveOutcome {
        allowed: false,
        modifier: MovementModifier::Normal,
    };

    /// Result used when no coordinator exists: movement proceeds unchecked.
    pub const UNCHECKED: MoveOutcome = MoveOutcome {
        allowed: true,
        modifier: MovementModifier::Normal,
    };

    pub fn allowed(modifier: MovementModifier) -> Self {
        Self {
            allowed: true,
            modifier,
        }
    }
}

/// Built-in terrain behaviors raised by the enter/exit hooks. The game drains
/// these once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerrainEvent {
    Damage {
        entity: EntityId,
        tile: TileCoord,
        amount: u32,
    },
    EncounterCheck {
        entity: EntityId,
        tile: TileCoord,
    },
    Collapsed {
        entity: EntityId,
        tile: TileCoord,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OccupancyError {
    #[error("tile {tile} is already claimed by entity {}", .owner.0)]
    TileClaimed { tile: TileCoord, owner: EntityId },
}

#[derive(Default)]
pub struct MovementCoordinator {
    terrain: Option<Box<dyn TerrainSource>>,
    owner_by_tile: HashMap<TileCoord, EntityId>,
    claim_by_entity: HashMap<EntityId, TileCoord>,
    landing_by_entity: HashMap<EntityId, TileCoord>,
    collapsed: HashSet<TileCoord>,
    events: Vec<TerrainEvent>,
}

impl MovementCoordinator {
    pub fn new(terrain: impl TerrainSource + 'static) -> Self {
        Self {
            terrain: Some(Box::new(terrain)),
            ..Self::default()
        }
    }

    pub fn set_terrain(&mut self, terrain: impl TerrainSource + 'static) {
        self.terrain = Some(Box::new(terrain));
        self.collapsed.clear();
    }

    pub fn has_terrain(&self) -> bool {
        self.terrain.is_some()
    }

    /// Effective classification: collapsed tiles read as walls, unknown tiles as
    /// plain ground.
    pub fn classify(&self, tile: TileCoord) -> TerrainClassification {
        if self.collapsed.contains(&tile) {
            return TerrainClassification::wall();
        }
        match &self.terrain {
            Some(terrain) => terrain.classify_or_default(tile),
            None => TerrainClassification::default(),
        }
    }

    pub fn can_move(
        &self,
        from: TileCoord,
        to: TileCoord,
        direction: Direction,
        mover: EntityId,
    ) -> MoveOutcome {
        let classification = self.classify(to);
        if classification.blocking {
            trace!(entity = ?mover, %from, %to, "move_refused_terrain");
            return MoveOutcome::BLOCKED;
        }
        if !classification.admits(direction) {
            trace!(entity = ?mover, %from, %to, %direction, "move_refused_one_way");
            return MoveOutcome::BLOCKED;
        }
        if self.is_claimed_by_other(to, mover) {
            trace!(entity = ?mover, %from, %to, "move_refused_occupied");
            return MoveOutcome::BLOCKED;
        }
        if classification.elevation_delta != 0 {
            let landing = to.with_elevation(to.elevation + classification.elevation_delta);
            if self.is_claimed_by_other(landing, mover) {
                trace!(entity = ?mover, %from, %landing, "move_refused_landing_occupied");
                return MoveOutcome::BLOCKED;
            }
        }
        MoveOutcome::allowed(classification.modifier)
    }

    pub fn register_entity(
        &mut self,
        entity: EntityId,
        tile: TileCoord,
    ) -> Result<(), OccupancyError> {
        if let Some(owner) = self.owner_of(tile) {
            if owner != entity {
                return Err(OccupancyError::TileClaimed { tile, owner });
            }
            if self.claim_of(entity) == Some(tile) {
                return Ok(());
            }
        }
        self.release_landing(entity);
        if let Some(previous) = self.claim_by_entity.insert(entity, tile) {
            self.owner_by_tile.remove(&previous);
        }
        self.owner_by_tile.insert(tile, entity);
        debug!(entity = ?entity, %tile, "occupancy_registered");
        Ok(())
    }

    pub fn unregister_entity(&mut self, entity: EntityId) -> Option<TileCoord> {
        self.release_landing(entity);
        let Some(tile) = self.claim_by_entity.remove(&entity) else {
            debug!(entity = ?entity, "occupancy_unregister_without_claim");
            return None;
        };
        if self.owner_by_tile.get(&tile) == Some(&entity) {
            self.owner_by_tile.remove(&tile);
        }
        Some(tile)
    }

    /// Transfers a claim from `from` to `to` in one step. The old tile is only
    /// released once the new claim is known to succeed. Any landing
    /// reservation the entity holds is consumed by the transfer.
    pub fn move_entity(
        &mut self,
        entity: EntityId,
        from: TileCoord,
        to: TileCoord,
    ) -> Result<(), OccupancyError> {
        if let Some(owner) = self.owner_of(to) {
            if owner != entity {
                return Err(OccupancyError::TileClaimed { tile: to, owner });
            }
        }

        match self.claim_by_entity.get(&entity).copied() {
            Some(recorded) => {
                if recorded != from {
                    warn!(
                        entity = ?entity,
                        %recorded,
                        %from,
                        "occupancy_desync; transferring recorded claim"
                    );
                }
                if self.owner_by_tile.get(&recorded) == Some(&entity) {
                    self.owner_by_tile.remove(&recorded);
                }
            }
            None => {
                debug!(entity = ?entity, %to, "occupancy_move_without_claim; claiming destination");
            }
        }

        if let Some(landing) = self.landing_by_entity.remove(&entity) {
            if landing != to && self.owner_by_tile.get(&landing) == Some(&entity) {
                self.owner_by_tile.remove(&landing);
            }
        }
        self.owner_by_tile.insert(to, entity);
        self.claim_by_entity.insert(entity, to);
        Ok(())
    }

    /// Holds the cell a jump will land on, alongside the entity's claim, so no
    /// other mover can take it mid-air. Replaces any earlier reservation.
    pub fn reserve_landing(&mut self, entity: EntityId, tile: TileCoord) -> Result<(), OccupancyError> {
        if let Some(owner) = self.owner_of(tile) {
            if owner != entity {
                return Err(OccupancyError::TileClaimed { tile, owner });
            }
        }
        self.release_landing(entity);
        self.owner_by_tile.insert(tile, entity);
        self.landing_by_entity.insert(entity, tile);
        trace!(entity = ?entity, %tile, "landing_reserved");
        Ok(())
    }

    pub fn landing_of(&self, entity: EntityId) -> Option<TileCoord> {
        self.landing_by_entity.get(&entity).copied()
    }

    pub fn trigger_enter(&mut self, entity: EntityId, tile: TileCoord) {
        let classification = self.classify(tile);
        if classification.damage_on_entry > 0 {
            self.events.push(TerrainEvent::Damage {
                entity,
                tile,
                amount: classification.damage_on_entry,
            });
        }
        if classification.modifier.triggers_encounter() {
            self.events.push(TerrainEvent::EncounterCheck { entity, tile });
        }
    }

    pub fn trigger_exit(&mut self, entity: EntityId, tile: TileCoord, direction: Direction) {
        let classification = self.classify(tile);
        if classification.collapses_on_exit && self.collapsed.insert(tile) {
            debug!(entity = ?entity, %tile, %direction, "tile_collapsed");
            self.events.push(TerrainEvent::Collapsed { entity, tile });
        }
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = TerrainEvent> + '_ {
        self.events.drain(..)
    }

    pub fn pending_events(&self) -> &[TerrainEvent] {
        &self.events
    }

    pub fn owner_of(&self, tile: TileCoord) -> Option<EntityId> {
        self.owner_by_tile.get(&tile).copied()
    }

    pub fn claim_of(&self, entity: EntityId) -> Option<TileCoord> {
        self.claim_by_entity.get(&entity).copied()
    }

    pub fn claimed_tile_count(&self) -> usize {
        self.owner_by_tile.len()
    }

    pub fn is_collapsed(&self, tile: TileCoord) -> bool {
        self.collapsed.contains(&tile)
    }

    fn release_landing(&mut self, entity: EntityId) {
        let Some(landing) = self.landing_by_entity.remove(&entity) else {
            return;
        };
        let is_claim = self.claim_by_entity.get(&entity) == Some(&landing);
        if !is_claim && self.owner_by_tile.get(&landing) == Some(&entity) {
            self.owner_by_tile.remove(&landing);
        }
    }

    fn is_claimed_by_other(&self, tile: TileCoord, mover: EntityId) -> bool {
        self.owner_of(tile).is_some_and(|owner| owner != mover)
    }
}
