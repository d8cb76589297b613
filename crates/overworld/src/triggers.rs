//! Tile trigger dispatcher.
//!
//! A coordinate-keyed event channel that runs alongside the registry's
//! observer notification. Triggers are plain data (usually authored in the
//! level file); firing one queues a [`TriggerEvent`] for the game to drain.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::grid::{Direction, EntityId, TileCoord, TriggerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPhase {
    Enter,
    Exit,
    Interact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TriggerAction {
    Warp { target: TileCoord },
    Message { text: String },
    Script { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileTrigger {
    pub tile: TileCoord,
    pub phase: TriggerPhase,
    /// Enter/exit: direction of travel. Interact: the actor's facing.
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(flatten)]
    pub action: TriggerAction,
    #[serde(default)]
    pub once: bool,
}

impl TileTrigger {
    pub fn new(tile: TileCoord, phase: TriggerPhase, action: TriggerAction) -> Self {
        Self {
            tile,
            phase,
            direction: None,
            action,
            once: false,
        }
    }

    pub fn facing(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    fn matches(&self, phase: TriggerPhase, direction: Direction) -> bool {
        self.phase == phase && self.direction.map_or(true, |wanted| wanted == direction)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub trigger: TriggerId,
    pub entity: EntityId,
    pub tile: TileCoord,
    pub phase: TriggerPhase,
    pub direction: Direction,
    pub action: TriggerAction,
}

#[derive(Default)]
pub struct TileTriggerDispatcher {
    next_trigger_id: u64,
    triggers: BTreeMap<TriggerId, TileTrigger>,
    by_tile: HashMap<TileCoord, Vec<TriggerId>>,
    events: Vec<TriggerEvent>,
}

impl TileTriggerDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, trigger: TileTrigger) -> TriggerId {
        let id = TriggerId(self.next_trigger_id);
        self.next_trigger_id = self.next_trigger_id.saturating_add(1);
        self.by_tile.entry(trigger.tile).or_default().push(id);
        self.triggers.insert(id, trigger);
        id
    }

    pub fn remove(&mut self, id: TriggerId) -> Option<TileTrigger> {
        let trigger = self.triggers.remove(&id)?;
        if let Some(ids) = self.by_tile.get_mut(&trigger.tile) {
            ids.retain(|candidate| *candidate != id);
            if ids.is_empty() {
                self.by_tile.remove(&trigger.tile);
            }
        }
        Some(trigger)
    }

    pub fn get(&self, id: TriggerId) -> Option<&TileTrigger> {
        self.triggers.get(&id)
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    pub fn on_tile_enter(&mut self, entity: EntityId, tile: TileCoord, direction: Direction) -> usize {
        self.fire(entity, tile, TriggerPhase::Enter, direction)
    }

    pub fn on_tile_exit(&mut self, entity: EntityId, tile: TileCoord, direction: Direction) -> usize {
        self.fire(entity, tile, TriggerPhase::Exit, direction)
    }

    /// Fires interact triggers on `tile`. Returns whether anything fired.
    pub fn try_interact(&mut self, entity: EntityId, tile: TileCoord, facing: Direction) -> bool {
        self.fire(entity, tile, TriggerPhase::Interact, facing) > 0
    }

    pub fn drain(&mut self) -> impl Iterator<Item = TriggerEvent> + '_ {
        self.events.drain(..)
    }

    pub fn pending_events(&self) -> &[TriggerEvent] {
        &self.events
    }

    fn fire(
        &mut self,
        entity: EntityId,
        tile: TileCoord,
        phase: TriggerPhase,
        direction: Direction,
    ) -> usize {
        let Some(ids) = self.by_tile.get(&tile) else {
            return 0;
        };
        let matched: Vec<TriggerId> = ids
            .iter()
            .copied()
            .filter(|id| {
                self.triggers
                    .get(id)
                    .is_some_and(|trigger| trigger.matches(phase, direction))
            })
            .collect();

        for id in &matched {
            let Some(trigger) = self.triggers.get(id) else {
                continue;
            };
            debug!(trigger = id.0, entity = ?entity, %tile, ?phase, %direction, "trigger_fired");
            self.events.push(TriggerEvent {
                trigger: *id,
                entity,
                tile,
                phase,
                direction,
                action: trigger.action.clone(),
            });
            if trigger.once {
                self.remove(*id);
            }
        }
        matched.len()
    }
}
