//! Tile entity registry.
//!
//! Arena of tile objects (chests, doors, signs, pressure plates) plus a
//! multi-valued index from tile coordinate to the objects registered there.
//! Capabilities are fixed when an object is inserted, so notification never
//! probes an object for what it supports.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::debug;

use crate::grid::{EntityId, ObjectId, TileCoord};

/// Notified when a mover finishes entering, or starts leaving, a tile the
/// object is registered at.
pub trait TriggerObserver {
    fn on_entity_enter(&mut self, mover: EntityId);
    fn on_entity_exit(&mut self, mover: EntityId);
}

pub trait Interactable {
    fn can_interact(&self, actor: EntityId) -> bool;
    fn interact(&mut self, actor: EntityId);
    fn interaction_prompt(&self) -> Option<String>;
    /// Higher wins when several candidates are in reach.
    fn interaction_priority(&self) -> i32 {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Any,
    TriggerObserver,
    Interactable,
}

pub struct TileObject {
    label: String,
    observer: Option<Box<dyn TriggerObserver>>,
    interactable: Option<Box<dyn Interactable>>,
}

impl TileObject {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            observer: None,
            interactable: None,
        }
    }

    pub fn with_observer(mut self, observer: impl TriggerObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn with_interactable(mut self, interactable: impl Interactable + 'static) -> Self {
        self.interactable = Some(Box::new(interactable));
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Any => true,
            Capability::TriggerObserver => self.observer.is_some(),
            Capability::Interactable => self.interactable.is_some(),
        }
    }
}

struct ObjectSlot {
    object: TileObject,
    /// Registration order; the first entry is the anchor used for distance ties.
    tiles: Vec<TileCoord>,
    insertion_order: u64,
}

#[derive(Default)]
pub struct TileEntityRegistry {
    next_object_id: u64,
    objects: HashMap<ObjectId, ObjectSlot>,
    by_tile: HashMap<TileCoord, Vec<ObjectId>>,
}

impl TileEntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: TileObject) -> ObjectId {
        let id = ObjectId(self.next_object_id);
        self.next_object_id = self.next_object_id.saturating_add(1);
        self.objects.insert(
            id,
            ObjectSlot {
                object,
                tiles: Vec::new(),
                insertion_order: id.0,
            },
        );
        id
    }

    /// Drops the object together with every tile membership it still holds.
    pub fn remove(&mut self, id: ObjectId) -> Option<TileObject> {
        self.unregister_all(id);
        self.objects.remove(&id).map(|slot| slot.object)
    }

    pub fn register(&mut self, id: ObjectId, tile: TileCoord) -> bool {
        let Some(slot) = self.objects.get_mut(&id) else {
            debug!(object = ?id, %tile, "register_unknown_object");
            return false;
        };
        if slot.tiles.contains(&tile) {
            return false;
        }
        slot.tiles.push(tile);
        self.by_tile.entry(tile).or_default().push(id);
        true
    }

    pub fn unregister(&mut self, id: ObjectId, tile: TileCoord) -> bool {
        let Some(members) = self.by_tile.get_mut(&tile) else {
            return false;
        };
        let Some(position) = members.iter().position(|member| *member == id) else {
            return false;
        };
        members.remove(position);
        if members.is_empty() {
            self.by_tile.remove(&tile);
        }
        if let Some(slot) = self.objects.get_mut(&id) {
            slot.tiles.retain(|registered| *registered != tile);
        }
        true
    }

    /// Registers a multi-tile object once per cell. Returns how many cells were
    /// newly registered.
    pub fn register_footprint(
        &mut self,
        id: ObjectId,
        tiles: impl IntoIterator<Item = TileCoord>,
    ) -> usize {
        tiles
            .into_iter()
            .filter(|tile| self.register(id, *tile))
            .count()
    }

    pub fn unregister_all(&mut self, id: ObjectId) -> usize {
        let tiles = match self.objects.get(&id) {
            Some(slot) => slot.tiles.clone(),
            None => return 0,
        };
        tiles
            .into_iter()
            .filter(|tile| self.unregister(id, *tile))
            .count()
    }

    /// Objects registered at `tile` that support `capability`, in registration
    /// order. Unknown tiles yield nothing.
    pub fn get(
        &self,
        tile: TileCoord,
        capability: Capability,
    ) -> impl Iterator<Item = ObjectId> + '_ {
        self.by_tile
            .get(&tile)
            .into_iter()
            .flatten()
            .copied()
            .filter(move |id| {
                self.objects
                    .get(id)
                    .is_some_and(|slot| slot.object.has(capability))
            })
    }

    pub fn tiles_of(&self, id: ObjectId) -> &[TileCoord] {
        self.objects
            .get(&id)
            .map(|slot| slot.tiles.as_slice())
            .unwrap_or(&[])
    }

    pub fn object(&self, id: ObjectId) -> Option<&TileObject> {
        self.objects.get(&id).map(|slot| &slot.object)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn occupied_tile_count(&self) -> usize {
        self.by_tile.len()
    }

    pub fn notify_enter(&mut self, tile: TileCoord, mover: EntityId) -> usize {
        self.notify(tile, |observer| observer.on_entity_enter(mover))
    }

    pub fn notify_exit(&mut self, tile: TileCoord, mover: EntityId) -> usize {
        self.notify(tile, |observer| observer.on_entity_exit(mover))
    }

    fn notify(&mut self, tile: TileCoord, mut call: impl FnMut(&mut dyn TriggerObserver)) -> usize {
        let Some(members) = self.by_tile.get(&tile) else {
            return 0;
        };
        let mut notified = 0;
        for id in members {
            let observer = self
                .objects
                .get_mut(id)
                .and_then(|slot| slot.object.observer.as_deref_mut());
            if let Some(observer) = observer {
                call(observer);
                notified += 1;
            }
        }
        notified
    }

    /// Picks the interactable the actor would use. Candidates come from every
    /// tile in `reach`; highest priority wins, then the object whose anchor tile
    /// is nearest to `actor_tile`, then the earliest inserted.
    pub fn best_interactable(
        &self,
        actor: EntityId,
        actor_tile: TileCoord,
        reach: &[TileCoord],
    ) -> Option<ObjectId> {
        let mut best: Option<(i32, f32, u64, ObjectId)> = None;
        for tile in reach {
            for id in self.get(*tile, Capability::Interactable) {
                let Some(slot) = self.objects.get(&id) else {
                    continue;
                };
                let Some(interactable) = slot.object.interactable.as_deref() else {
                    continue;
                };
                if !interactable.can_interact(actor) {
                    continue;
                }
                let anchor = slot.tiles.first().copied().unwrap_or(*tile);
                let candidate = (
                    interactable.interaction_priority(),
                    actor_tile.planar_distance(anchor),
                    slot.insertion_order,
                    id,
                );
                let replace = match &best {
                    None => true,
                    Some(current) => compare_candidates(&candidate, current) == Ordering::Less,
                };
                if replace {
                    best = Some(candidate);
                }
            }
        }
        best.map(|(_, _, _, id)| id)
    }

    pub fn interact(&mut self, id: ObjectId, actor: EntityId) -> bool {
        let Some(interactable) = self
            .objects
            .get_mut(&id)
            .and_then(|slot| slot.object.interactable.as_deref_mut())
        else {
            return false;
        };
        if !interactable.can_interact(actor) {
            return false;
        }
        interactable.interact(actor);
        true
    }

    pub fn interaction_prompt(&self, id: ObjectId) -> Option<String> {
        self.objects
            .get(&id)
            .and_then(|slot| slot.object.interactable.as_deref())
            .and_then(|interactable| interactable.interaction_prompt())
    }
}

fn compare_candidates(a: &(i32, f32, u64, ObjectId), b: &(i32, f32, u64, ObjectId)) -> Ordering {
    b.0.cmp(&a.0)
        .then_with(|| a.1.total_cmp(&b.1))
        .then_with(|| a.2.cmp(&b.2))
}
