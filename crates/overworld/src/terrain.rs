use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::grid::{Direction, MovementModifier, TileCoord};

/// What a tile imposes on movement. A coordinate with no classification is
/// treated as `TerrainClassification::default()`: passable, no modifier, no
/// elevation change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainClassification {
    pub blocking: bool,
    pub modifier: MovementModifier,
    /// Added to the mover's elevation when it lands on this tile (ledges, stairs).
    pub elevation_delta: i32,
    /// One-way tile: only enterable while travelling in this direction.
    pub entry: Option<Direction>,
    pub damage_on_entry: u32,
    /// The tile turns blocking once an entity walks off it.
    pub collapses_on_exit: bool,
}

impl TerrainClassification {
    pub fn passable(modifier: MovementModifier) -> Self {
        Self {
            modifier,
            ..Self::default()
        }
    }

    pub fn wall() -> Self {
        Self {
            blocking: true,
            ..Self::default()
        }
    }

    pub fn ledge(entry: Direction, elevation_delta: i32) -> Self {
        Self {
            modifier: MovementModifier::Jump,
            elevation_delta,
            entry: Some(entry),
            ..Self::default()
        }
    }

    pub fn admits(&self, direction: Direction) -> bool {
        !self.blocking && self.entry.map_or(true, |entry| entry == direction)
    }
}

/// Read-only terrain lookup supplied by level data. Implementations must not
/// change while a tick is running.
pub trait TerrainSource {
    fn classify(&self, tile: TileCoord) -> Option<TerrainClassification>;

    fn classify_or_default(&self, tile: TileCoord) -> TerrainClassification {
        self.classify(tile).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerrainMap {
    tiles: HashMap<TileCoord, TerrainClassification>,
}

impl TerrainMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, tile: TileCoord, classification: TerrainClassification) {
        self.tiles.insert(tile, classification);
    }

    pub fn clear(&mut self, tile: TileCoord) -> Option<TerrainClassification> {
        self.tiles.remove(&tile)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TileCoord, &TerrainClassification)> {
        self.tiles.iter()
    }

    /// Fills a horizontal run of tiles on one elevation, convenient for tests
    /// and scripted corridors.
    pub fn set_row(
        &mut self,
        start: TileCoord,
        classifications: impl IntoIterator<Item = TerrainClassification>,
    ) {
        for (offset, classification) in classifications.into_iter().enumerate() {
            let tile = TileCoord::new(start.x + offset as i32, start.y, start.elevation);
            self.set(tile, classification);
        }
    }
}

impl TerrainSource for TerrainMap {
    fn classify(&self, tile: TileCoord) -> Option<TerrainClassification> {
        self.tiles.get(&tile).copied()
    }
}
