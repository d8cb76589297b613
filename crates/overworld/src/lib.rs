pub mod coordinator;
pub mod grid;
pub mod level;
pub mod motion;
pub mod registry;
pub mod terrain;
pub mod triggers;
pub mod world;

pub use coordinator::{MoveOutcome, MovementCoordinator, OccupancyError, TerrainEvent};
pub use grid::{
    Direction, EntityId, MovementModifier, ObjectId, TileCoord, TriggerId, UnknownToken, Vec3,
};
pub use level::{
    load_level, parse_level, LevelData, LevelErrorCode, LevelLoadError, ObjectPlacement,
    SourceLocation,
};
pub use motion::{
    sample_world_position, GridMovementController, MovementConfig, MovementConfigError,
    MovementContext, TickOutcome,
};
pub use registry::{Capability, Interactable, TileEntityRegistry, TileObject, TriggerObserver};
pub use terrain::{TerrainClassification, TerrainMap, TerrainSource};
pub use triggers::{TileTrigger, TileTriggerDispatcher, TriggerAction, TriggerEvent, TriggerPhase};
pub use world::{Overworld, WorldError};
