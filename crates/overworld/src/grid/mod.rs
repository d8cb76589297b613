mod coord;
mod direction;

pub use coord::{EntityId, ObjectId, TileCoord, TriggerId, Vec3};
pub use direction::{Direction, MovementModifier, UnknownToken};
