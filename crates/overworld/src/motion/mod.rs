mod config;
mod context;
mod controller;

pub use config::{MovementConfig, MovementConfigError};
pub use context::MovementContext;
pub use controller::{sample_world_position, GridMovementController, TickOutcome};
