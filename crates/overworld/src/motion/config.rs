use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tuning shared by every grid mover.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Tiles per second before the terrain multiplier.
    pub base_speed: f32,
    /// World units per tile edge.
    pub tile_size: f32,
    /// Peak of the ledge-jump arc, in world units.
    pub jump_height: f32,
    /// World z per elevation layer.
    pub layer_depth: f32,
    /// Upper bound on consecutive slide continuations from one command.
    pub max_slide_chain: u32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            base_speed: 4.0,
            tile_size: 1.0,
            jump_height: 0.5,
            layer_depth: 1.0,
            max_slide_chain: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MovementConfigError {
    #[error("{field} must be finite and greater than zero (got {value})")]
    NotPositive { field: &'static str, value: f32 },
    #[error("{field} must be finite (got {value})")]
    NotFinite { field: &'static str, value: f32 },
    #[error("jump_height must be finite and not negative (got {0})")]
    NegativeJumpHeight(f32),
    #[error("max_slide_chain must be at least 1")]
    ZeroSlideChain,
}

impl MovementConfig {
    pub fn validate(&self) -> Result<(), MovementConfigError> {
        require_positive("base_speed", self.base_speed)?;
        require_positive("tile_size", self.tile_size)?;
        if !self.layer_depth.is_finite() {
            return Err(MovementConfigError::NotFinite {
                field: "layer_depth",
                value: self.layer_depth,
            });
        }
        if !self.jump_height.is_finite() || self.jump_height < 0.0 {
            return Err(MovementConfigError::NegativeJumpHeight(self.jump_height));
        }
        if self.max_slide_chain == 0 {
            return Err(MovementConfigError::ZeroSlideChain);
        }
        Ok(())
    }
}

fn require_positive(field: &'static str, value: f32) -> Result<(), MovementConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(MovementConfigError::NotPositive { field, value })
    }
}
