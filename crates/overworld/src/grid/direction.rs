use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Self::Up, Self::Down, Self::Left, Self::Right];

    /// Grid delta for one step. Up is +y, Right is +x.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Self::Up => (0, 1),
            Self::Down => (0, -1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    pub fn as_token(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown token '{0}'")]
pub struct UnknownToken(pub String);

impl FromStr for Direction {
    type Err = UnknownToken;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "up" | "north" => Ok(Self::Up),
            "down" | "south" => Ok(Self::Down),
            "left" | "west" => Ok(Self::Left),
            "right" | "east" => Ok(Self::Right),
            _ => Err(UnknownToken(value.to_string())),
        }
    }
}

/// Terrain-imposed movement behavior applied to an entity entering a tile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementModifier {
    #[default]
    Normal,
    Slow,
    Slide,
    Swim,
    Jump,
    Encounter,
}

impl MovementModifier {
    pub const ALL: [MovementModifier; 6] = [
        Self::Normal,
        Self::Slow,
        Self::Slide,
        Self::Swim,
        Self::Jump,
        Self::Encounter,
    ];

    pub fn speed_multiplier(self) -> f32 {
        match self {
            Self::Normal => 1.0,
            Self::Slow => 0.5,
            Self::Slide => 2.0,
            Self::Swim => 0.75,
            Self::Jump => 0.5,
            Self::Encounter => 1.0,
        }
    }

    pub fn is_slide(self) -> bool {
        matches!(self, Self::Slide)
    }

    pub fn is_jump(self) -> bool {
        matches!(self, Self::Jump)
    }

    pub fn is_swim(self) -> bool {
        matches!(self, Self::Swim)
    }

    pub fn triggers_encounter(self) -> bool {
        matches!(self, Self::Encounter)
    }

    pub fn as_token(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Slow => "slow",
            Self::Slide => "slide",
            Self::Swim => "swim",
            Self::Jump => "jump",
            Self::Encounter => "encounter",
        }
    }
}

impl fmt::Display for MovementModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

impl FromStr for MovementModifier {
    type Err = UnknownToken;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let token = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|modifier| modifier.as_token() == token)
            .ok_or_else(|| UnknownToken(value.to_string()))
    }
}
