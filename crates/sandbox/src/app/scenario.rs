use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use overworld::{Direction, MovementConfig, TileCoord};
use serde::Deserialize;

use super::SandboxError;

const DEFAULT_TICK_RATE: u32 = 60;
const DEFAULT_FRAME_MS: u64 = 16;
const DEFAULT_MAX_FRAME_DELTA_MS: u64 = 250;
const DEFAULT_MAX_TICKS_PER_FRAME: u32 = 5;
const DEFAULT_MAX_FRAMES: u64 = 3_600;
const DEFAULT_REPORT_PATH: &str = "target/overworld_sandbox/report.json";

/// Headless run description. Paths are relative to the project root.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Scenario {
    pub(crate) level: PathBuf,
    #[serde(default)]
    pub(crate) movement: MovementConfig,
    #[serde(default = "default_tick_rate")]
    pub(crate) tick_rate: u32,
    /// Simulated wall-clock length of one frame.
    #[serde(default = "default_frame_ms")]
    pub(crate) frame_ms: u64,
    #[serde(default = "default_max_frame_delta_ms")]
    pub(crate) max_frame_delta_ms: u64,
    #[serde(default = "default_max_ticks_per_frame")]
    pub(crate) max_ticks_per_frame: u32,
    #[serde(default = "default_max_frames")]
    pub(crate) max_frames: u64,
    #[serde(default = "default_report_path")]
    pub(crate) report: PathBuf,
    pub(crate) movers: Vec<MoverSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct MoverSpec {
    pub(crate) id: u64,
    pub(crate) spawn: TileCoord,
    #[serde(default)]
    pub(crate) script: Vec<ScriptCommand>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub(crate) enum ScriptCommand {
    Move(Direction),
    Interact,
    Wait(u32),
    Stop,
    Teleport { x: i32, y: i32 },
}

impl fmt::Display for ScriptCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Move(direction) => write!(f, "move {direction}"),
            Self::Interact => f.write_str("interact"),
            Self::Wait(ticks) => write!(f, "wait {ticks}"),
            Self::Stop => f.write_str("stop"),
            Self::Teleport { x, y } => write!(f, "teleport {x} {y}"),
        }
    }
}

impl FromStr for ScriptCommand {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts = raw.split_whitespace().collect::<Vec<_>>();
        match parts.as_slice() {
            ["move", direction] => direction
                .parse::<Direction>()
                .map(Self::Move)
                .map_err(|err| format!("command '{raw}': {err}")),
            ["interact"] => Ok(Self::Interact),
            ["wait", ticks] => ticks
                .parse::<u32>()
                .map(Self::Wait)
                .map_err(|_| format!("command '{raw}': tick count must be a whole number")),
            ["stop"] => Ok(Self::Stop),
            ["teleport", x, y] => match (x.parse::<i32>(), y.parse::<i32>()) {
                (Ok(x), Ok(y)) => Ok(Self::Teleport { x, y }),
                _ => Err(format!("command '{raw}': coordinates must be integers")),
            },
            _ => Err(format!(
                "unknown command '{raw}'; expected move <dir>, interact, wait <ticks>, stop or teleport <x> <y>"
            )),
        }
    }
}

impl TryFrom<String> for ScriptCommand {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

pub(crate) fn load_scenario(path: &Path) -> Result<Scenario, SandboxError> {
    let raw = fs::read_to_string(path).map_err(|source| SandboxError::ReadScenario {
        path: path.to_path_buf(),
        source,
    })?;
    let scenario = parse_scenario_json(path, &raw)?;
    validate_scenario(path, &scenario)?;
    Ok(scenario)
}

pub(crate) fn parse_scenario_json(path: &Path, raw: &str) -> Result<Scenario, SandboxError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, Scenario>(&mut deserializer).map_err(|error| {
        let json_path = error.path().to_string();
        SandboxError::ParseScenario {
            path: path.to_path_buf(),
            json_path: if json_path.is_empty() {
                ".".to_string()
            } else {
                json_path
            },
            source: error.into_inner(),
        }
    })
}

pub(crate) fn validate_scenario(path: &Path, scenario: &Scenario) -> Result<(), SandboxError> {
    let invalid = |message: String| SandboxError::InvalidScenario {
        path: path.to_path_buf(),
        message,
    };
    if scenario.tick_rate == 0 {
        return Err(invalid("tick_rate must be greater than zero".to_string()));
    }
    if scenario.max_ticks_per_frame == 0 {
        return Err(invalid(
            "max_ticks_per_frame must be greater than zero".to_string(),
        ));
    }
    if scenario.frame_ms == 0 {
        return Err(invalid("frame_ms must be greater than zero".to_string()));
    }
    scenario.movement.validate()?;

    let mut seen = HashSet::new();
    for (index, mover) in scenario.movers.iter().enumerate() {
        if !seen.insert(mover.id) {
            return Err(invalid(format!(
                "movers[{index}]: id {} is used more than once",
                mover.id
            )));
        }
    }
    Ok(())
}

fn default_tick_rate() -> u32 {
    DEFAULT_TICK_RATE
}

fn default_frame_ms() -> u64 {
    DEFAULT_FRAME_MS
}

fn default_max_frame_delta_ms() -> u64 {
    DEFAULT_MAX_FRAME_DELTA_MS
}

fn default_max_ticks_per_frame() -> u32 {
    DEFAULT_MAX_TICKS_PER_FRAME
}

fn default_max_frames() -> u64 {
    DEFAULT_MAX_FRAMES
}

fn default_report_path() -> PathBuf {
    PathBuf::from(DEFAULT_REPORT_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<Scenario, SandboxError> {
        parse_scenario_json(Path::new("scenario.json"), raw)
    }

    #[test]
    fn minimal_scenario_uses_defaults() {
        let scenario = parse(
            r#"{
                "level": "assets/levels/ice_cave.xml",
                "movers": [{ "id": 1, "spawn": { "x": 1, "y": 2 } }]
            }"#,
        )
        .expect("parse");
        assert_eq!(scenario.tick_rate, 60);
        assert_eq!(scenario.max_ticks_per_frame, 5);
        assert_eq!(scenario.movement, MovementConfig::default());
        assert_eq!(scenario.movers[0].spawn, TileCoord::new(1, 2, 0));
        assert!(scenario.movers[0].script.is_empty());
        validate_scenario(Path::new("scenario.json"), &scenario).expect("valid");
    }

    #[test]
    fn script_commands_parse() {
        let scenario = parse(
            r#"{
                "level": "l.xml",
                "movement": { "base_speed": 6.0 },
                "movers": [{
                    "id": 7,
                    "spawn": { "x": 0, "y": 0, "elevation": 1 },
                    "script": ["move north", "wait 3", "interact", "stop", "teleport -2 5"]
                }]
            }"#,
        )
        .expect("parse");
        assert_eq!(scenario.movement.base_speed, 6.0);
        assert_eq!(
            scenario.movers[0].script,
            vec![
                ScriptCommand::Move(Direction::Up),
                ScriptCommand::Wait(3),
                ScriptCommand::Interact,
                ScriptCommand::Stop,
                ScriptCommand::Teleport { x: -2, y: 5 },
            ]
        );
    }

    #[test]
    fn bad_command_reports_json_path() {
        let err = parse(
            r#"{
                "level": "l.xml",
                "movers": [{ "id": 1, "spawn": { "x": 0, "y": 0 }, "script": ["move up", "dance"] }]
            }"#,
        )
        .expect_err("err");
        match err {
            SandboxError::ParseScenario { json_path, .. } => {
                assert_eq!(json_path, "movers[0].script[1]");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = parse(r#"{ "level": "l.xml", "movers": [], "speed": 3 }"#).expect_err("err");
        assert!(matches!(err, SandboxError::ParseScenario { .. }));
    }

    #[test]
    fn validation_rejects_duplicate_ids_and_zero_rates() {
        let scenario = parse(
            r#"{
                "level": "l.xml",
                "movers": [
                    { "id": 1, "spawn": { "x": 0, "y": 0 } },
                    { "id": 1, "spawn": { "x": 1, "y": 0 } }
                ]
            }"#,
        )
        .expect("parse");
        let err = validate_scenario(Path::new("s.json"), &scenario).expect_err("dup");
        assert!(err.to_string().contains("movers[1]"));

        let scenario = parse(r#"{ "level": "l.xml", "tick_rate": 0, "movers": [] }"#).expect("parse");
        assert!(validate_scenario(Path::new("s.json"), &scenario).is_err());

        let scenario =
            parse(r#"{ "level": "l.xml", "movement": { "tile_size": -1.0 }, "movers": [] }"#)
                .expect("parse");
        assert!(matches!(
            validate_scenario(Path::new("s.json"), &scenario),
            Err(SandboxError::MovementConfig(_))
        ));
    }

    #[test]
    fn commands_display_in_script_syntax() {
        for raw in ["move left", "interact", "wait 12", "stop", "teleport 3 -1"] {
            let command = raw.parse::<ScriptCommand>().expect("parse");
            assert_eq!(command.to_string(), raw);
        }
    }
}
