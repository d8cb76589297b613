use std::path::Path;

use overworld::{Direction, EntityId, TerrainEvent, TileCoord, TriggerEvent, Vec3};
use serde::Serialize;
use tracing::info;

use super::atomic_io::write_text_atomic;
use super::objects::ObjectEvent;
use super::SandboxError;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RunReport {
    pub(crate) level: String,
    pub(crate) frames: u64,
    pub(crate) ticks: u64,
    pub(crate) dropped_backlog_ms: u128,
    pub(crate) completed: bool,
    pub(crate) movers: Vec<MoverReport>,
    pub(crate) terrain_events: Vec<TerrainEvent>,
    pub(crate) trigger_events: Vec<TriggerEvent>,
    pub(crate) object_events: Vec<ObjectEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct MoverReport {
    pub(crate) entity: EntityId,
    pub(crate) tile: TileCoord,
    pub(crate) facing: Direction,
    pub(crate) world_position: Vec3,
    pub(crate) steps_taken: u64,
    pub(crate) blocked_moves: u32,
    pub(crate) interactions: u32,
}

pub(crate) fn write_report(path: &Path, report: &RunReport) -> Result<(), SandboxError> {
    let json = serde_json::to_string_pretty(report).map_err(SandboxError::SerializeReport)?;
    write_text_atomic(path, &json).map_err(|source| SandboxError::WriteReport {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), movers = report.movers.len(), "report_written");
    Ok(())
}
