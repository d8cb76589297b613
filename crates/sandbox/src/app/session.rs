use std::collections::{BTreeMap, VecDeque};

use overworld::{
    EntityId, LevelData, Overworld, TerrainEvent, TickOutcome, TileCoord, TriggerAction,
    TriggerEvent,
};
use tracing::{debug, info, warn};

use super::objects::{spawn_objects, ObjectLog};
use super::report::{MoverReport, RunReport};
use super::scenario::{Scenario, ScriptCommand};
use super::SandboxError;

#[derive(Debug, Default)]
struct MoverScript {
    commands: VecDeque<ScriptCommand>,
    wait_ticks: u32,
    blocked_moves: u32,
    interactions: u32,
}

impl MoverScript {
    fn is_done(&self) -> bool {
        self.commands.is_empty() && self.wait_ticks == 0
    }
}

/// One level plus scripted movers, advanced a fixed tick at a time.
pub(crate) struct Session {
    world: Overworld,
    level_name: String,
    scripts: BTreeMap<EntityId, MoverScript>,
    object_log: ObjectLog,
    terrain_events: Vec<TerrainEvent>,
    trigger_events: Vec<TriggerEvent>,
    ticks: u64,
}

impl Session {
    pub(crate) fn new(level: LevelData, scenario: &Scenario) -> Result<Self, SandboxError> {
        let level_name = level.name.clone();
        let placements = level.objects.clone();
        let mut world = Overworld::from_level(level, scenario.movement);

        let object_log = ObjectLog::default();
        if let Some(registry) = world.registry_mut() {
            let spawned = spawn_objects(registry, &placements, &object_log)?;
            info!(objects = spawned, "objects_spawned");
        }

        let mut scripts = BTreeMap::new();
        for mover in &scenario.movers {
            let entity = EntityId(mover.id);
            world.spawn_mover(entity, mover.spawn)?;
            scripts.insert(
                entity,
                MoverScript {
                    commands: mover.script.iter().copied().collect(),
                    ..MoverScript::default()
                },
            );
        }

        Ok(Self {
            world,
            level_name,
            scripts,
            object_log,
            terrain_events: Vec::new(),
            trigger_events: Vec::new(),
            ticks: 0,
        })
    }

    pub(crate) fn world(&self) -> &Overworld {
        &self.world
    }

    pub(crate) fn ticks(&self) -> u64 {
        self.ticks
    }

    pub(crate) fn tick(&mut self, dt: f32) {
        self.ticks += 1;
        self.dispatch_commands();
        for (entity, outcome) in self.world.update(dt) {
            if let TickOutcome::Arrived { tile, chained } = outcome {
                debug!(entity = entity.0, %tile, chained, "mover_arrived");
            }
        }
        self.collect_events();
    }

    /// Every script has run out and every mover is standing still.
    pub(crate) fn is_finished(&self) -> bool {
        self.scripts.values().all(MoverScript::is_done)
            && self.world.movers().all(|mover| !mover.is_moving())
    }

    pub(crate) fn report(&self, frames: u64, dropped_backlog_ms: u128, completed: bool) -> RunReport {
        let movers = self
            .world
            .movers()
            .map(|mover| {
                let script = self.scripts.get(&mover.entity());
                MoverReport {
                    entity: mover.entity(),
                    tile: mover.tile(),
                    facing: mover.facing(),
                    world_position: mover.world_position(),
                    steps_taken: mover.steps_taken(),
                    blocked_moves: script.map_or(0, |script| script.blocked_moves),
                    interactions: script.map_or(0, |script| script.interactions),
                }
            })
            .collect();
        RunReport {
            level: self.level_name.clone(),
            frames,
            ticks: self.ticks,
            dropped_backlog_ms,
            completed,
            movers,
            terrain_events: self.terrain_events.clone(),
            trigger_events: self.trigger_events.clone(),
            object_events: self.object_log.borrow().clone(),
        }
    }

    /// Scripts advance only while their mover is idle; `stop` is the exception
    /// and interrupts a step in flight.
    fn dispatch_commands(&mut self) {
        for (entity, script) in self.scripts.iter_mut() {
            let entity = *entity;
            let Some(mover) = self.world.mover(entity) else {
                continue;
            };
            let moving = mover.is_moving();
            let elevation = mover.elevation();

            if moving {
                if script.commands.front() == Some(&ScriptCommand::Stop) {
                    script.commands.pop_front();
                    self.world.command_stop(entity);
                    info!(entity = entity.0, "script_stopped_mover");
                }
                continue;
            }
            if script.wait_ticks > 0 {
                script.wait_ticks -= 1;
                continue;
            }
            let Some(command) = script.commands.pop_front() else {
                continue;
            };
            debug!(entity = entity.0, %command, "script_command");

            match command {
                ScriptCommand::Move(direction) => {
                    if !self.world.command_move(entity, direction) {
                        script.blocked_moves += 1;
                        info!(entity = entity.0, %direction, "move_blocked");
                    }
                }
                ScriptCommand::Interact => {
                    let prompt = self.world.interaction_prompt(entity);
                    if self.world.command_interact(entity) {
                        script.interactions += 1;
                        info!(entity = entity.0, prompt = ?prompt, "interacted");
                    } else {
                        debug!(entity = entity.0, "interact_found_nothing");
                    }
                }
                ScriptCommand::Wait(ticks) => script.wait_ticks = ticks,
                ScriptCommand::Stop => {
                    self.world.command_stop(entity);
                }
                ScriptCommand::Teleport { x, y } => {
                    let tile = TileCoord::new(x, y, elevation);
                    if let Err(err) = self.world.teleport_mover(entity, tile) {
                        warn!(entity = entity.0, %tile, error = %err, "scripted_teleport_failed");
                    }
                }
            }
        }
    }

    fn collect_events(&mut self) {
        for event in self.world.drain_terrain_events() {
            info!(event = ?event, "terrain_event");
            self.terrain_events.push(event);
        }

        for event in self.world.drain_trigger_events() {
            info!(
                trigger = event.trigger.0,
                entity = event.entity.0,
                tile = %event.tile,
                phase = ?event.phase,
                "trigger_event"
            );
            match &event.action {
                TriggerAction::Warp { target } => match self.world.teleport_mover(event.entity, *target) {
                    Ok(()) => info!(entity = event.entity.0, to = %target, "warped"),
                    Err(err) => warn!(entity = event.entity.0, to = %target, error = %err, "warp_failed"),
                },
                TriggerAction::Message { text } => info!(entity = event.entity.0, %text, "message"),
                TriggerAction::Script { name } => info!(entity = event.entity.0, %name, "script_hook"),
            }
            self.trigger_events.push(event);
        }
    }
}
