    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::coordinator::{MovementCoordinator, OccupancyError, TerrainEvent};
    use crate::grid::{Direction, EntityId, MovementModifier, TileCoord, Vec3};
    use crate::registry::{Interactable, TileEntityRegistry, TileObject, TriggerObserver};
    use crate::terrain::{TerrainClassification, TerrainMap};
    use crate::triggers::{TileTrigger, TileTriggerDispatcher, TriggerAction, TriggerPhase};

    const HERO: EntityId = EntityId(1);
    const RIVAL: EntityId = EntityId(2);
    // Exact in binary: a normal step takes two ticks, a slide step one.
    const DT: f32 = 0.125;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Rig {
        coordinator: MovementCoordinator,
        registry: TileEntityRegistry,
        triggers: TileTriggerDispatcher,
    }

    impl Rig {
        fn new(terrain: TerrainMap) -> Self {
            Self {
                coordinator: MovementCoordinator::new(terrain),
                registry: TileEntityRegistry::new(),
                triggers: TileTriggerDispatcher::new(),
            }
        }

        fn ctx(&mut self) -> MovementContext<'_> {
            MovementContext::new(
                Some(&mut self.coordinator),
                Some(&mut self.registry),
                Some(&mut self.triggers),
            )
        }

        fn spawn(&mut self, entity: EntityId, tile: TileCoord) -> GridMovementController {
            self.spawn_with(entity, tile, MovementConfig::default())
        }

        fn spawn_with(
            &mut self,
            entity: EntityId,
            tile: TileCoord,
            config: MovementConfig,
        ) -> GridMovementController {
            let mut controller = GridMovementController::new(entity, tile, config);
            controller.activate(&mut self.ctx()).expect("activate");
            controller
        }

        fn observe(&mut self, name: &'static str, tile: TileCoord, log: &Log) {
            let id = self.registry.insert(TileObject::new(name).with_observer(Recorder {
                name,
                log: log.clone(),
            }));
            self.registry.register(id, tile);
        }
    }

    struct Recorder {
        name: &'static str,
        log: Log,
    }

    impl TriggerObserver for Recorder {
        fn on_entity_enter(&mut self, mover: EntityId) {
            self.log.borrow_mut().push(format!("{}:enter:{}", self.name, mover.0));
        }

        fn on_entity_exit(&mut self, mover: EntityId) {
            self.log.borrow_mut().push(format!("{}:exit:{}", self.name, mover.0));
        }
    }

    struct Signpost {
        text: &'static str,
        reads: Rc<RefCell<u32>>,
    }

    impl Interactable for Signpost {
        fn can_interact(&self, _actor: EntityId) -> bool {
            true
        }

        fn interact(&mut self, _actor: EntityId) {
            *self.reads.borrow_mut() += 1;
        }

        fn interaction_prompt(&self) -> Option<String> {
            Some(self.text.to_string())
        }
    }

    fn tile(x: i32, y: i32) -> TileCoord {
        TileCoord::new(x, y, 0)
    }

    fn terrain(cells: &[(TileCoord, TerrainClassification)]) -> TerrainMap {
        let mut map = TerrainMap::new();
        for (coord, classification) in cells {
            map.set(*coord, *classification);
        }
        map
    }

    fn ice() -> TerrainClassification {
        TerrainClassification::passable(MovementModifier::Slide)
    }

    fn run_until_idle(controller: &mut GridMovementController, rig: &mut Rig) -> Vec<TickOutcome> {
        let mut outcomes = Vec::new();
        for _ in 0..1_000 {
            let outcome = controller.update(DT, &mut rig.ctx());
            outcomes.push(outcome);
            if !controller.is_moving() {
                break;
            }
        }
        outcomes
    }

    #[test]
    fn blocked_move_leaves_position_and_motion_untouched() {
        let mut rig = Rig::new(terrain(&[(tile(1, 0), TerrainClassification::wall())]));
        let mut hero = rig.spawn(HERO, tile(0, 0));

        assert!(hero.is_blocked(Direction::Right, &rig.ctx()));
        assert!(!hero.try_move(Direction::Right, &mut rig.ctx()));
        assert_eq!(hero.tile(), tile(0, 0));
        assert_eq!((hero.grid_x(), hero.grid_y(), hero.elevation()), (0, 0, 0));
        assert!(!hero.is_moving());
        assert_eq!(hero.facing(), Direction::Right);
        assert_eq!(rig.coordinator.owner_of(tile(0, 0)), Some(HERO));
    }

    #[test]
    fn move_while_in_flight_is_rejected_without_side_effects() {
        let mut rig = Rig::new(TerrainMap::new());
        let mut hero = rig.spawn(HERO, tile(0, 0));
        assert!(hero.try_move(Direction::Up, &mut rig.ctx()));
        hero.update(DT, &mut rig.ctx());
        let progress = hero.progress();

        assert!(!hero.try_move(Direction::Right, &mut rig.ctx()));
        assert_eq!(hero.facing(), Direction::Up);
        assert_eq!(hero.tile(), tile(0, 1));
        assert_eq!(hero.progress(), progress);
        assert_eq!(hero.steps_taken(), 1);
    }

    #[test]
    fn accepted_move_claims_destination_before_visual_arrival() {
        let log = Log::default();
        let mut rig = Rig::new(TerrainMap::new());
        rig.observe("origin", tile(0, 0), &log);
        rig.triggers.add(TileTrigger::new(
            tile(0, 0),
            TriggerPhase::Exit,
            TriggerAction::Message {
                text: "bye".to_string(),
            },
        ));
        let mut hero = rig.spawn(HERO, tile(0, 0));

        assert!(hero.try_move(Direction::Right, &mut rig.ctx()));
        assert_eq!(hero.tile(), tile(1, 0));
        assert!(hero.is_moving());
        assert_eq!(hero.world_position(), Vec3::new(0.5, 0.5, 0.0));
        assert_eq!(rig.coordinator.owner_of(tile(1, 0)), Some(HERO));
        assert_eq!(rig.coordinator.owner_of(tile(0, 0)), None);
        assert_eq!(*log.borrow(), vec!["origin:exit:1"]);
        let exits: Vec<_> = rig.triggers.drain().collect();
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].direction, Direction::Right);
    }

    #[test]
    fn second_mover_sees_claimed_destination_in_same_tick() {
        let mut rig = Rig::new(TerrainMap::new());
        let mut hero = rig.spawn(HERO, tile(0, 0));
        let mut rival = rig.spawn(RIVAL, tile(2, 0));

        assert!(hero.try_move(Direction::Right, &mut rig.ctx()));
        assert!(!rival.try_move(Direction::Left, &mut rig.ctx()));
        assert_eq!(rival.tile(), tile(2, 0));
    }

    #[test]
    fn completed_move_snaps_exactly_to_cell_center() {
        let config = MovementConfig {
            tile_size: 0.7,
            layer_depth: 0.3,
            base_speed: 3.0,
            ..MovementConfig::default()
        };
        let mut rig = Rig::new(TerrainMap::new());
        let mut hero = rig.spawn_with(HERO, TileCoord::new(3, 2, 1), config);
        assert!(hero.try_move(Direction::Right, &mut rig.ctx()));

        let mut last = TickOutcome::Idle;
        for _ in 0..100 {
            last = hero.update(0.013, &mut rig.ctx());
            if !hero.is_moving() {
                break;
            }
        }
        assert_eq!(
            last,
            TickOutcome::Arrived {
                tile: TileCoord::new(4, 2, 1),
                chained: false
            }
        );
        let expected = Vec3::new(
            4.0 * 0.7 + 0.7 / 2.0,
            2.0 * 0.7 + 0.7 / 2.0,
            1.0 * 0.3,
        );
        assert_eq!(hero.world_position(), expected);
        assert_eq!(hero.progress(), 1.0);
    }

    #[test]
    fn idle_update_is_a_no_op() {
        let mut rig = Rig::new(TerrainMap::new());
        let mut hero = rig.spawn(HERO, tile(5, 5));
        let before = hero.world_position();
        assert_eq!(hero.update(1.0, &mut rig.ctx()), TickOutcome::Idle);
        assert_eq!(hero.world_position(), before);
    }

    #[test]
    fn slow_terrain_takes_more_ticks() {
        let mut rig = Rig::new(terrain(&[(
            tile(1, 0),
            TerrainClassification::passable(MovementModifier::Slow),
        )]));
        let mut hero = rig.spawn(HERO, tile(0, 0));
        assert!(hero.try_move(Direction::Right, &mut rig.ctx()));
        assert_eq!(hero.modifier(), MovementModifier::Slow);
        assert_eq!(run_until_idle(&mut hero, &mut rig).len(), 4);

        assert!(hero.try_move(Direction::Right, &mut rig.ctx()));
        assert_eq!(run_until_idle(&mut hero, &mut rig).len(), 2);
    }

    #[test]
    fn jump_arc_peaks_halfway_and_vanishes_at_endpoints() {
        let start = Vec3::new(0.5, 2.5, 0.0);
        let target = Vec3::new(0.5, 1.5, 0.0);
        let jump = MovementModifier::Jump;

        let mid = sample_world_position(start, target, 0.5, jump, 0.75);
        let baseline = start.lerp(target, 0.5);
        assert_eq!(mid.y - baseline.y, 0.75);
        assert_eq!(sample_world_position(start, target, 0.0, jump, 0.75), start);
        assert_eq!(sample_world_position(start, target, 1.0, jump, 0.75), target);

        let flat = sample_world_position(start, target, 0.5, MovementModifier::Normal, 0.75);
        assert_eq!(flat, baseline);
    }

    #[test]
    fn ledge_jump_arcs_mid_flight() {
        let ledge = TerrainClassification {
            modifier: MovementModifier::Jump,
            ..TerrainClassification::ledge(Direction::Down, 0)
        };
        let mut rig = Rig::new(terrain(&[(tile(0, 1), ledge)]));
        let mut hero = rig.spawn(HERO, tile(0, 2));
        assert!(hero.try_move(Direction::Down, &mut rig.ctx()));
        // Jump halves the speed: a quarter of the way after one tick.
        assert_eq!(hero.update(DT, &mut rig.ctx()), TickOutcome::InFlight);
        let baseline = hero
            .start_world_position()
            .lerp(hero.target_world_position(), hero.progress());
        assert!(hero.world_position().y > baseline.y);
    }

    #[test]
    fn elevation_change_is_applied_before_enter_callbacks() {
        let mut rig = Rig::new(terrain(&[(tile(0, 1), TerrainClassification::ledge(Direction::Down, -1))]));
        let below = TileCoord::new(0, 1, -1);
        let log = Log::default();
        rig.observe("upper", tile(0, 1), &log);
        rig.observe("lower", below, &log);
        rig.triggers.add(TileTrigger::new(
            below,
            TriggerPhase::Enter,
            TriggerAction::Script {
                name: "landed".to_string(),
            },
        ));
        let mut hero = rig.spawn(HERO, tile(0, 2));

        assert!(hero.try_move(Direction::Down, &mut rig.ctx()));
        let outcomes = run_until_idle(&mut hero, &mut rig);
        assert_eq!(
            outcomes.last(),
            Some(&TickOutcome::Arrived {
                tile: below,
                chained: false
            })
        );
        assert_eq!(hero.elevation(), -1);
        assert_eq!(hero.world_position(), Vec3::new(0.5, 1.5, -1.0));
        assert_eq!(rig.coordinator.owner_of(below), Some(HERO));
        assert_eq!(rig.coordinator.owner_of(tile(0, 1)), None);
        assert_eq!(*log.borrow(), vec!["lower:enter:1"]);
        assert_eq!(rig.triggers.drain().count(), 1);
    }

    #[test]
    fn landing_cell_is_held_for_the_whole_jump() {
        let mut rig = Rig::new(terrain(&[(tile(0, 1), TerrainClassification::ledge(Direction::Down, -1))]));
        let below = TileCoord::new(0, 1, -1);
        let mut hero = rig.spawn(HERO, tile(0, 2));
        let mut rival = rig.spawn(RIVAL, TileCoord::new(1, 1, -1));

        assert!(hero.try_move(Direction::Down, &mut rig.ctx()));
        assert_eq!(rig.coordinator.landing_of(HERO), Some(below));
        hero.update(DT, &mut rig.ctx());
        assert!(hero.is_moving());

        assert!(!rival.try_move(Direction::Left, &mut rig.ctx()));
        assert_eq!(rival.tile(), TileCoord::new(1, 1, -1));

        run_until_idle(&mut hero, &mut rig);
        assert_eq!(hero.elevation(), -1);
        assert_eq!(hero.tile(), below);
        assert_eq!(rig.coordinator.owner_of(below), Some(HERO));
        assert_eq!(rig.coordinator.landing_of(HERO), None);
        assert_eq!(rig.coordinator.claimed_tile_count(), 2);

        // Once the hero has moved on, the lower cell is free again.
        assert!(hero.try_move(Direction::Down, &mut rig.ctx()));
        run_until_idle(&mut hero, &mut rig);
        assert!(rival.try_move(Direction::Left, &mut rig.ctx()));
    }

    #[test]
    fn slide_carries_mover_onto_first_non_slide_tile() {
        let mut rig = Rig::new(terrain(&[(tile(1, 0), ice()), (tile(2, 0), ice())]));
        let mut hero = rig.spawn(HERO, tile(0, 0));

        assert!(hero.try_move(Direction::Right, &mut rig.ctx()));
        assert!(hero.is_sliding());
        let outcomes = run_until_idle(&mut hero, &mut rig);

        assert_eq!(
            outcomes,
            vec![
                TickOutcome::Arrived {
                    tile: tile(1, 0),
                    chained: true
                },
                TickOutcome::Arrived {
                    tile: tile(2, 0),
                    chained: true
                },
                TickOutcome::InFlight,
                TickOutcome::Arrived {
                    tile: tile(3, 0),
                    chained: false
                },
            ]
        );
        assert_eq!(hero.tile(), tile(3, 0));
        assert!(!hero.is_sliding());
        assert!(!hero.is_moving());
        assert_eq!(hero.steps_taken(), 3);
    }

    #[test]
    fn slide_into_wall_stops_on_last_entered_tile() {
        let mut rig = Rig::new(terrain(&[
            (tile(1, 0), ice()),
            (tile(2, 0), ice()),
            (tile(3, 0), TerrainClassification::wall()),
        ]));
        let mut hero = rig.spawn(HERO, tile(0, 0));

        assert!(hero.try_move(Direction::Right, &mut rig.ctx()));
        run_until_idle(&mut hero, &mut rig);

        assert_eq!(hero.tile(), tile(2, 0));
        assert!(!hero.is_sliding());
        assert_eq!(hero.world_position(), Vec3::new(2.5, 0.5, 0.0));
    }

    #[test]
    fn slide_chain_cap_stops_sliding_mid_ice() {
        let cells: Vec<_> = (1..=10).map(|x| (tile(x, 0), ice())).collect();
        let mut rig = Rig::new(terrain(&cells));
        let config = MovementConfig {
            max_slide_chain: 2,
            ..MovementConfig::default()
        };
        let mut hero = rig.spawn_with(HERO, tile(0, 0), config);

        assert!(hero.try_move(Direction::Right, &mut rig.ctx()));
        run_until_idle(&mut hero, &mut rig);

        assert_eq!(hero.tile(), tile(3, 0));
        assert!(!hero.is_sliding());

        // A fresh command starts a fresh chain.
        assert!(hero.try_move(Direction::Right, &mut rig.ctx()));
        run_until_idle(&mut hero, &mut rig);
        assert_eq!(hero.tile(), tile(6, 0));
    }

    #[test]
    fn slide_enter_callbacks_fire_before_next_exit() {
        let log = Log::default();
        let mut rig = Rig::new(terrain(&[(tile(1, 0), ice())]));
        rig.observe("ice", tile(1, 0), &log);
        let mut hero = rig.spawn(HERO, tile(0, 0));

        assert!(hero.try_move(Direction::Right, &mut rig.ctx()));
        run_until_idle(&mut hero, &mut rig);
        assert_eq!(*log.borrow(), vec!["ice:enter:1", "ice:exit:1"]);
    }

    #[test]
    fn force_stop_snaps_to_logical_tile_without_callbacks() {
        let log = Log::default();
        let mut rig = Rig::new(TerrainMap::new());
        rig.observe("destination", tile(0, 1), &log);
        let mut hero = rig.spawn(HERO, tile(0, 0));

        assert!(hero.try_move(Direction::Up, &mut rig.ctx()));
        hero.update(DT, &mut rig.ctx());
        hero.force_stop();

        assert!(!hero.is_moving());
        assert_eq!(hero.progress(), 0.0);
        assert_eq!(hero.tile(), tile(0, 1));
        assert_eq!(hero.world_position(), Vec3::new(0.5, 1.5, 0.0));
        assert!(log.borrow().is_empty());
        assert_eq!(hero.update(DT, &mut rig.ctx()), TickOutcome::Idle);
    }

    #[test]
    fn set_grid_position_cancels_motion_and_moves_claim() {
        let log = Log::default();
        let mut rig = Rig::new(terrain(&[(tile(1, 0), ice()), (tile(2, 0), ice())]));
        rig.observe("target", tile(7, 7), &log);
        rig.observe("in_flight", tile(1, 0), &log);
        for (at, phase) in [
            (tile(1, 0), TriggerPhase::Exit),
            (tile(1, 0), TriggerPhase::Enter),
            (tile(7, 7), TriggerPhase::Enter),
        ] {
            rig.triggers.add(TileTrigger::new(
                at,
                phase,
                TriggerAction::Message {
                    text: format!("{phase:?} {at}"),
                },
            ));
        }
        let mut hero = rig.spawn(HERO, tile(0, 0));

        assert!(hero.try_move(Direction::Right, &mut rig.ctx()));
        assert!(rig.triggers.pending_events().is_empty());
        hero.set_grid_position(7, 7, &mut rig.ctx()).expect("teleport");

        assert!(!hero.is_moving());
        assert!(!hero.is_sliding());
        assert_eq!(hero.tile(), tile(7, 7));
        assert_eq!(rig.coordinator.owner_of(tile(7, 7)), Some(HERO));
        assert_eq!(rig.coordinator.owner_of(tile(1, 0)), None);
        assert!(log.borrow().is_empty());
        assert!(rig.triggers.pending_events().is_empty());
        assert!(rig.coordinator.pending_events().is_empty());
    }

    #[test]
    fn set_grid_position_onto_claimed_tile_keeps_old_tile() {
        let mut rig = Rig::new(TerrainMap::new());
        let mut hero = rig.spawn(HERO, tile(0, 0));
        let _rival = rig.spawn(RIVAL, tile(4, 4));

        assert!(hero.try_move(Direction::Up, &mut rig.ctx()));
        let err = hero
            .set_grid_position(4, 4, &mut rig.ctx())
            .expect_err("claimed");
        assert_eq!(
            err,
            OccupancyError::TileClaimed {
                tile: tile(4, 4),
                owner: RIVAL
            }
        );
        assert!(!hero.is_moving());
        assert_eq!(hero.tile(), tile(0, 1));
        assert_eq!(rig.coordinator.owner_of(tile(0, 1)), Some(HERO));
    }

    #[test]
    fn teleport_can_change_elevation() {
        let mut rig = Rig::new(TerrainMap::new());
        let mut hero = rig.spawn(HERO, tile(0, 0));
        hero.teleport(TileCoord::new(2, 2, 3), &mut rig.ctx()).expect("teleport");
        assert_eq!(hero.elevation(), 3);
        assert_eq!(hero.world_position(), Vec3::new(2.5, 2.5, 3.0));
    }

    #[test]
    fn detached_context_moves_unchecked() {
        let mut hero = GridMovementController::new(HERO, tile(0, 0), MovementConfig::default());
        let mut ctx = MovementContext::detached();
        hero.activate(&mut ctx).expect("activate");
        assert!(!hero.is_blocked(Direction::Left, &ctx));
        assert!(hero.try_move(Direction::Left, &mut ctx));
        assert_eq!(hero.modifier(), MovementModifier::Normal);
        hero.update(1.0, &mut ctx);
        assert_eq!(hero.tile(), tile(-1, 0));
        assert!(!hero.try_interact(&mut ctx));
        assert_eq!(hero.interaction_prompt(&ctx), None);
    }

    #[test]
    fn partial_context_skips_missing_channels() {
        let log = Log::default();
        let mut registry = TileEntityRegistry::new();
        let id = registry.insert(TileObject::new("plate").with_observer(Recorder {
            name: "plate",
            log: log.clone(),
        }));
        registry.register(id, tile(0, 1));
        let mut hero = GridMovementController::new(HERO, tile(0, 0), MovementConfig::default());
        let mut ctx = MovementContext::new(None, Some(&mut registry), None);

        assert!(hero.try_move(Direction::Up, &mut ctx));
        hero.update(1.0, &mut ctx);
        assert_eq!(*log.borrow(), vec!["plate:enter:1"]);
    }

    #[test]
    fn terrain_events_follow_enter_and_exit() {
        let spikes = TerrainClassification {
            damage_on_entry: 3,
            collapses_on_exit: true,
            ..TerrainClassification::default()
        };
        let grass = TerrainClassification::passable(MovementModifier::Encounter);
        let mut rig = Rig::new(terrain(&[(tile(1, 0), spikes), (tile(2, 0), grass)]));
        let mut hero = rig.spawn(HERO, tile(0, 0));

        assert!(hero.try_move(Direction::Right, &mut rig.ctx()));
        run_until_idle(&mut hero, &mut rig);
        assert!(hero.try_move(Direction::Right, &mut rig.ctx()));
        run_until_idle(&mut hero, &mut rig);

        let events: Vec<_> = rig.coordinator.drain_events().collect();
        assert_eq!(
            events,
            vec![
                TerrainEvent::Damage {
                    entity: HERO,
                    tile: tile(1, 0),
                    amount: 3
                },
                TerrainEvent::Collapsed {
                    entity: HERO,
                    tile: tile(1, 0)
                },
                TerrainEvent::EncounterCheck {
                    entity: HERO,
                    tile: tile(2, 0)
                },
            ]
        );
        assert!(hero.is_blocked(Direction::Left, &rig.ctx()));
    }

    #[test]
    fn interact_prefers_registry_then_falls_back_to_triggers() {
        let reads = Rc::new(RefCell::new(0));
        let mut rig = Rig::new(terrain(&[(tile(0, 1), TerrainClassification::wall())]));
        let sign = rig.registry.insert(TileObject::new("sign").with_interactable(Signpost {
            text: "Read",
            reads: reads.clone(),
        }));
        rig.registry.register(sign, tile(0, 1));
        rig.triggers.add(TileTrigger::new(
            tile(0, 1),
            TriggerPhase::Interact,
            TriggerAction::Message {
                text: "fallback".to_string(),
            },
        ));
        let mut hero = rig.spawn(HERO, tile(0, 0));

        // Bumping the wall turns the mover to face it.
        assert!(!hero.try_move(Direction::Up, &mut rig.ctx()));
        assert_eq!(hero.interaction_prompt(&rig.ctx()).as_deref(), Some("Read"));
        assert!(hero.try_interact(&mut rig.ctx()));
        assert_eq!(*reads.borrow(), 1);
        assert!(rig.triggers.pending_events().is_empty());

        rig.registry.remove(sign);
        assert!(hero.try_interact(&mut rig.ctx()));
        assert_eq!(rig.triggers.pending_events().len(), 1);
    }

    #[test]
    fn interact_is_rejected_while_moving() {
        let mut rig = Rig::new(TerrainMap::new());
        rig.triggers.add(TileTrigger::new(
            tile(0, 2),
            TriggerPhase::Interact,
            TriggerAction::Message {
                text: "hello".to_string(),
            },
        ));
        let mut hero = rig.spawn(HERO, tile(0, 0));
        assert!(hero.try_move(Direction::Up, &mut rig.ctx()));
        assert!(!hero.try_interact(&mut rig.ctx()));
        run_until_idle(&mut hero, &mut rig);
        assert!(hero.try_interact(&mut rig.ctx()));
    }

    #[test]
    fn deactivate_releases_claim() {
        let mut rig = Rig::new(TerrainMap::new());
        let mut hero = rig.spawn(HERO, tile(0, 0));
        assert!(hero.try_move(Direction::Up, &mut rig.ctx()));
        hero.deactivate(&mut rig.ctx());
        assert!(!hero.is_moving());
        assert_eq!(rig.coordinator.claimed_tile_count(), 0);
    }
