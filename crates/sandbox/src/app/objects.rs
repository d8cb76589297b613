use std::cell::RefCell;
use std::rc::Rc;

use overworld::{EntityId, Interactable, ObjectPlacement, TileEntityRegistry, TileObject, TriggerObserver};
use serde::Serialize;
use tracing::info;

use super::SandboxError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ObjectEvent {
    pub(crate) object: String,
    pub(crate) kind: &'static str,
    pub(crate) action: &'static str,
    pub(crate) entity: EntityId,
}

pub(crate) type ObjectLog = Rc<RefCell<Vec<ObjectEvent>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectKind {
    Sign,
    Chest,
    Plate,
    Statue,
}

impl ObjectKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "sign" => Some(Self::Sign),
            "chest" => Some(Self::Chest),
            "plate" => Some(Self::Plate),
            "statue" => Some(Self::Statue),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Sign => "sign",
            Self::Chest => "chest",
            Self::Plate => "plate",
            Self::Statue => "statue",
        }
    }
}

struct Recorder {
    label: String,
    kind: ObjectKind,
    log: ObjectLog,
}

impl Recorder {
    fn record(&self, action: &'static str, entity: EntityId) {
        info!(object = %self.label, kind = self.kind.as_str(), action, entity = entity.0, "object_event");
        self.log.borrow_mut().push(ObjectEvent {
            object: self.label.clone(),
            kind: self.kind.as_str(),
            action,
            entity,
        });
    }
}

struct Sign(Recorder);

impl Interactable for Sign {
    fn can_interact(&self, _actor: EntityId) -> bool {
        true
    }

    fn interact(&mut self, actor: EntityId) {
        self.0.record("read", actor);
    }

    fn interaction_prompt(&self) -> Option<String> {
        Some(format!("Read {}", self.0.label))
    }
}

struct Chest {
    recorder: Recorder,
    opened: bool,
}

impl Interactable for Chest {
    fn can_interact(&self, _actor: EntityId) -> bool {
        !self.opened
    }

    fn interact(&mut self, actor: EntityId) {
        self.opened = true;
        self.recorder.record("opened", actor);
    }

    fn interaction_prompt(&self) -> Option<String> {
        (!self.opened).then(|| format!("Open {}", self.recorder.label))
    }

    fn interaction_priority(&self) -> i32 {
        1
    }
}

struct Plate(Recorder);

impl TriggerObserver for Plate {
    fn on_entity_enter(&mut self, mover: EntityId) {
        self.0.record("pressed", mover);
    }

    fn on_entity_exit(&mut self, mover: EntityId) {
        self.0.record("released", mover);
    }
}

struct Statue(Recorder);

impl Interactable for Statue {
    fn can_interact(&self, _actor: EntityId) -> bool {
        true
    }

    fn interact(&mut self, actor: EntityId) {
        self.0.record("inspected", actor);
    }

    fn interaction_prompt(&self) -> Option<String> {
        Some(format!("Inspect {}", self.0.label))
    }

    fn interaction_priority(&self) -> i32 {
        -1
    }
}

/// Inserts every placement into the registry and registers its footprint.
pub(crate) fn spawn_objects(
    registry: &mut TileEntityRegistry,
    placements: &[ObjectPlacement],
    log: &ObjectLog,
) -> Result<usize, SandboxError> {
    for placement in placements {
        let kind = ObjectKind::parse(&placement.kind).ok_or_else(|| SandboxError::UnknownObjectKind {
            kind: placement.kind.clone(),
            label: placement.label.clone(),
        })?;
        let recorder = Recorder {
            label: placement.label.clone(),
            kind,
            log: log.clone(),
        };
        let object = TileObject::new(placement.label.clone());
        let object = match kind {
            ObjectKind::Sign => object.with_interactable(Sign(recorder)),
            ObjectKind::Chest => object.with_interactable(Chest {
                recorder,
                opened: false,
            }),
            ObjectKind::Plate => object.with_observer(Plate(recorder)),
            ObjectKind::Statue => object.with_interactable(Statue(recorder)),
        };
        let id = registry.insert(object);
        registry.register_footprint(id, placement.tiles.iter().copied());
    }
    Ok(placements.len())
}
