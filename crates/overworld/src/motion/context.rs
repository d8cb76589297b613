use crate::coordinator::MovementCoordinator;
use crate::registry::TileEntityRegistry;
use crate::triggers::TileTriggerDispatcher;

/// Collaborators lent to a controller for one call. Any of them may be absent;
/// an absent collaborator only disables the behavior it provides.
#[derive(Default)]
pub struct MovementContext<'a> {
    pub coordinator: Option<&'a mut MovementCoordinator>,
    pub registry: Option<&'a mut TileEntityRegistry>,
    pub triggers: Option<&'a mut TileTriggerDispatcher>,
}

impl<'a> MovementContext<'a> {
    pub fn new(
        coordinator: Option<&'a mut MovementCoordinator>,
        registry: Option<&'a mut TileEntityRegistry>,
        triggers: Option<&'a mut TileTriggerDispatcher>,
    ) -> Self {
        Self {
            coordinator,
            registry,
            triggers,
        }
    }

    /// No collaborators at all: movement is unchecked and nothing is notified.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn coordinator(&self) -> Option<&MovementCoordinator> {
        self.coordinator.as_deref()
    }

    pub fn registry(&self) -> Option<&TileEntityRegistry> {
        self.registry.as_deref()
    }
}
