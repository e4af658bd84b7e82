//! The view of the runtime an action body or guard gets

use crate::capability::{CapabilityError, CapabilityRegistry};
use crate::types::{ActorId, CapabilityRef};
use serde_json::{Map, Value};

/// Per-call context handed to guards, bodies and lifecycle hooks
///
/// Gives access to the actor's own identity and to the runtime's
/// capability registry; nothing else of the runtime is reachable.
pub struct ActorContext<'a> {
    actor: &'a ActorId,
    caps: &'a CapabilityRegistry,
}

impl<'a> ActorContext<'a> {
    pub fn new(actor: &'a ActorId, caps: &'a CapabilityRegistry) -> Self {
        Self { actor, caps }
    }

    pub fn actor_id(&self) -> &ActorId {
        self.actor
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.caps.has_capability(name)
    }

    /// Open a capability object owned by this actor
    pub fn open(
        &mut self,
        name: &str,
        args: Map<String, Value>,
    ) -> Result<CapabilityRef, CapabilityError> {
        self.caps.open(self.actor, name, args)
    }

    /// False for stale references as well
    pub fn can_read(&self, reference: &CapabilityRef) -> bool {
        self.caps.can_read(reference).unwrap_or(false)
    }

    pub fn read(&mut self, reference: &CapabilityRef) -> Result<Value, CapabilityError> {
        self.caps.read(reference)
    }

    /// False for stale references as well
    pub fn can_write(&self, reference: &CapabilityRef) -> bool {
        self.caps.can_write(reference).unwrap_or(false)
    }

    pub fn write(&mut self, reference: &CapabilityRef, data: Value) -> Result<(), CapabilityError> {
        self.caps.write(reference, data)
    }

    pub fn close(&mut self, reference: &CapabilityRef) -> Result<(), CapabilityError> {
        self.caps.close(reference)
    }

    /// Ask the scheduler to try this actor again later
    pub fn wake(&self) {
        self.caps.wakeup().wake(self.actor);
    }
}
