//! Actor migration: snapshot out of one runtime, restore into another
//!
//! A snapshot carries the managed state, every port with the committed
//! region of its queue, and the actor's open capability objects.
//! Tentative reads are canceled before the snapshot is taken, so nothing
//! half-consumed ever crosses runtimes. Tokens bound for an actor that is
//! mid-migration stay in the sender's out-port until a runtime holding the
//! actor pulls them: delivery is at-least-once.

use super::Runtime;
use crate::actor::{Actor, ActorState};
use crate::capability::{CapabilityError, CapabilityState};
use crate::port::{Endpoint, Port, PortProperties};
use crate::queue::{PortQueue, QueueSnapshot};
use crate::types::{ActorId, Direction, PortId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Migration errors
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Actor {0} not found")]
    NotFound(ActorId),

    #[error("Actor {0} already exists on this runtime")]
    AlreadyExists(ActorId),

    /// Target runtime does not know the actor type
    #[error("Unknown actor type {0}")]
    UnknownType(String),

    #[error("Failed to encode actor state: {0}")]
    StateEncode(#[source] serde_json::Error),

    #[error("Failed to decode actor state: {0}")]
    StateDecode(#[source] serde_json::Error),

    /// Snapshot ports do not match the type's declaration
    #[error("Port {port} is not declared by {actor_type}")]
    PortMismatch { actor_type: String, port: String },

    /// Usually a capability the target runtime does not offer
    #[error("Capability restore failed: {0}")]
    Capability(#[from] CapabilityError),
}

/// Everything needed to recreate an actor elsewhere
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorSnapshot {
    pub id: ActorId,
    pub name: String,
    pub actor_type: String,
    pub state: Value,
    pub ports: Vec<PortSnapshot>,
    #[serde(default)]
    pub capabilities: Vec<CapabilityState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSnapshot {
    pub id: PortId,
    pub name: String,
    pub direction: Direction,
    #[serde(default)]
    pub properties: PortProperties,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    pub queue: QueueSnapshot,
}

impl ActorSnapshot {
    pub fn to_json(&self) -> Result<String, MigrationError> {
        serde_json::to_string(self).map_err(MigrationError::StateEncode)
    }

    pub fn from_json(json: &str) -> Result<Self, MigrationError> {
        serde_json::from_str(json).map_err(MigrationError::StateDecode)
    }
}

impl From<&Port> for PortSnapshot {
    fn from(port: &Port) -> Self {
        Self {
            id: port.id.clone(),
            name: port.name.clone(),
            direction: port.direction,
            properties: port.properties.clone(),
            endpoints: port.endpoints.clone(),
            queue: port.queue.snapshot(),
        }
    }
}

impl PortSnapshot {
    fn into_port(self, owner: &ActorId) -> Port {
        Port {
            id: self.id,
            name: self.name,
            direction: self.direction,
            owner: owner.clone(),
            queue: PortQueue::from_snapshot(self.queue),
            endpoints: self.endpoints,
            properties: self.properties,
        }
    }
}

impl Runtime {
    /// Quiesce an actor and hand it off
    ///
    /// The actor stops being scheduled before anything else happens and is
    /// removed from this runtime once the snapshot is complete. If its state
    /// cannot be encoded the actor is re-enabled and stays here.
    pub fn migrate_out(&mut self, id: &ActorId) -> Result<ActorSnapshot, MigrationError> {
        let actor = self
            .actors
            .get_mut(id)
            .ok_or_else(|| MigrationError::NotFound(id.clone()))?;
        let previous = actor.state();
        actor.set_state(ActorState::Migrating);
        self.scheduler.forget(id);

        actor.will_migrate(&self.caps);
        actor.cancel_tentative();
        let state = match actor.state_value() {
            Ok(state) => state,
            Err(e) => {
                actor.set_state(previous);
                self.scheduler.wake(id);
                return Err(MigrationError::StateEncode(e));
            }
        };

        let snapshot = ActorSnapshot {
            id: id.clone(),
            name: actor.name().to_string(),
            actor_type: actor.actor_type().to_string(),
            state,
            ports: actor.ports().iter().map(PortSnapshot::from).collect(),
            capabilities: self.caps.serialize(id),
        };
        self.caps.close_all(id);
        self.actors.remove(id);
        tracing::info!(actor = %id, name = %snapshot.name, "migrated out");
        Ok(snapshot)
    }

    /// Recreate a migrated actor here and schedule it
    pub fn migrate_in(&mut self, snapshot: ActorSnapshot) -> Result<ActorId, MigrationError> {
        let id = snapshot.id.clone();
        if self.actors.contains_key(&id) {
            return Err(MigrationError::AlreadyExists(id));
        }

        let behavior = self.store.restore(&snapshot.actor_type, snapshot.state)?;
        if let Some(info) = self.store.info(&snapshot.actor_type) {
            for port in &snapshot.ports {
                let declared = match port.direction {
                    Direction::In => &info.inputs,
                    Direction::Out => &info.outputs,
                };
                if !declared.contains(&port.name) {
                    return Err(MigrationError::PortMismatch {
                        actor_type: snapshot.actor_type.clone(),
                        port: port.name.clone(),
                    });
                }
            }
        }
        self.caps.deserialize(&id, &snapshot.capabilities)?;

        let ports = snapshot
            .ports
            .into_iter()
            .map(|p| p.into_port(&id))
            .collect();
        let mut actor = Actor::new(
            id.clone(),
            snapshot.name,
            snapshot.actor_type,
            ports,
            behavior,
        );
        actor.did_migrate(&self.caps);
        actor.set_state(ActorState::Enabled);

        let peers: Vec<ActorId> = actor
            .ports()
            .iter()
            .flat_map(|p| p.endpoints.iter().map(|e| e.peer_actor.clone()))
            .collect();
        tracing::info!(actor = %id, name = actor.name(), "migrated in");
        self.actors.insert(id.clone(), actor);

        self.scheduler.wake(&id);
        for peer in peers {
            if self.actors.contains_key(&peer) {
                self.scheduler.wake(&peer);
            }
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ActionError, ActionInput};
    use crate::actor::{ActorContext, Behavior, PortDecl};
    use crate::token::Token;
    use serde_json::{json, Map};

    #[derive(Serialize, Deserialize)]
    struct Sum {
        total: i64,
    }

    fn add(
        state: &mut Sum,
        _: &mut ActorContext<'_>,
        input: ActionInput,
    ) -> Result<Vec<Value>, ActionError> {
        let n = input
            .value("in")?
            .as_i64()
            .ok_or_else(|| ActionError::invalid_argument("in", "not an integer"))?;
        state.total += n;
        Ok(vec![json!(state.total)])
    }

    impl Behavior for Sum {
        const TYPE: &'static str = "test.Sum";

        fn ports() -> Vec<PortDecl> {
            vec![PortDecl::input("in"), PortDecl::output("sum")]
        }

        fn actions() -> Vec<Action<Self>> {
            vec![Action::new("add", add).input("in").output("sum")]
        }

        fn init(_: &Map<String, Value>, _: &mut ActorContext<'_>) -> Result<Self, ActionError> {
            Ok(Sum { total: 0 })
        }
    }

    fn runtime() -> Runtime {
        let mut rt = Runtime::with_defaults();
        rt.register::<Sum>().unwrap();
        rt
    }

    fn values(tokens: Vec<Token>) -> Vec<Value> {
        tokens.into_iter().map(Token::into_value).collect()
    }

    #[test]
    fn test_state_and_queued_tokens_survive() {
        let mut a = runtime();
        let id = a.new_actor("test.Sum", "sum", Map::new()).unwrap();
        a.inject(&id, "in", Token::new(1)).unwrap();
        a.inject(&id, "in", Token::new(2)).unwrap();
        a.run_until_idle(None);
        assert_eq!(values(a.drain(&id, "sum").unwrap()), vec![json!(1), json!(3)]);

        // queued but never read
        a.inject(&id, "in", Token::new(10)).unwrap();
        let snapshot = a.migrate_out(&id).unwrap();
        assert!(a.actor(&id).is_none());
        assert_eq!(snapshot.state, json!({"total": 3}));

        let json = snapshot.to_json().unwrap();
        let mut b = runtime();
        let restored = b.migrate_in(ActorSnapshot::from_json(&json).unwrap()).unwrap();
        assert_eq!(restored, id);
        assert_eq!(b.actor(&id).unwrap().state(), ActorState::Enabled);

        b.run_until_idle(None);
        assert_eq!(values(b.drain(&id, "sum").unwrap()), vec![json!(13)]);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let mut a = runtime();
        let id = a.new_actor("test.Sum", "sum", Map::new()).unwrap();
        let snapshot = a.migrate_out(&id).unwrap();

        let mut empty = Runtime::with_defaults();
        assert!(matches!(
            empty.migrate_in(snapshot),
            Err(MigrationError::UnknownType(t)) if t == "test.Sum"
        ));
    }

    #[test]
    fn test_duplicate_and_missing_actor() {
        let mut a = runtime();
        let id = a.new_actor("test.Sum", "sum", Map::new()).unwrap();
        let snapshot = a.migrate_out(&id).unwrap();
        assert!(matches!(
            a.migrate_out(&id),
            Err(MigrationError::NotFound(_))
        ));

        a.migrate_in(snapshot.clone()).unwrap();
        assert!(matches!(
            a.migrate_in(snapshot),
            Err(MigrationError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_undeclared_port_is_rejected() {
        let mut a = runtime();
        let id = a.new_actor("test.Sum", "sum", Map::new()).unwrap();
        let mut snapshot = a.migrate_out(&id).unwrap();
        snapshot.ports[0].name = "bogus".into();

        let mut b = runtime();
        assert!(matches!(
            b.migrate_in(snapshot),
            Err(MigrationError::PortMismatch { .. })
        ));
    }
}
