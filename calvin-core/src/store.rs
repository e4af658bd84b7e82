//! Registry of actor types
//!
//! Each type's action table is built once, validated, and shared by every
//! instance. Validation catches wiring mistakes (unknown ports, wrong
//! direction, duplicate names) at registration instead of at first fire.

use crate::actor::{
    ActionTable, Actor, ActorContext, Behavior, BehaviorFactory, DynBehavior, PortDecl,
    TypedFactory,
};
use crate::capability::CapabilityRegistry;
use crate::port::{Port, PortProperties};
use crate::queue::QueueKind;
use crate::runtime::error::{ActorError, ActorResult};
use crate::runtime::migration::MigrationError;
use crate::types::{ActorId, Direction};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Port property overrides keyed by port name and direction
pub type PortOverrides = HashMap<(String, Direction), PortProperties>;

/// How ports of a new actor are built
#[derive(Debug, Clone)]
pub struct PortSetup {
    /// Capacity for ports whose properties do not set one
    pub queue_length: usize,
    pub overrides: PortOverrides,
}

impl PortSetup {
    pub fn new(queue_length: usize) -> Self {
        Self {
            queue_length,
            overrides: PortOverrides::new(),
        }
    }
}

/// Public description of a registered type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActorTypeInfo {
    pub actor_type: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    /// Action names in priority order
    pub actions: Vec<String>,
    pub requires: Vec<String>,
}

struct Registered {
    info: ActorTypeInfo,
    ports: Vec<PortDecl>,
    factory: Box<dyn BehaviorFactory>,
}

/// Actor types known to a runtime
#[derive(Default)]
pub struct ActorStore {
    types: BTreeMap<String, Registered>,
}

impl ActorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register actor type `B`, validating its action table
    pub fn register<B: Behavior>(&mut self) -> ActorResult<()> {
        if self.types.contains_key(B::TYPE) {
            return Err(ActorError::AlreadyRegistered(B::TYPE.to_string()));
        }
        let ports = B::ports();
        let actions = B::actions();
        validate(B::TYPE, &ports, &actions)?;

        let info = ActorTypeInfo {
            actor_type: B::TYPE.to_string(),
            inputs: port_names(&ports, Direction::In),
            outputs: port_names(&ports, Direction::Out),
            actions: actions.iter().map(|a| a.name.to_string()).collect(),
            requires: B::requires().into_iter().map(String::from).collect(),
        };
        tracing::debug!(actor_type = B::TYPE, actions = info.actions.len(), "registered actor type");
        self.types.insert(
            B::TYPE.to_string(),
            Registered {
                info,
                ports,
                factory: Box::new(TypedFactory::<B>::new(ActionTable::new(actions))),
            },
        );
        Ok(())
    }

    pub fn contains(&self, actor_type: &str) -> bool {
        self.types.contains_key(actor_type)
    }

    /// All registered types, sorted by name
    pub fn types(&self) -> impl Iterator<Item = &ActorTypeInfo> {
        self.types.values().map(|r| &r.info)
    }

    pub fn info(&self, actor_type: &str) -> Option<&ActorTypeInfo> {
        self.types.get(actor_type).map(|r| &r.info)
    }

    /// Instantiate an actor: check requirements, build ports, run the initializer
    pub fn create(
        &self,
        actor_type: &str,
        id: ActorId,
        name: impl Into<String>,
        args: &Map<String, Value>,
        caps: &CapabilityRegistry,
        setup: &PortSetup,
    ) -> ActorResult<Actor> {
        let registered = self.registered(actor_type)?;
        if let Some(missing) = registered
            .info
            .requires
            .iter()
            .find(|c| !caps.has_capability(c))
        {
            return Err(ActorError::MissingCapability {
                actor_type: actor_type.to_string(),
                capability: missing.clone(),
            });
        }

        let mut ports = Vec::with_capacity(registered.ports.len());
        for decl in &registered.ports {
            let properties = match setup.overrides.get(&(decl.name.to_string(), decl.direction)) {
                Some(over) => decl.properties.merged(over),
                None => decl.properties.clone(),
            };
            ports.push(build_port(&id, decl, properties, setup.queue_length)?);
        }

        let behavior = {
            let mut ctx = ActorContext::new(&id, caps);
            registered
                .factory
                .create(args, &mut ctx)
                .map_err(|source| ActorError::InitFailed {
                    actor_type: actor_type.to_string(),
                    source,
                })?
        };
        Ok(Actor::new(
            id,
            name.into(),
            actor_type.to_string(),
            ports,
            behavior,
        ))
    }

    /// Rebuild a behaviour from migrated state
    pub(crate) fn restore(
        &self,
        actor_type: &str,
        state: Value,
    ) -> Result<Box<dyn DynBehavior>, MigrationError> {
        let registered = self
            .types
            .get(actor_type)
            .ok_or_else(|| MigrationError::UnknownType(actor_type.to_string()))?;
        registered
            .factory
            .restore(state)
            .map_err(MigrationError::StateDecode)
    }

    fn registered(&self, actor_type: &str) -> ActorResult<&Registered> {
        self.types
            .get(actor_type)
            .ok_or_else(|| ActorError::UnknownType(actor_type.to_string()))
    }
}

impl std::fmt::Debug for ActorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorStore")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn port_names(ports: &[PortDecl], direction: Direction) -> Vec<String> {
    ports
        .iter()
        .filter(|p| p.direction == direction)
        .map(|p| p.name.to_string())
        .collect()
}

fn build_port(
    owner: &ActorId,
    decl: &PortDecl,
    properties: PortProperties,
    default_queue_length: usize,
) -> ActorResult<Port> {
    let kind = properties
        .queue_kind(&QueueKind::Fanout)
        .map_err(|reason| ActorError::InvalidPortProperties {
            port: decl.name.to_string(),
            reason,
        })?;
    let queue_length = properties.queue_length.unwrap_or(default_queue_length);
    if queue_length == 0 {
        return Err(ActorError::InvalidPortProperties {
            port: decl.name.to_string(),
            reason: "queue_length must be at least 1".into(),
        });
    }
    Ok(Port::new(
        owner,
        decl.name,
        decl.direction,
        kind,
        queue_length,
        properties,
    ))
}

fn validate<B>(
    actor_type: &str,
    ports: &[PortDecl],
    actions: &[crate::action::Action<B>],
) -> ActorResult<()> {
    let invalid = |reason: String| ActorError::InvalidActionTable {
        actor_type: actor_type.to_string(),
        reason,
    };

    let mut seen_ports = HashSet::new();
    for port in ports {
        if !seen_ports.insert((port.name, port.direction)) {
            return Err(invalid(format!(
                "{}-port {} declared twice",
                port.direction, port.name
            )));
        }
        if let Err(reason) = port.properties.queue_kind(&QueueKind::Fanout) {
            return Err(invalid(format!("port {}: {}", port.name, reason)));
        }
    }

    let mut seen_actions = HashSet::new();
    for action in actions {
        if !seen_actions.insert(action.name) {
            return Err(invalid(format!("action {} declared twice", action.name)));
        }
        for (names, direction) in [
            (&action.inputs, Direction::In),
            (&action.outputs, Direction::Out),
        ] {
            let mut used = HashSet::new();
            for name in names {
                if !seen_ports.contains(&(*name, direction)) {
                    return Err(invalid(format!(
                        "action {} uses undeclared {}-port {}",
                        action.name, direction, name
                    )));
                }
                if !used.insert(*name) {
                    return Err(invalid(format!(
                        "action {} lists {}-port {} twice",
                        action.name, direction, name
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ActionError, ActionInput};
    use crate::capability::WakeupHandle;
    use crate::runtime::config::RuntimeConfig;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize)]
    struct Echo;

    fn echo(
        _: &mut Echo,
        _: &mut ActorContext<'_>,
        mut input: ActionInput,
    ) -> Result<Vec<Value>, ActionError> {
        Ok(vec![input.take("token")?.value])
    }

    impl Behavior for Echo {
        const TYPE: &'static str = "test.Echo";

        fn ports() -> Vec<PortDecl> {
            vec![PortDecl::input("token"), PortDecl::output("token")]
        }

        fn actions() -> Vec<Action<Self>> {
            vec![Action::new("echo", echo).input("token").output("token")]
        }

        fn init(_: &Map<String, Value>, _: &mut ActorContext<'_>) -> Result<Self, ActionError> {
            Ok(Echo)
        }
    }

    #[derive(Serialize, Deserialize)]
    struct Broken;

    impl Behavior for Broken {
        const TYPE: &'static str = "test.Broken";

        fn ports() -> Vec<PortDecl> {
            vec![PortDecl::input("in")]
        }

        fn actions() -> Vec<Action<Broken>> {
            fn body(
                _: &mut Broken,
                _: &mut ActorContext<'_>,
                _: ActionInput,
            ) -> Result<Vec<Value>, ActionError> {
                Ok(vec![])
            }
            // writes to an in-port
            vec![Action::new("bad", body).output("in")]
        }

        fn init(_: &Map<String, Value>, _: &mut ActorContext<'_>) -> Result<Self, ActionError> {
            Ok(Broken)
        }

        fn requires() -> Vec<&'static str> {
            vec!["sys.missing"]
        }
    }

    fn caps() -> CapabilityRegistry {
        let (wakeup, _rx) = WakeupHandle::channel();
        CapabilityRegistry::new(&RuntimeConfig::default(), wakeup)
    }

    #[test]
    fn test_register_and_describe() {
        let mut store = ActorStore::new();
        store.register::<Echo>().unwrap();
        assert!(matches!(
            store.register::<Echo>(),
            Err(ActorError::AlreadyRegistered(_))
        ));

        let info = store.info("test.Echo").unwrap();
        assert_eq!(info.inputs, vec!["token"]);
        assert_eq!(info.outputs, vec!["token"]);
        assert_eq!(info.actions, vec!["echo"]);
    }

    #[test]
    fn test_wrong_direction_rejected() {
        let mut store = ActorStore::new();
        let err = store.register::<Broken>().unwrap_err();
        assert!(matches!(err, ActorError::InvalidActionTable { .. }));
        assert!(!store.contains("test.Broken"));
    }

    #[test]
    fn test_create_applies_overrides() {
        let mut store = ActorStore::new();
        store.register::<Echo>().unwrap();
        let caps = caps();

        let mut setup = PortSetup::new(4);
        setup.overrides.insert(
            ("token".into(), Direction::In),
            PortProperties {
                routing: Some("collect-tagged".into()),
                queue_length: Some(2),
                ..Default::default()
            },
        );
        let actor = store
            .create(
                "test.Echo",
                ActorId::new("e1"),
                "echo",
                &Map::new(),
                &caps,
                &setup,
            )
            .unwrap();

        let inport = actor.port("token", Direction::In).unwrap();
        assert_eq!(inport.queue.kind(), &QueueKind::CollectTagged);
        assert_eq!(inport.queue.capacity(), 2);
        let outport = actor.port("token", Direction::Out).unwrap();
        assert_eq!(outport.queue.capacity(), 4);

        assert!(matches!(
            store.create("nope", ActorId::new("x"), "x", &Map::new(), &caps, &setup),
            Err(ActorError::UnknownType(_))
        ));
    }
}
