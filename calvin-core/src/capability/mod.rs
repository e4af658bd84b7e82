//! Capability registry
//!
//! Capabilities are external resources (timers, sockets, sinks) that
//! actors reach through a uniform handle interface instead of ports.
//! The registry is an explicit, process-scoped object owned by a
//! [`Runtime`](crate::runtime::Runtime): each runtime instance has its own
//! set of factories, open objects and platform attributes.
//!
//! Open objects are addressed by [`CapabilityRef`]s of the form
//! `<actor-id>#<index>`. Because actor ids survive migration, an actor's
//! stored references stay valid once its objects are restored on the
//! target runtime.

mod wakeup;

pub use wakeup::WakeupHandle;

use crate::runtime::config::RuntimeConfig;
use crate::types::{ActorId, CapabilityRef};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Capability errors
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// Not registered, or blacklisted on this runtime
    #[error("Capability {0} is not available")]
    NotAvailable(String),

    #[error("Capability {0} is already registered")]
    AlreadyRegistered(String),

    /// No open object behind the reference
    #[error("Invalid capability reference {0}")]
    InvalidRef(CapabilityRef),

    #[error("Capability {0} has nothing to read")]
    NotReadable(CapabilityRef),

    #[error("Capability {0} cannot accept a write")]
    NotWritable(CapabilityRef),

    /// Operation the plugin does not implement
    #[error("Operation {0} is not supported")]
    Unsupported(&'static str),

    /// Plugin-level failure
    #[error("Capability {name} failed: {reason}")]
    Failed { name: String, reason: String },
}

/// An open capability object
///
/// All operations are synchronous and must not block. Plugins that
/// complete asynchronously post a wakeup through the [`OpenContext`]
/// they were opened with.
pub trait Capability: Send {
    fn can_read(&self) -> bool {
        false
    }

    fn read(&mut self) -> Result<Value, CapabilityError> {
        Err(CapabilityError::Unsupported("read"))
    }

    fn can_write(&self) -> bool {
        false
    }

    fn write(&mut self, _data: Value) -> Result<(), CapabilityError> {
        Err(CapabilityError::Unsupported("write"))
    }

    /// Release the underlying resource
    fn close(&mut self) {}

    /// State carried across a migration
    fn serialize(&self) -> Value {
        Value::Null
    }
}

/// What a factory gets to know about the opener
#[derive(Debug, Clone)]
pub struct OpenContext {
    pub actor: ActorId,
    pub wakeup: WakeupHandle,
}

impl OpenContext {
    /// Post a scheduler wakeup for the opening actor
    pub fn wake(&self) {
        self.wakeup.wake(&self.actor);
    }
}

/// Creates capability objects of one named kind
pub trait CapabilityFactory: Send + Sync {
    /// Capability name, e.g. `io.stdout`
    fn name(&self) -> &str;

    fn open(
        &self,
        ctx: OpenContext,
        args: &Map<String, Value>,
    ) -> Result<Box<dyn Capability>, CapabilityError>;

    /// Recreate an object from migrated state
    ///
    /// The default ignores `state` and opens a fresh object.
    fn restore(
        &self,
        ctx: OpenContext,
        _state: &Value,
        args: &Map<String, Value>,
    ) -> Result<Box<dyn Capability>, CapabilityError> {
        self.open(ctx, args)
    }
}

/// Migrated form of one open object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityState {
    pub reference: CapabilityRef,
    pub name: String,
    /// Open-time arguments, before platform attributes were merged in
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default)]
    pub state: Value,
}

struct OpenObject {
    owner: ActorId,
    name: String,
    args: Map<String, Value>,
    capability: Box<dyn Capability>,
}

/// Process-scoped capability table
pub struct CapabilityRegistry {
    factories: BTreeMap<String, Arc<dyn CapabilityFactory>>,
    attributes: BTreeMap<String, Map<String, Value>>,
    blacklist: HashSet<String>,
    objects: Mutex<HashMap<CapabilityRef, OpenObject>>,
    next_index: Mutex<HashMap<ActorId, u64>>,
    wakeup: WakeupHandle,
}

impl CapabilityRegistry {
    /// Create an empty registry using the capability settings of `config`
    pub fn new(config: &RuntimeConfig, wakeup: WakeupHandle) -> Self {
        let attributes = config
            .capabilities
            .iter()
            .map(|(name, c)| (name.clone(), c.attributes.clone()))
            .collect();
        Self {
            factories: BTreeMap::new(),
            attributes,
            blacklist: config.capabilities_blacklist.iter().cloned().collect(),
            objects: Mutex::new(HashMap::new()),
            next_index: Mutex::new(HashMap::new()),
            wakeup,
        }
    }

    /// Register a factory; blacklisted names are silently left out
    pub fn register_factory(
        &mut self,
        factory: impl CapabilityFactory + 'static,
    ) -> Result<(), CapabilityError> {
        let name = factory.name().to_string();
        if self.blacklist.contains(&name) {
            info!(capability = %name, "capability blacklisted, not registered");
            return Ok(());
        }
        if self.factories.contains_key(&name) {
            return Err(CapabilityError::AlreadyRegistered(name));
        }
        debug!(capability = %name, "registered capability");
        self.factories.insert(name, Arc::new(factory));
        Ok(())
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.factories.contains_key(name) && !self.blacklist.contains(name)
    }

    /// Names of all offered capabilities, sorted
    pub fn list_capabilities(&self) -> Vec<&str> {
        self.factories
            .keys()
            .filter(|name| !self.blacklist.contains(*name))
            .map(String::as_str)
            .collect()
    }

    pub fn wakeup(&self) -> &WakeupHandle {
        &self.wakeup
    }

    /// Open a capability object on behalf of `actor`
    pub fn open(
        &self,
        actor: &ActorId,
        name: &str,
        args: Map<String, Value>,
    ) -> Result<CapabilityRef, CapabilityError> {
        let factory = self.factory(name)?;
        let capability = factory.open(self.open_context(actor), &self.merged_args(name, &args))?;

        let index = self.allocate_index(actor);
        let reference = CapabilityRef::new(actor, index);
        debug!(actor = %actor, capability = %name, reference = %reference, "opened capability");
        self.objects.lock().insert(
            reference.clone(),
            OpenObject {
                owner: actor.clone(),
                name: name.to_string(),
                args,
                capability,
            },
        );
        Ok(reference)
    }

    pub fn can_read(&self, reference: &CapabilityRef) -> Result<bool, CapabilityError> {
        self.with_object(reference, |obj| Ok(obj.capability.can_read()))
    }

    pub fn read(&self, reference: &CapabilityRef) -> Result<Value, CapabilityError> {
        self.with_object(reference, |obj| {
            if !obj.capability.can_read() {
                return Err(CapabilityError::NotReadable(reference.clone()));
            }
            obj.capability.read()
        })
    }

    pub fn can_write(&self, reference: &CapabilityRef) -> Result<bool, CapabilityError> {
        self.with_object(reference, |obj| Ok(obj.capability.can_write()))
    }

    pub fn write(&self, reference: &CapabilityRef, data: Value) -> Result<(), CapabilityError> {
        self.with_object(reference, |obj| {
            if !obj.capability.can_write() {
                return Err(CapabilityError::NotWritable(reference.clone()));
            }
            obj.capability.write(data)
        })
    }

    pub fn close(&self, reference: &CapabilityRef) -> Result<(), CapabilityError> {
        let mut obj = self
            .objects
            .lock()
            .remove(reference)
            .ok_or_else(|| CapabilityError::InvalidRef(reference.clone()))?;
        obj.capability.close();
        debug!(reference = %reference, capability = %obj.name, "closed capability");
        Ok(())
    }

    /// Close every object owned by `actor`
    pub fn close_all(&self, actor: &ActorId) {
        let owned: Vec<OpenObject> = {
            let mut objects = self.objects.lock();
            let refs: Vec<CapabilityRef> = objects
                .iter()
                .filter(|(_, obj)| &obj.owner == actor)
                .map(|(r, _)| r.clone())
                .collect();
            refs.iter().filter_map(|r| objects.remove(r)).collect()
        };
        for mut obj in owned {
            obj.capability.close();
        }
        self.next_index.lock().remove(actor);
    }

    /// Number of objects currently open for `actor`
    pub fn open_count(&self, actor: &ActorId) -> usize {
        self.objects
            .lock()
            .values()
            .filter(|obj| &obj.owner == actor)
            .count()
    }

    /// Serialize every object owned by `actor`, ordered by reference index
    pub fn serialize(&self, actor: &ActorId) -> Vec<CapabilityState> {
        let objects = self.objects.lock();
        let mut states: Vec<CapabilityState> = objects
            .iter()
            .filter(|(_, obj)| &obj.owner == actor)
            .map(|(reference, obj)| CapabilityState {
                reference: reference.clone(),
                name: obj.name.clone(),
                args: obj.args.clone(),
                state: obj.capability.serialize(),
            })
            .collect();
        states.sort_by_key(|s| s.reference.index());
        states
    }

    /// Restore migrated objects for `actor` under their original references
    ///
    /// All or nothing: if any object fails to restore, the ones already
    /// restored are closed and nothing is registered.
    pub fn deserialize(
        &self,
        actor: &ActorId,
        states: &[CapabilityState],
    ) -> Result<(), CapabilityError> {
        if let Some(missing) = states.iter().find(|s| !self.has_capability(&s.name)) {
            return Err(CapabilityError::NotAvailable(missing.name.clone()));
        }
        let mut restored: Vec<Box<dyn Capability>> = Vec::with_capacity(states.len());
        for state in states {
            let result = self.factory(&state.name).and_then(|factory| {
                factory.restore(
                    self.open_context(actor),
                    &state.state,
                    &self.merged_args(&state.name, &state.args),
                )
            });
            match result {
                Ok(capability) => restored.push(capability),
                Err(error) => {
                    for mut capability in restored {
                        capability.close();
                    }
                    return Err(error);
                }
            }
        }

        for (state, capability) in states.iter().zip(restored) {
            if let Some(index) = state.reference.index() {
                let mut next = self.next_index.lock();
                let slot = next.entry(actor.clone()).or_insert(0);
                *slot = (*slot).max(index + 1);
            }
            self.objects.lock().insert(
                state.reference.clone(),
                OpenObject {
                    owner: actor.clone(),
                    name: state.name.clone(),
                    args: state.args.clone(),
                    capability,
                },
            );
        }
        Ok(())
    }

    fn factory(&self, name: &str) -> Result<Arc<dyn CapabilityFactory>, CapabilityError> {
        if !self.has_capability(name) {
            return Err(CapabilityError::NotAvailable(name.to_string()));
        }
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| CapabilityError::NotAvailable(name.to_string()))
    }

    fn open_context(&self, actor: &ActorId) -> OpenContext {
        OpenContext {
            actor: actor.clone(),
            wakeup: self.wakeup.clone(),
        }
    }

    /// Platform attributes take precedence over open-time arguments
    fn merged_args(&self, name: &str, args: &Map<String, Value>) -> Map<String, Value> {
        let mut merged = args.clone();
        if let Some(attributes) = self.attributes.get(name) {
            for (k, v) in attributes {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    }

    fn allocate_index(&self, actor: &ActorId) -> u64 {
        let mut next = self.next_index.lock();
        let slot = next.entry(actor.clone()).or_insert(0);
        let index = *slot;
        *slot += 1;
        index
    }

    fn with_object<T>(
        &self,
        reference: &CapabilityRef,
        f: impl FnOnce(&mut OpenObject) -> Result<T, CapabilityError>,
    ) -> Result<T, CapabilityError> {
        let mut objects = self.objects.lock();
        let obj = objects
            .get_mut(reference)
            .ok_or_else(|| CapabilityError::InvalidRef(reference.clone()))?;
        f(obj)
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.list_capabilities())
            .field("open", &self.objects.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::config::CapabilityConfig;
    use serde_json::json;

    /// Counts writes; readable once something was written
    struct Echo {
        last: Option<Value>,
        prefix: String,
    }

    impl Capability for Echo {
        fn can_read(&self) -> bool {
            self.last.is_some()
        }

        fn read(&mut self) -> Result<Value, CapabilityError> {
            let value = self.last.take().unwrap_or(Value::Null);
            Ok(json!(format!("{}{}", self.prefix, value)))
        }

        fn can_write(&self) -> bool {
            true
        }

        fn write(&mut self, data: Value) -> Result<(), CapabilityError> {
            self.last = Some(data);
            Ok(())
        }

        fn serialize(&self) -> Value {
            json!({ "last": self.last })
        }
    }

    struct EchoFactory;

    impl CapabilityFactory for EchoFactory {
        fn name(&self) -> &str {
            "test.echo"
        }

        fn open(
            &self,
            _ctx: OpenContext,
            args: &Map<String, Value>,
        ) -> Result<Box<dyn Capability>, CapabilityError> {
            let prefix = args
                .get("prefix")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            Ok(Box::new(Echo { last: None, prefix }))
        }

        fn restore(
            &self,
            ctx: OpenContext,
            state: &Value,
            args: &Map<String, Value>,
        ) -> Result<Box<dyn Capability>, CapabilityError> {
            let mut cap = self.open(ctx, args)?;
            if let Some(last) = state.get("last").filter(|v| !v.is_null()) {
                cap.write(last.clone())?;
            }
            Ok(cap)
        }
    }

    fn registry(config: RuntimeConfig) -> CapabilityRegistry {
        let (wakeup, _rx) = WakeupHandle::channel();
        let mut caps = CapabilityRegistry::new(&config, wakeup);
        caps.register_factory(EchoFactory).unwrap();
        caps
    }

    #[test]
    fn test_open_read_write_close() {
        let caps = registry(RuntimeConfig::default());
        let actor = ActorId::new("a");
        let r = caps.open(&actor, "test.echo", Map::new()).unwrap();
        assert_eq!(r.as_str(), "a#0");

        assert!(!caps.can_read(&r).unwrap());
        assert!(matches!(caps.read(&r), Err(CapabilityError::NotReadable(_))));
        caps.write(&r, json!(5)).unwrap();
        assert!(caps.can_read(&r).unwrap());
        assert_eq!(caps.read(&r).unwrap(), json!("5"));

        caps.close(&r).unwrap();
        assert!(matches!(caps.can_read(&r), Err(CapabilityError::InvalidRef(_))));
    }

    #[test]
    fn test_refs_increase_per_actor() {
        let caps = registry(RuntimeConfig::default());
        let a = ActorId::new("a");
        let b = ActorId::new("b");
        let r0 = caps.open(&a, "test.echo", Map::new()).unwrap();
        let r1 = caps.open(&a, "test.echo", Map::new()).unwrap();
        let rb = caps.open(&b, "test.echo", Map::new()).unwrap();
        assert_eq!((r0.index(), r1.index(), rb.index()), (Some(0), Some(1), Some(0)));

        caps.close_all(&a);
        assert_eq!(caps.open_count(&a), 0);
        assert_eq!(caps.open_count(&b), 1);
    }

    #[test]
    fn test_blacklist_hides_capability() {
        let config = RuntimeConfig {
            capabilities_blacklist: vec!["test.echo".into()],
            ..RuntimeConfig::default()
        };
        let caps = registry(config);
        assert!(!caps.has_capability("test.echo"));
        assert!(caps.list_capabilities().is_empty());
        assert!(matches!(
            caps.open(&ActorId::new("a"), "test.echo", Map::new()),
            Err(CapabilityError::NotAvailable(_))
        ));
    }

    #[test]
    fn test_attributes_override_arguments() {
        let mut config = RuntimeConfig::default();
        let mut attributes = Map::new();
        attributes.insert("prefix".into(), json!("platform:"));
        config
            .capabilities
            .insert("test.echo".into(), CapabilityConfig { attributes });
        let caps = registry(config);

        let mut args = Map::new();
        args.insert("prefix".into(), json!("actor:"));
        let r = caps.open(&ActorId::new("a"), "test.echo", args).unwrap();
        caps.write(&r, json!(1)).unwrap();
        assert_eq!(caps.read(&r).unwrap(), json!("platform:1"));
    }

    #[test]
    fn test_serialize_restores_under_same_ref() {
        let source = registry(RuntimeConfig::default());
        let actor = ActorId::new("mover");
        source.open(&actor, "test.echo", Map::new()).unwrap();
        let r = source.open(&actor, "test.echo", Map::new()).unwrap();
        source.write(&r, json!("kept")).unwrap();

        let states = source.serialize(&actor);
        assert_eq!(states.len(), 2);
        assert_eq!(states[1].reference, r);

        let target = registry(RuntimeConfig::default());
        target.deserialize(&actor, &states).unwrap();
        assert_eq!(target.read(&r).unwrap(), json!("\"kept\""));

        // indices keep increasing past the restored ones
        let fresh = target.open(&actor, "test.echo", Map::new()).unwrap();
        assert_eq!(fresh.index(), Some(2));
    }

    struct BrokenFactory;

    impl CapabilityFactory for BrokenFactory {
        fn name(&self) -> &str {
            "test.broken"
        }

        fn open(
            &self,
            _ctx: OpenContext,
            _args: &Map<String, Value>,
        ) -> Result<Box<dyn Capability>, CapabilityError> {
            Err(CapabilityError::Failed {
                name: "test.broken".into(),
                reason: "cannot reopen".into(),
            })
        }
    }

    #[test]
    fn test_failed_restore_leaves_nothing_open() {
        let mut caps = registry(RuntimeConfig::default());
        caps.register_factory(BrokenFactory).unwrap();
        let actor = ActorId::new("mover");
        let states = vec![
            CapabilityState {
                reference: CapabilityRef::new(&actor, 0),
                name: "test.echo".into(),
                args: Map::new(),
                state: Value::Null,
            },
            CapabilityState {
                reference: CapabilityRef::new(&actor, 1),
                name: "test.broken".into(),
                args: Map::new(),
                state: Value::Null,
            },
        ];

        assert!(matches!(
            caps.deserialize(&actor, &states),
            Err(CapabilityError::Failed { .. })
        ));
        assert_eq!(caps.open_count(&actor), 0);
        assert!(matches!(
            caps.can_read(&states[0].reference),
            Err(CapabilityError::InvalidRef(_))
        ));
        // nothing was reserved either
        let fresh = caps.open(&actor, "test.echo", Map::new()).unwrap();
        assert_eq!(fresh.index(), Some(0));
    }

    #[test]
    fn test_deserialize_missing_capability() {
        let empty = {
            let (wakeup, _rx) = WakeupHandle::channel();
            CapabilityRegistry::new(&RuntimeConfig::default(), wakeup)
        };
        let states = vec![CapabilityState {
            reference: CapabilityRef::new(&ActorId::new("a"), 0),
            name: "test.echo".into(),
            args: Map::new(),
            state: Value::Null,
        }];
        assert!(matches!(
            empty.deserialize(&ActorId::new("a"), &states),
            Err(CapabilityError::NotAvailable(_))
        ));
    }
}
