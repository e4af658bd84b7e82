//! Runtime coordinator for the dataflow kernel
//!
//! The runtime manages:
//! - Actor types (registration) and instances (creation, destruction)
//! - Connections between ports, and token delivery along them
//! - Capabilities (process-scoped registry, wakeups)
//! - Scheduling passes (one fire per pass, single-threaded)
//! - Migration (snapshot out, restore in)
//!
//! Several runtimes can live in one process; they share nothing.

pub mod config;
pub mod error;
pub mod migration;

pub use config::{CapabilityConfig, ConfigError, RuntimeConfig, SchedulerConfig};
pub use error::{ActorError, ActorResult, Result, RuntimeError};
pub use migration::{ActorSnapshot, MigrationError, PortSnapshot};

use crate::action::FireError;
use crate::actor::{Actor, ActorState, Behavior};
use crate::capability::{CapabilityRegistry, WakeupHandle};
use crate::port::{Endpoint, Port};
use crate::scheduler::{RunStats, Scheduler};
use crate::store::{ActorStore, PortOverrides, PortSetup};
use crate::token::Token;
use crate::types::{ActorId, Direction, PortId};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;

/// Writer id used by [`Runtime::inject`]
pub const INJECT_WRITER: &str = "calvin.inject";

/// Reader id used by [`Runtime::drain`]
pub const DRAIN_READER: &str = "calvin.drain";

/// An actor fault, handed to whoever manages actor lifecycles
#[derive(Debug)]
pub struct FaultReport {
    pub actor: ActorId,
    pub action: String,
    pub error: FireError,
}

/// The main runtime coordinator
///
/// # Example
///
/// ```
/// use calvin_core::runtime::{Runtime, RuntimeConfig};
///
/// let runtime = Runtime::new(RuntimeConfig::default());
/// assert_eq!(runtime.actor_ids().count(), 0);
/// assert!(runtime.capabilities().list_capabilities().is_empty());
/// ```
pub struct Runtime {
    config: RuntimeConfig,
    store: ActorStore,
    caps: CapabilityRegistry,
    actors: HashMap<ActorId, Actor>,
    scheduler: Scheduler,
    faults: Vec<FaultReport>,
}

impl Runtime {
    /// Create a runtime with no actor types and no capabilities
    pub fn new(config: RuntimeConfig) -> Self {
        let scheduler = Scheduler::new();
        let caps = CapabilityRegistry::new(&config, scheduler.handle());
        Self {
            config,
            store: ActorStore::new(),
            caps,
            actors: HashMap::new(),
            scheduler,
            faults: Vec::new(),
        }
    }

    /// Create a new runtime with default configuration
    pub fn with_defaults() -> Self {
        Self::new(RuntimeConfig::default())
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn store(&self) -> &ActorStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ActorStore {
        &mut self.store
    }

    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.caps
    }

    pub fn capabilities_mut(&mut self) -> &mut CapabilityRegistry {
        &mut self.caps
    }

    pub fn wakeup_handle(&self) -> WakeupHandle {
        self.scheduler.handle()
    }

    /// Register actor type `B` with this runtime's store
    pub fn register<B: Behavior>(&mut self) -> Result<()> {
        self.store.register::<B>()?;
        Ok(())
    }

    /// Create an actor with declared port properties
    pub fn new_actor(
        &mut self,
        actor_type: &str,
        name: impl Into<String>,
        args: Map<String, Value>,
    ) -> Result<ActorId> {
        self.new_actor_with_ports(actor_type, name, args, PortOverrides::new())
    }

    /// Create an actor, overriding declared port properties
    pub fn new_actor_with_ports(
        &mut self,
        actor_type: &str,
        name: impl Into<String>,
        args: Map<String, Value>,
        overrides: PortOverrides,
    ) -> Result<ActorId> {
        let id = ActorId::generate();
        let setup = PortSetup {
            queue_length: self.config.queue_length,
            overrides,
        };
        let mut actor = self
            .store
            .create(actor_type, id.clone(), name, &args, &self.caps, &setup)
            .inspect_err(|_| self.caps.close_all(&id))?;
        actor.set_state(ActorState::Enabled);
        tracing::info!(actor = %id, name = actor.name(), actor_type, "created actor");
        self.actors.insert(id.clone(), actor);
        self.scheduler.wake(&id);
        Ok(id)
    }

    /// Get an actor by ID
    pub fn actor(&self, id: &ActorId) -> Option<&Actor> {
        self.actors.get(id)
    }

    /// Find an actor by its deployment name
    pub fn actor_by_name(&self, name: &str) -> Option<&Actor> {
        self.actors.values().find(|a| a.name() == name)
    }

    /// List all actor IDs
    pub fn actor_ids(&self) -> impl Iterator<Item = &ActorId> {
        self.actors.keys()
    }

    /// Resolve a port name to its id
    pub fn port_id(&self, actor: &ActorId, port: &str, direction: Direction) -> Result<PortId> {
        let found = self
            .actors
            .get(actor)
            .ok_or_else(|| ActorError::NotFound(actor.clone()))?
            .port(port, direction)
            .ok_or_else(|| ActorError::PortNotFound {
                actor: actor.clone(),
                port: port.to_string(),
                direction,
            })?;
        Ok(found.id.clone())
    }

    /// Connect an out-port to an in-port; both actors must be local
    pub fn connect(
        &mut self,
        out_actor: &ActorId,
        out_port: &str,
        in_actor: &ActorId,
        in_port: &str,
    ) -> Result<()> {
        let out_id = self.port_id(out_actor, out_port, Direction::Out)?;
        let in_id = self.port_id(in_actor, in_port, Direction::In)?;
        let tag = self.port_ref(out_actor, &out_id)?.writer_tag();

        self.port_ref_mut(out_actor, &out_id)?.attach(
            Endpoint {
                peer_actor: in_actor.clone(),
                peer_port: in_id.clone(),
            },
            None,
        );
        self.port_ref_mut(in_actor, &in_id)?.attach(
            Endpoint {
                peer_actor: out_actor.clone(),
                peer_port: out_id,
            },
            Some(tag),
        );
        tracing::debug!(from = %out_actor, out_port, to = %in_actor, in_port, "connected");
        self.scheduler.wake(out_actor);
        self.scheduler.wake(in_actor);
        Ok(())
    }

    /// Remove a connection; unread tokens on it are dropped
    pub fn disconnect(
        &mut self,
        out_actor: &ActorId,
        out_port: &str,
        in_actor: &ActorId,
        in_port: &str,
    ) -> Result<bool> {
        let out_id = self.port_id(out_actor, out_port, Direction::Out)?;
        let in_id = self.port_id(in_actor, in_port, Direction::In)?;
        let detached = self.port_ref_mut(out_actor, &out_id)?.detach(&in_id);
        let detached = self.port_ref_mut(in_actor, &in_id)?.detach(&out_id) || detached;
        // either side may have become fireable
        self.scheduler.wake(out_actor);
        self.scheduler.wake(in_actor);
        Ok(detached)
    }

    /// Remove an actor, closing its capabilities and unlinking local peers
    pub fn destroy_actor(&mut self, id: &ActorId) -> Result<()> {
        let mut actor = self
            .actors
            .remove(id)
            .ok_or_else(|| ActorError::NotFound(id.clone()))?;
        self.scheduler.forget(id);
        actor.will_end(&self.caps);
        self.caps.close_all(id);

        for port in actor.ports() {
            for endpoint in &port.endpoints {
                if let Some(peer) = self.actors.get_mut(&endpoint.peer_actor) {
                    if let Some(peer_port) = peer.port_by_id_mut(&endpoint.peer_port) {
                        peer_port.detach(&port.id);
                    }
                    self.scheduler.wake(&endpoint.peer_actor);
                }
            }
        }
        tracing::info!(actor = %id, name = actor.name(), "destroyed actor");
        Ok(())
    }

    /// Apply an authorization decision; denied actors are never scheduled
    pub fn set_authorized(&mut self, id: &ActorId, allowed: bool) -> Result<()> {
        let actor = self
            .actors
            .get_mut(id)
            .ok_or_else(|| ActorError::NotFound(id.clone()))?;
        if allowed {
            actor.set_state(ActorState::Enabled);
            self.scheduler.wake(id);
        } else {
            tracing::info!(actor = %id, "actor denied");
            actor.set_state(ActorState::Denied);
            self.scheduler.forget(id);
        }
        Ok(())
    }

    /// Add an actor to the work set
    pub fn wake(&mut self, id: &ActorId) {
        self.scheduler.wake(id);
    }

    /// Write a token straight into an in-port, as if from an upstream peer
    pub fn inject(&mut self, actor: &ActorId, port: &str, token: Token) -> Result<()> {
        let port_id = self.port_id(actor, port, Direction::In)?;
        let queue = &mut self.port_ref_mut(actor, &port_id)?.queue;
        if !queue.has_writer(INJECT_WRITER) {
            queue.add_writer(INJECT_WRITER, None);
        }
        queue.write(token, INJECT_WRITER)?;
        self.scheduler.wake(actor);
        Ok(())
    }

    /// Read and commit everything an out-port holds for the drain tap
    ///
    /// The first call registers the tap as a reader of the port; from then
    /// on the port keeps tokens until the tap has read them too.
    pub fn drain(&mut self, actor: &ActorId, port: &str) -> Result<Vec<Token>> {
        let port_id = self.port_id(actor, port, Direction::Out)?;
        let queue = &mut self.port_ref_mut(actor, &port_id)?.queue;
        queue.add_reader(DRAIN_READER);
        let mut tokens = Vec::new();
        while let Ok(token) = queue.peek(DRAIN_READER) {
            tokens.push(token);
        }
        queue.commit(DRAIN_READER)?;
        self.scheduler.wake(actor);
        Ok(tokens)
    }

    /// Take all fault reports collected so far
    pub fn faults(&mut self) -> Vec<FaultReport> {
        std::mem::take(&mut self.faults)
    }

    /// Run passes until the work set is empty or `limit` fire attempts were made
    ///
    /// `None` uses `scheduler.max_fires_per_pass` from the configuration.
    pub fn run_until_idle(&mut self, limit: Option<usize>) -> RunStats {
        let limit = limit.unwrap_or(self.config.scheduler.max_fires_per_pass);
        let mut stats = RunStats::default();
        while stats.attempts() < limit {
            self.scheduler.drain_wakeups();
            let Some(id) = self.scheduler.pop() else {
                break;
            };
            self.pass(&id, &mut stats);
        }
        stats
    }

    /// Run until `shutdown` resolves, sleeping on the wakeup channel when idle
    pub async fn run<F>(&mut self, shutdown: F) -> RunStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut total = RunStats::default();
        loop {
            total.absorb(self.run_until_idle(None));
            self.scheduler.drain_wakeups();
            if !self.scheduler.is_empty() {
                // pass budget spent; let timers and other tasks run before continuing
                tokio::select! {
                    biased;
                    _ = &mut shutdown => break,
                    _ = tokio::task::yield_now() => continue,
                }
            }
            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.scheduler.wait_for_wakeup() => {}
            }
        }
        tracing::info!(
            fires = total.fires,
            idle_checks = total.idle_checks,
            faults = total.faults,
            "runtime stopped"
        );
        total
    }

    /// Close every actor's capabilities and drop all actors
    pub fn shutdown(&mut self) {
        let ids: Vec<ActorId> = self.actors.keys().cloned().collect();
        for id in ids {
            if let Some(mut actor) = self.actors.remove(&id) {
                actor.will_end(&self.caps);
                self.caps.close_all(&id);
            }
            self.scheduler.forget(&id);
        }
    }

    /// One scheduling pass: pull pending input, fire once, push output
    fn pass(&mut self, id: &ActorId, stats: &mut RunStats) {
        match self.actors.get(id) {
            Some(actor) if actor.state() == ActorState::Enabled => {}
            _ => return,
        }
        self.pull_inputs(id);

        let Some(actor) = self.actors.get_mut(id) else {
            return;
        };
        match actor.fire(&self.caps) {
            Ok(outcome) if outcome.fired => {
                stats.fires += 1;
                self.push_outputs(id);
                self.scheduler.wake(id);
            }
            Ok(_) => stats.idle_checks += 1,
            Err(error) => {
                stats.faults += 1;
                tracing::warn!(actor = %id, %error, "actor fault");
                self.faults.push(FaultReport {
                    actor: id.clone(),
                    action: error.action().to_string(),
                    error,
                });
            }
        }
    }

    fn pull_inputs(&mut self, id: &ActorId) {
        for (in_id, endpoint) in self.links(id, Direction::In) {
            self.transfer(&endpoint.peer_actor, &endpoint.peer_port, id, &in_id);
        }
    }

    fn push_outputs(&mut self, id: &ActorId) {
        for (out_id, endpoint) in self.links(id, Direction::Out) {
            self.transfer(id, &out_id, &endpoint.peer_actor, &endpoint.peer_port);
        }
    }

    /// (own port id, endpoint) pairs for every connection in one direction
    fn links(&self, id: &ActorId, direction: Direction) -> Vec<(PortId, Endpoint)> {
        self.actors
            .get(id)
            .map(|actor| {
                actor
                    .ports()
                    .iter()
                    .filter(|p| p.direction == direction)
                    .flat_map(|p| p.endpoints.iter().map(|e| (p.id.clone(), e.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Move tokens along one connection, at most as many as the in-port accepts
    ///
    /// Tokens are committed out of the out-port only after they were
    /// written into the in-port. A peer that is not here (remote or
    /// migrating) leaves them waiting in the out-port.
    fn transfer(&mut self, from: &ActorId, out_id: &PortId, to: &ActorId, in_id: &PortId) -> usize {
        let free = match self.actors.get(to) {
            Some(target) if target.state() != ActorState::Migrating => target
                .port_by_id(in_id)
                .map(|p| p.queue.free_slots(out_id.as_str()))
                .unwrap_or(0),
            _ => {
                tracing::debug!(from = %from, to = %to, "peer absent, delivery deferred");
                return 0;
            }
        };
        if free == 0 {
            return 0;
        }

        let mut batch = Vec::new();
        if let Some(source) = self
            .actors
            .get_mut(from)
            .and_then(|a| a.port_by_id_mut(out_id))
        {
            while batch.len() < free {
                match source.queue.peek(in_id.as_str()) {
                    Ok(token) => batch.push(token),
                    Err(_) => break,
                }
            }
        }
        if batch.is_empty() {
            return 0;
        }

        let expected = batch.len();
        let mut written = 0;
        if let Some(target) = self.actors.get_mut(to).and_then(|a| a.port_by_id_mut(in_id)) {
            for token in batch {
                if target.queue.write(token, out_id.as_str()).is_err() {
                    break;
                }
                written += 1;
            }
        }

        if let Some(source) = self
            .actors
            .get_mut(from)
            .and_then(|a| a.port_by_id_mut(out_id))
        {
            // a short write leaves the rest for a retry; already written tokens may repeat
            let result = if written == expected {
                source.queue.commit(in_id.as_str())
            } else {
                source.queue.cancel(in_id.as_str())
            };
            if let Err(error) = result {
                tracing::warn!(port = %out_id, %error, "could not settle transfer");
            }
        }

        if written > 0 {
            self.scheduler.wake(to);
            self.scheduler.wake(from);
        }
        written
    }

    fn port_ref(&self, actor: &ActorId, port: &PortId) -> Result<&Port> {
        let found = self
            .actors
            .get(actor)
            .ok_or_else(|| ActorError::NotFound(actor.clone()))?;
        Ok(found
            .port_by_id(port)
            .ok_or_else(|| ActorError::UnknownPort(port.clone()))?)
    }

    fn port_ref_mut(&mut self, actor: &ActorId, port: &PortId) -> Result<&mut Port> {
        let found = self
            .actors
            .get_mut(actor)
            .ok_or_else(|| ActorError::NotFound(actor.clone()))?;
        Ok(found
            .port_by_id_mut(port)
            .ok_or_else(|| ActorError::UnknownPort(port.clone()))?)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("actors", &self.actors.len())
            .field("store", &self.store)
            .field("capabilities", &self.caps)
            .field("scheduled", &self.scheduler.len())
            .finish()
    }
}
