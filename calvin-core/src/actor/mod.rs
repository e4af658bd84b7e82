//! Actors and the firing engine
//!
//! This module provides the actor abstractions:
//! - `Behavior`: trait an actor type implements (state, ports, action table)
//! - `Actor`: a running instance, owning its ports and erased behaviour
//! - `ActorContext`: controlled access for guards, bodies and hooks
//!
//! `Actor::fire` is one quantum of work: actions are tried in priority
//! order and at most one fires. An action is only attempted once its
//! guard passes, every input has a token and every output has a free
//! slot, so a failed check never touches a queue.

mod behavior;
mod context;

pub use behavior::{Behavior, PortDecl};
pub use context::ActorContext;

pub(crate) use behavior::{ActionTable, BehaviorFactory, DynBehavior, TypedFactory};

use crate::action::{ActionInput, FireError, FireOutcome};
use crate::capability::CapabilityRegistry;
use crate::port::Port;
use crate::token::Token;
use crate::types::{ActorId, Direction, PortId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Scheduling state of an actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorState {
    /// Constructed, not yet handed to the scheduler
    Created,
    /// Scheduled normally
    Enabled,
    /// Hand-off in progress; never scheduled
    Migrating,
    /// Refused by the authorization collaborator; never scheduled
    Denied,
}

impl fmt::Display for ActorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActorState::Created => "created",
            ActorState::Enabled => "enabled",
            ActorState::Migrating => "migrating",
            ActorState::Denied => "denied",
        };
        f.write_str(s)
    }
}

/// A running actor instance
pub struct Actor {
    id: ActorId,
    name: String,
    actor_type: String,
    state: ActorState,
    ports: Vec<Port>,
    behavior: Box<dyn DynBehavior>,
}

impl Actor {
    pub(crate) fn new(
        id: ActorId,
        name: String,
        actor_type: String,
        ports: Vec<Port>,
        behavior: Box<dyn DynBehavior>,
    ) -> Self {
        Self {
            id,
            name,
            actor_type,
            state: ActorState::Created,
            ports,
            behavior,
        }
    }

    /// Get the actor ID
    pub fn id(&self) -> &ActorId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn actor_type(&self) -> &str {
        &self.actor_type
    }

    pub fn state(&self) -> ActorState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ActorState) {
        self.state = state;
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub(crate) fn ports_mut(&mut self) -> &mut [Port] {
        &mut self.ports
    }

    /// Look up a port by name and direction
    pub fn port(&self, name: &str, direction: Direction) -> Option<&Port> {
        self.ports
            .iter()
            .find(|p| p.name == name && p.direction == direction)
    }

    pub fn port_mut(&mut self, name: &str, direction: Direction) -> Option<&mut Port> {
        self.ports
            .iter_mut()
            .find(|p| p.name == name && p.direction == direction)
    }

    pub fn port_by_id(&self, id: &PortId) -> Option<&Port> {
        self.ports.iter().find(|p| &p.id == id)
    }

    pub fn port_by_id_mut(&mut self, id: &PortId) -> Option<&mut Port> {
        self.ports.iter_mut().find(|p| &p.id == id)
    }

    /// Serialized managed state
    pub fn state_value(&self) -> Result<Value, serde_json::Error> {
        self.behavior.state()
    }

    /// Would `fire` fire something right now? Touches no queue.
    pub fn enabled(&self, caps: &CapabilityRegistry) -> bool {
        let ctx = ActorContext::new(&self.id, caps);
        (0..self.behavior.action_count())
            .any(|idx| self.behavior.allowed(idx, &ctx) && self.ready(idx))
    }

    /// Fire the first action, in priority order, whose guard and queue checks pass
    pub fn fire(&mut self, caps: &CapabilityRegistry) -> Result<FireOutcome, FireError> {
        for idx in 0..self.behavior.action_count() {
            let allowed = {
                let ctx = ActorContext::new(&self.id, caps);
                self.behavior.allowed(idx, &ctx)
            };
            if !allowed || !self.ready(idx) {
                continue;
            }
            let action = self.behavior.action(idx).name;
            self.fire_action(idx, caps)?;
            tracing::trace!(actor = %self.id, action, "fired");
            return Ok(FireOutcome::fired(action));
        }
        Ok(FireOutcome::idle())
    }

    pub(crate) fn will_migrate(&mut self, caps: &CapabilityRegistry) {
        let mut ctx = ActorContext::new(&self.id, caps);
        self.behavior.will_migrate(&mut ctx);
    }

    pub(crate) fn did_migrate(&mut self, caps: &CapabilityRegistry) {
        let mut ctx = ActorContext::new(&self.id, caps);
        self.behavior.did_migrate(&mut ctx);
    }

    pub(crate) fn will_end(&mut self, caps: &CapabilityRegistry) {
        let mut ctx = ActorContext::new(&self.id, caps);
        self.behavior.will_end(&mut ctx);
    }

    /// Roll back every tentative read on every port
    pub(crate) fn cancel_tentative(&mut self) {
        for port in &mut self.ports {
            port.queue.cancel_all();
        }
    }

    /// Data and capacity checks of one action
    fn ready(&self, idx: usize) -> bool {
        let shape = self.behavior.action(idx);
        let inputs_ready = shape.inputs.iter().all(|name| {
            self.port(name, Direction::In)
                .map(|p| p.queue.tokens_available(1, self.id.as_str()))
                .unwrap_or(false)
        });
        inputs_ready
            && shape.outputs.iter().all(|name| {
                self.port(name, Direction::Out)
                    .map(|p| p.queue.slots_available(1, p.id.as_str()))
                    .unwrap_or(false)
            })
    }

    fn fire_action(&mut self, idx: usize, caps: &CapabilityRegistry) -> Result<(), FireError> {
        let shape = self.behavior.action(idx);
        let action = shape.name;
        let inputs: Vec<&'static str> = shape.inputs.to_vec();
        let outputs: Vec<&'static str> = shape.outputs.to_vec();
        let metadata = shape.metadata;

        let mut tokens = Vec::with_capacity(inputs.len());
        for name in &inputs {
            match self.peek_input(name) {
                Ok(token) if metadata => tokens.push((name.to_string(), token)),
                Ok(token) => tokens.push((name.to_string(), token.strip_metadata())),
                Err(reason) => {
                    self.cancel_inputs(&inputs);
                    return Err(FireError::ContractViolation {
                        action: action.to_string(),
                        reason,
                    });
                }
            }
        }

        let result = {
            let mut ctx = ActorContext::new(&self.id, caps);
            self.behavior.invoke(idx, &mut ctx, ActionInput::new(tokens))
        };
        let values = match result {
            Ok(values) => values,
            Err(error) => {
                self.cancel_inputs(&inputs);
                tracing::warn!(actor = %self.id, action, %error, "action faulted, inputs rolled back");
                return Err(FireError::Fault {
                    action: action.to_string(),
                    error,
                });
            }
        };

        if values.len() != outputs.len() {
            self.cancel_inputs(&inputs);
            return Err(FireError::ContractViolation {
                action: action.to_string(),
                reason: format!(
                    "expected {} output(s), body produced {}",
                    outputs.len(),
                    values.len()
                ),
            });
        }

        for (name, value) in outputs.iter().zip(values) {
            if let Err(reason) = self.write_output(name, Token::new(value)) {
                self.cancel_inputs(&inputs);
                return Err(FireError::ContractViolation {
                    action: action.to_string(),
                    reason,
                });
            }
        }

        for name in &inputs {
            if let Some(port) = self.port_mut(name, Direction::In) {
                // reader is the owning actor, always registered
                let _ = port.queue.commit(port.owner.as_str());
            }
        }
        Ok(())
    }

    fn peek_input(&mut self, name: &str) -> Result<Token, String> {
        let port = self
            .port_mut(name, Direction::In)
            .ok_or_else(|| format!("no in-port named {}", name))?;
        port.queue
            .peek(port.owner.as_str())
            .map_err(|e| format!("peek on {} failed after check: {}", name, e))
    }

    fn write_output(&mut self, name: &str, token: Token) -> Result<(), String> {
        let port = self
            .port_mut(name, Direction::Out)
            .ok_or_else(|| format!("no out-port named {}", name))?;
        port.queue
            .write(token, port.id.as_str())
            .map_err(|e| format!("write on {} failed after check: {}", name, e))
    }

    fn cancel_inputs(&mut self, inputs: &[&'static str]) {
        for name in inputs {
            if let Some(port) = self.port_mut(name, Direction::In) {
                let _ = port.queue.cancel(port.owner.as_str());
            }
        }
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("actor_type", &self.actor_type)
            .field("state", &self.state)
            .field("ports", &self.ports.len())
            .finish()
    }
}

