//! Actor types and their type-erased form

use super::ActorContext;
use crate::action::{Action, ActionError, ActionInput};
use crate::port::PortProperties;
use crate::types::Direction;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::Arc;

/// Port declared by an actor type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDecl {
    pub name: &'static str,
    pub direction: Direction,
    /// Defaults used when the deployment does not override them
    pub properties: PortProperties,
}

impl PortDecl {
    pub fn input(name: &'static str) -> Self {
        Self {
            name,
            direction: Direction::In,
            properties: PortProperties::default(),
        }
    }

    pub fn output(name: &'static str) -> Self {
        Self {
            name,
            direction: Direction::Out,
            properties: PortProperties::default(),
        }
    }

    /// Declare a default routing, e.g. `collect-all-tagged`
    pub fn routing(mut self, routing: &str) -> Self {
        self.properties.routing = Some(routing.to_string());
        self
    }
}

/// An actor type
///
/// The implementing struct is the actor's managed state: it is what gets
/// serialized on migration. Everything else (ports, action table,
/// capability requirements) belongs to the type and is fixed at
/// registration.
///
/// # Example
///
/// ```
/// use calvin_core::action::{Action, ActionError, ActionInput};
/// use calvin_core::actor::{Behavior, PortDecl};
/// use calvin_core::ActorContext;
/// use serde::{Deserialize, Serialize};
/// use serde_json::{Map, Value};
///
/// #[derive(Serialize, Deserialize)]
/// struct Identity;
///
/// impl Behavior for Identity {
///     const TYPE: &'static str = "std.Identity";
///
///     fn ports() -> Vec<PortDecl> {
///         vec![PortDecl::input("token"), PortDecl::output("token")]
///     }
///
///     fn init(_args: &Map<String, Value>, _ctx: &mut ActorContext<'_>) -> Result<Self, ActionError> {
///         Ok(Identity)
///     }
///
///     fn actions() -> Vec<Action<Self>> {
///         vec![Action::new("pass", pass).input("token").output("token")]
///     }
/// }
///
/// fn pass(_: &mut Identity, _: &mut ActorContext<'_>, mut input: ActionInput) -> Result<Vec<Value>, ActionError> {
///     Ok(vec![input.take("token")?.value])
/// }
/// ```
pub trait Behavior: Serialize + DeserializeOwned + Send + Sized + 'static {
    /// Type name, e.g. `std.Counter`
    const TYPE: &'static str;

    fn ports() -> Vec<PortDecl>;

    /// Actions in priority order, highest first
    fn actions() -> Vec<Action<Self>>;

    /// Build the initial state from deployment arguments
    fn init(args: &Map<String, Value>, ctx: &mut ActorContext<'_>) -> Result<Self, ActionError>;

    /// Capabilities the runtime must offer before an instance can be created
    fn requires() -> Vec<&'static str> {
        Vec::new()
    }

    fn will_migrate(&mut self, _ctx: &mut ActorContext<'_>) {}

    fn did_migrate(&mut self, _ctx: &mut ActorContext<'_>) {}

    fn will_end(&mut self, _ctx: &mut ActorContext<'_>) {}
}

/// Object-safe view of a running behaviour
pub(crate) trait DynBehavior: Send {
    fn action_count(&self) -> usize;
    fn action(&self, idx: usize) -> ActionShape<'_>;
    fn allowed(&self, idx: usize, ctx: &ActorContext<'_>) -> bool;
    fn invoke(
        &mut self,
        idx: usize,
        ctx: &mut ActorContext<'_>,
        input: ActionInput,
    ) -> Result<Vec<Value>, ActionError>;
    fn state(&self) -> Result<Value, serde_json::Error>;
    fn will_migrate(&mut self, ctx: &mut ActorContext<'_>);
    fn did_migrate(&mut self, ctx: &mut ActorContext<'_>);
    fn will_end(&mut self, ctx: &mut ActorContext<'_>);
}

/// Port names and flags of one action
#[derive(Debug, Clone, Copy)]
pub(crate) struct ActionShape<'a> {
    pub(crate) name: &'static str,
    pub(crate) inputs: &'a [&'static str],
    pub(crate) outputs: &'a [&'static str],
    pub(crate) metadata: bool,
}

struct TypedBehavior<B: Behavior> {
    state: B,
    table: Arc<ActionTable<B>>,
}

impl<B: Behavior> DynBehavior for TypedBehavior<B> {
    fn action_count(&self) -> usize {
        self.table.actions.len()
    }

    fn action(&self, idx: usize) -> ActionShape<'_> {
        let action = &self.table.actions[idx];
        ActionShape {
            name: action.name,
            inputs: &action.inputs,
            outputs: &action.outputs,
            metadata: action.metadata,
        }
    }

    fn allowed(&self, idx: usize, ctx: &ActorContext<'_>) -> bool {
        self.table.actions[idx].allowed(&self.state, ctx)
    }

    fn invoke(
        &mut self,
        idx: usize,
        ctx: &mut ActorContext<'_>,
        input: ActionInput,
    ) -> Result<Vec<Value>, ActionError> {
        (self.table.actions[idx].body)(&mut self.state, ctx, input)
    }

    fn state(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(&self.state)
    }

    fn will_migrate(&mut self, ctx: &mut ActorContext<'_>) {
        self.state.will_migrate(ctx);
    }

    fn did_migrate(&mut self, ctx: &mut ActorContext<'_>) {
        self.state.did_migrate(ctx);
    }

    fn will_end(&mut self, ctx: &mut ActorContext<'_>) {
        self.state.will_end(ctx);
    }
}

/// Validated, shared action table of one actor type
pub(crate) struct ActionTable<B> {
    actions: Vec<Action<B>>,
}

impl<B> ActionTable<B> {
    pub(crate) fn new(actions: Vec<Action<B>>) -> Self {
        Self { actions }
    }
}

/// Creates and restores behaviours of one registered type
pub(crate) trait BehaviorFactory: Send + Sync {
    fn create(
        &self,
        args: &Map<String, Value>,
        ctx: &mut ActorContext<'_>,
    ) -> Result<Box<dyn DynBehavior>, ActionError>;

    fn restore(&self, state: Value) -> Result<Box<dyn DynBehavior>, serde_json::Error>;
}

pub(crate) struct TypedFactory<B> {
    table: Arc<ActionTable<B>>,
    _marker: PhantomData<fn() -> B>,
}

impl<B: Behavior> TypedFactory<B> {
    pub(crate) fn new(table: ActionTable<B>) -> Self {
        Self {
            table: Arc::new(table),
            _marker: PhantomData,
        }
    }
}

impl<B: Behavior> BehaviorFactory for TypedFactory<B> {
    fn create(
        &self,
        args: &Map<String, Value>,
        ctx: &mut ActorContext<'_>,
    ) -> Result<Box<dyn DynBehavior>, ActionError> {
        let state = B::init(args, ctx)?;
        Ok(Box::new(TypedBehavior {
            state,
            table: Arc::clone(&self.table),
        }))
    }

    fn restore(&self, state: Value) -> Result<Box<dyn DynBehavior>, serde_json::Error> {
        let state: B = serde_json::from_value(state)?;
        Ok(Box::new(TypedBehavior {
            state,
            table: Arc::clone(&self.table),
        }))
    }
}
