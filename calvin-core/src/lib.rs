//! Calvin core - dataflow actor kernel
//!
//! This crate provides the single-runtime kernel of Calvin: actors with
//! typed ports, bounded port queues with fan-in policies, guarded actions,
//! a cooperative scheduler, a capability registry and actor migration.
//! Deployment, placement and transport live elsewhere and talk to the
//! kernel through [`Runtime`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Runtime                            │
//! │  (store of actor types, actors, scheduler, capabilities)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌──────────────┐   tokens    ┌──────────────┐              │
//! │  │   Actor A    │ ──────────▶ │   Actor B    │  ...         │
//! │  │ ┌──────────┐ │  transfer   │ ┌──────────┐ │              │
//! │  │ │ out-port │ │             │ │ in-port  │ │              │
//! │  │ │ (queue)  │ │             │ │ (queue)  │ │              │
//! │  │ └──────────┘ │             │ └──────────┘ │              │
//! │  │  actions     │             │  actions     │              │
//! │  └──────┬───────┘             └──────┬───────┘              │
//! │         │        Capabilities        │                      │
//! │         ▼                            ▼                      │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │  CapabilityRegistry (io.stdout, sys.timer, ...)     │    │
//! │  │  wakeups ──▶ Scheduler work set                     │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Core Concepts
//!
//! ## Port queues
//!
//! Every port owns a bounded [`PortQueue`]. Reads are two-phase: `peek`
//! reads tentatively, `commit` makes the reads permanent and `cancel`
//! rolls them back. Each reader of a queue has its own position, and the
//! slowest reader bounds how much a writer may put in. In-ports with
//! several upstream peers merge them according to a [`QueueKind`].
//!
//! ## Actions
//!
//! An actor type implements [`Behavior`]: its struct is the managed state,
//! and its action table lists guarded actions in priority order. One call
//! to [`Actor::fire`] fires at most one action, and only when its inputs
//! have tokens and its outputs have room.
//!
//! ## Capabilities
//!
//! Actors reach the outside world through named capabilities opened from
//! the runtime's [`CapabilityRegistry`]. A capability posts wakeups
//! through a [`WakeupHandle`] when it has something to read.
//!
//! # Example
//!
//! ```rust
//! use calvin_core::action::{Action, ActionError, ActionInput};
//! use calvin_core::{ActorContext, Behavior, PortDecl, Runtime, Token};
//! use serde::{Deserialize, Serialize};
//! use serde_json::{json, Map, Value};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Double;
//!
//! impl Behavior for Double {
//!     const TYPE: &'static str = "demo.Double";
//!
//!     fn ports() -> Vec<PortDecl> {
//!         vec![PortDecl::input("in"), PortDecl::output("out")]
//!     }
//!
//!     fn actions() -> Vec<Action<Self>> {
//!         vec![Action::new("double", double).input("in").output("out")]
//!     }
//!
//!     fn init(_: &Map<String, Value>, _: &mut ActorContext<'_>) -> Result<Self, ActionError> {
//!         Ok(Double)
//!     }
//! }
//!
//! fn double(_: &mut Double, _: &mut ActorContext<'_>, input: ActionInput) -> Result<Vec<Value>, ActionError> {
//!     let n = input.value("in")?.as_i64().unwrap_or(0);
//!     Ok(vec![json!(n * 2)])
//! }
//!
//! let mut runtime = Runtime::with_defaults();
//! runtime.register::<Double>().unwrap();
//! let id = runtime.new_actor("demo.Double", "double", Map::new()).unwrap();
//!
//! runtime.inject(&id, "in", Token::new(21)).unwrap();
//! runtime.run_until_idle(None);
//!
//! let out: Vec<Value> = runtime
//!     .drain(&id, "out")
//!     .unwrap()
//!     .into_iter()
//!     .map(Token::into_value)
//!     .collect();
//! assert_eq!(out, vec![json!(42)]);
//! ```

// Modules
pub mod action;
pub mod actor;
pub mod capability;
pub mod port;
pub mod queue;
pub mod runtime;
pub mod scheduler;
pub mod store;
pub mod token;
pub mod types;

// Re-exports for convenience
pub use action::{Action, ActionError, ActionInput, FireError, FireOutcome};
pub use actor::{Actor, ActorContext, ActorState, Behavior, PortDecl};
pub use capability::{Capability, CapabilityError, CapabilityFactory, CapabilityRegistry, WakeupHandle};
pub use queue::{PortQueue, QueueError, QueueKind};
pub use runtime::{Result, Runtime, RuntimeConfig, RuntimeError};
pub use scheduler::RunStats;
pub use store::ActorStore;
pub use token::{Token, PORT_TAG};
pub use types::{ActorId, CapabilityRef, Direction, PortId};
