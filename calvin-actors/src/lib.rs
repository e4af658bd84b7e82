//! # calvin-actors
//!
//! System actor library for the Calvin dataflow kernel, plus the capability
//! plugins those actors need.
//!
//! | type | ports | notes |
//! |---|---|---|
//! | `std.Constant` | out `token` | `data` forever |
//! | `std.Counter` | out `integer` | `start`, `start + 1`, ... |
//! | `std.Identity` | in `token`, out `token` | passthrough |
//! | `std.SampleHold` | in `sample`, `in`, out `out` | `default` until sampled |
//! | `std.Trigger` | out `data` | `data` every `tick` seconds, needs `sys.timer.repeating` |
//! | `flow.Alternate` | in `token`, out `token` | merges peers round by round in `order` |
//! | `flow.Terminator` | in `void` | discards |
//! | `io.Print` | in `token` | needs `io.stdout` |
//!
//! ## Usage
//!
//! ```
//! use calvin_core::RuntimeConfig;
//! use serde_json::Map;
//!
//! let mut runtime = calvin_actors::standard_runtime(RuntimeConfig::default()).unwrap();
//! let counter = runtime.new_actor("std.Counter", "counter", Map::new()).unwrap();
//! runtime.run_until_idle(Some(10));
//! assert_eq!(runtime.drain(&counter, "integer").unwrap().len(), 4);
//! ```

pub mod capabilities;
pub mod flow;
pub mod io;
pub mod stdlib;

pub use capabilities::{register_capabilities, LineSink, StdoutFactory, TimerFactory};

use calvin_core::runtime::ActorResult;
use calvin_core::{ActorStore, Runtime, RuntimeConfig};

/// Register every actor type of this crate
pub fn register_actors(store: &mut ActorStore) -> ActorResult<()> {
    store.register::<stdlib::Constant>()?;
    store.register::<stdlib::Counter>()?;
    store.register::<stdlib::Identity>()?;
    store.register::<stdlib::SampleHold>()?;
    store.register::<stdlib::Trigger>()?;
    store.register::<flow::Alternate>()?;
    store.register::<flow::Terminator>()?;
    store.register::<io::Print>()?;
    Ok(())
}

/// A runtime with every actor type and built-in capability registered
pub fn standard_runtime(config: RuntimeConfig) -> calvin_core::Result<Runtime> {
    let mut runtime = Runtime::new(config);
    register_actors(runtime.store_mut())?;
    register_capabilities(runtime.capabilities_mut())?;
    Ok(runtime)
}
