//! Built-in capability plugins
//!
//! - `io.stdout`: line sink, the process stdout unless a buffer is supplied
//! - `sys.timer.repeating`: periodic ticks driven by a tokio task

mod stdout;
mod timer;

pub use stdout::{LineSink, StdoutFactory, STDOUT};
pub use timer::{TimerFactory, TIMER_REPEATING};

use calvin_core::{CapabilityError, CapabilityRegistry};

/// Register every built-in capability with default settings
pub fn register_capabilities(registry: &mut CapabilityRegistry) -> Result<(), CapabilityError> {
    registry.register_factory(StdoutFactory::new(LineSink::Stdout))?;
    registry.register_factory(TimerFactory)?;
    Ok(())
}
