//! `std.*` actors: sources, passthrough and sample-and-hold

use crate::capabilities::TIMER_REPEATING;
use calvin_core::action::{Action, ActionError, ActionInput};
use calvin_core::{ActorContext, Behavior, CapabilityRef, PortDecl};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

// ============================================================================
// std.Constant
// ============================================================================

/// Emits `data` for as long as there is room downstream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constant {
    data: Value,
}

impl Behavior for Constant {
    const TYPE: &'static str = "std.Constant";

    fn ports() -> Vec<PortDecl> {
        vec![PortDecl::output("token")]
    }

    fn actions() -> Vec<Action<Self>> {
        vec![Action::new("emit", emit_constant).output("token")]
    }

    fn init(args: &Map<String, Value>, _ctx: &mut ActorContext<'_>) -> Result<Self, ActionError> {
        let data = args
            .get("data")
            .cloned()
            .ok_or_else(|| ActionError::invalid_argument("data", "missing"))?;
        Ok(Constant { data })
    }
}

fn emit_constant(
    state: &mut Constant,
    _ctx: &mut ActorContext<'_>,
    _input: ActionInput,
) -> Result<Vec<Value>, ActionError> {
    Ok(vec![state.data.clone()])
}

// ============================================================================
// std.Counter
// ============================================================================

/// Emits `start`, `start + 1`, ... (`start` defaults to 1)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    next: i64,
}

impl Behavior for Counter {
    const TYPE: &'static str = "std.Counter";

    fn ports() -> Vec<PortDecl> {
        vec![PortDecl::output("integer")]
    }

    fn actions() -> Vec<Action<Self>> {
        vec![Action::new("count", count).output("integer")]
    }

    fn init(args: &Map<String, Value>, _ctx: &mut ActorContext<'_>) -> Result<Self, ActionError> {
        let next = match args.get("start") {
            None => 1,
            Some(v) => v
                .as_i64()
                .ok_or_else(|| ActionError::invalid_argument("start", "expected an integer"))?,
        };
        Ok(Counter { next })
    }
}

fn count(
    state: &mut Counter,
    _ctx: &mut ActorContext<'_>,
    _input: ActionInput,
) -> Result<Vec<Value>, ActionError> {
    let n = state.next;
    state.next += 1;
    Ok(vec![json!(n)])
}

// ============================================================================
// std.Identity
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Identity;

impl Behavior for Identity {
    const TYPE: &'static str = "std.Identity";

    fn ports() -> Vec<PortDecl> {
        vec![PortDecl::input("token"), PortDecl::output("token")]
    }

    fn actions() -> Vec<Action<Self>> {
        vec![Action::new("pass", pass).input("token").output("token")]
    }

    fn init(_args: &Map<String, Value>, _ctx: &mut ActorContext<'_>) -> Result<Self, ActionError> {
        Ok(Identity)
    }
}

fn pass(
    _state: &mut Identity,
    _ctx: &mut ActorContext<'_>,
    mut input: ActionInput,
) -> Result<Vec<Value>, ActionError> {
    Ok(vec![input.take("token")?.into_value()])
}

// ============================================================================
// std.SampleHold
// ============================================================================

/// Holds the last `in` value seen together with a `true` on `sample`
///
/// Every firing consumes one token from each input and emits the held
/// value, or `default` until something was sampled. Only the boolean
/// `true` samples; `1`, `"true"` and everything else count as false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleHold {
    held: Value,
}

impl Behavior for SampleHold {
    const TYPE: &'static str = "std.SampleHold";

    fn ports() -> Vec<PortDecl> {
        vec![
            PortDecl::input("sample"),
            PortDecl::input("in"),
            PortDecl::output("out"),
        ]
    }

    fn actions() -> Vec<Action<Self>> {
        vec![Action::new("sample", sample)
            .input("sample")
            .input("in")
            .output("out")]
    }

    fn init(args: &Map<String, Value>, _ctx: &mut ActorContext<'_>) -> Result<Self, ActionError> {
        let held = args.get("default").cloned().unwrap_or(Value::Null);
        Ok(SampleHold { held })
    }
}

fn sample(
    state: &mut SampleHold,
    _ctx: &mut ActorContext<'_>,
    mut input: ActionInput,
) -> Result<Vec<Value>, ActionError> {
    let flag = input.take("sample")?.into_value();
    let value = input.take("in")?.into_value();
    if flag == Value::Bool(true) {
        state.held = value;
    }
    Ok(vec![state.held.clone()])
}

// ============================================================================
// std.Trigger
// ============================================================================

/// Emits `data` once per tick of a repeating timer
///
/// `tick` is the period in seconds. The timer object is opened at init and
/// its reference is part of the managed state, so it follows the actor
/// through migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    tick: f64,
    data: Value,
    timer: CapabilityRef,
}

impl Behavior for Trigger {
    const TYPE: &'static str = "std.Trigger";

    fn ports() -> Vec<PortDecl> {
        vec![PortDecl::output("data")]
    }

    fn actions() -> Vec<Action<Self>> {
        vec![Action::new("trigger", trigger)
            .guard(tick_pending)
            .output("data")]
    }

    fn requires() -> Vec<&'static str> {
        vec![TIMER_REPEATING]
    }

    fn init(args: &Map<String, Value>, ctx: &mut ActorContext<'_>) -> Result<Self, ActionError> {
        let tick = args
            .get("tick")
            .and_then(Value::as_f64)
            .filter(|t| *t > 0.0)
            .ok_or_else(|| ActionError::invalid_argument("tick", "expected a positive number"))?;
        let data = args.get("data").cloned().unwrap_or(Value::Null);

        let mut timer_args = Map::new();
        timer_args.insert("period".into(), json!(tick));
        let timer = ctx.open(TIMER_REPEATING, timer_args)?;
        Ok(Trigger { tick, data, timer })
    }

    fn will_end(&mut self, ctx: &mut ActorContext<'_>) {
        if let Err(error) = ctx.close(&self.timer) {
            tracing::debug!(actor = %ctx.actor_id(), %error, "timer already closed");
        }
    }
}

fn tick_pending(state: &Trigger, ctx: &ActorContext<'_>) -> bool {
    ctx.can_read(&state.timer)
}

fn trigger(
    state: &mut Trigger,
    ctx: &mut ActorContext<'_>,
    _input: ActionInput,
) -> Result<Vec<Value>, ActionError> {
    ctx.read(&state.timer)?;
    Ok(vec![state.data.clone()])
}
