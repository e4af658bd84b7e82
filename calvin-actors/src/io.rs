//! `io.*` actors

use crate::capabilities::STDOUT;
use calvin_core::action::{Action, ActionError, ActionInput};
use calvin_core::{ActorContext, Behavior, CapabilityRef, PortDecl};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Writes each token to `io.stdout`
///
/// Strings are written as-is, anything else as JSON. An optional `prefix`
/// argument is passed on to the capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Print {
    stdout: CapabilityRef,
}

impl Behavior for Print {
    const TYPE: &'static str = "io.Print";

    fn ports() -> Vec<PortDecl> {
        vec![PortDecl::input("token")]
    }

    fn actions() -> Vec<Action<Self>> {
        vec![Action::new("write", write)
            .guard(writable)
            .input("token")]
    }

    fn requires() -> Vec<&'static str> {
        vec![STDOUT]
    }

    fn init(args: &Map<String, Value>, ctx: &mut ActorContext<'_>) -> Result<Self, ActionError> {
        let mut open_args = Map::new();
        if let Some(prefix) = args.get("prefix") {
            open_args.insert("prefix".into(), prefix.clone());
        }
        let stdout = ctx.open(STDOUT, open_args)?;
        Ok(Print { stdout })
    }
}

fn writable(state: &Print, ctx: &ActorContext<'_>) -> bool {
    ctx.can_write(&state.stdout)
}

fn write(
    state: &mut Print,
    ctx: &mut ActorContext<'_>,
    mut input: ActionInput,
) -> Result<Vec<Value>, ActionError> {
    let value = input.take("token")?.into_value();
    ctx.write(&state.stdout, value)?;
    Ok(Vec::new())
}
