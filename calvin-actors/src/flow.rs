//! `flow.*` actors

use calvin_core::action::{Action, ActionError, ActionInput};
use calvin_core::{ActorContext, Behavior, PortDecl, Token};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};

/// Merges every connected peer, one round at a time, in a fixed order
///
/// The in-port collects one token from every peer at once. Each round is
/// unpacked in the order given by `order` (a list of peer port tags) and
/// queued for dispatch, one token per firing. Dispatch takes priority,
/// but rounds keep being collected while the output is blocked. Without an `order` the
/// round is dispatched in peer registration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alternate {
    order: Vec<String>,
    incoming: VecDeque<Value>,
}

impl Behavior for Alternate {
    const TYPE: &'static str = "flow.Alternate";

    fn ports() -> Vec<PortDecl> {
        vec![
            PortDecl::input("token").routing("collect-all-tagged"),
            PortDecl::output("token"),
        ]
    }

    fn actions() -> Vec<Action<Self>> {
        vec![
            Action::new("dispatch", dispatch)
                .guard(has_backlog)
                .output("token"),
            Action::new("collect", collect).input("token").with_metadata(),
        ]
    }

    fn init(args: &Map<String, Value>, _ctx: &mut ActorContext<'_>) -> Result<Self, ActionError> {
        let order = match args.get("order") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().map(String::from))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| ActionError::invalid_argument("order", "expected a list of port tags"))?,
            Some(_) => {
                return Err(ActionError::invalid_argument(
                    "order",
                    "expected a list of port tags",
                ))
            }
        };
        Ok(Alternate {
            order,
            incoming: VecDeque::new(),
        })
    }
}

fn has_backlog(state: &Alternate, _ctx: &ActorContext<'_>) -> bool {
    !state.incoming.is_empty()
}

fn dispatch(
    state: &mut Alternate,
    _ctx: &mut ActorContext<'_>,
    _input: ActionInput,
) -> Result<Vec<Value>, ActionError> {
    let next = state
        .incoming
        .pop_front()
        .ok_or_else(|| ActionError::failed("dispatch without backlog"))?;
    Ok(vec![next])
}

fn collect(
    state: &mut Alternate,
    _ctx: &mut ActorContext<'_>,
    mut input: ActionInput,
) -> Result<Vec<Value>, ActionError> {
    let round = input.take("token")?;
    let values = unpack_round(&round, &state.order)?;
    state.incoming.extend(values);
    Ok(Vec::new())
}

/// Values of one collected round, in `order`
fn unpack_round(round: &Token, order: &[String]) -> Result<Vec<Value>, ActionError> {
    let malformed = || ActionError::invalid_argument("token", "expected a tagged round");
    let values = round.value.as_array().ok_or_else(malformed)?;
    if order.is_empty() {
        return Ok(values.clone());
    }
    let tags = round
        .port_tag()
        .and_then(Value::as_array)
        .ok_or_else(malformed)?;
    let by_tag: HashMap<&str, &Value> = tags
        .iter()
        .filter_map(Value::as_str)
        .zip(values)
        .collect();
    order
        .iter()
        .map(|tag| {
            by_tag.get(tag.as_str()).map(|v| (*v).clone()).ok_or_else(|| {
                ActionError::invalid_argument("order", format!("no peer tagged {}", tag))
            })
        })
        .collect()
}

/// Consumes and discards everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Terminator;

impl Behavior for Terminator {
    const TYPE: &'static str = "flow.Terminator";

    fn ports() -> Vec<PortDecl> {
        vec![PortDecl::input("void")]
    }

    fn actions() -> Vec<Action<Self>> {
        vec![Action::new("discard", discard).input("void")]
    }

    fn init(_args: &Map<String, Value>, _ctx: &mut ActorContext<'_>) -> Result<Self, ActionError> {
        Ok(Terminator)
    }
}

fn discard(
    _state: &mut Terminator,
    _ctx: &mut ActorContext<'_>,
    _input: ActionInput,
) -> Result<Vec<Value>, ActionError> {
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use calvin_core::PORT_TAG;
    use serde_json::json;

    fn round(values: Value, tags: Value) -> Token {
        Token::new(values).with_meta(PORT_TAG, tags)
    }

    #[test]
    fn test_unpack_follows_order() {
        let token = round(json!(["a1", "b1"]), json!(["a.out", "b.out"]));
        let order = vec!["b.out".to_string(), "a.out".to_string()];
        assert_eq!(
            unpack_round(&token, &order).unwrap(),
            vec![json!("b1"), json!("a1")]
        );
    }

    #[test]
    fn test_unpack_without_order_keeps_registration_order() {
        let token = round(json!([1, 2]), json!(["x", "y"]));
        assert_eq!(unpack_round(&token, &[]).unwrap(), vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_unknown_tag_is_an_error() {
        let token = round(json!([1]), json!(["x"]));
        let order = vec!["z".to_string()];
        assert!(matches!(
            unpack_round(&token, &order),
            Err(ActionError::InvalidArgument { .. })
        ));
    }
}
