//! Declarative action tables
//!
//! An actor type describes its behaviour as an ordered list of
//! [`Action`]s, built once when the type is registered. Order is
//! priority: the firing engine tries actions first to last and fires at
//! most one per call.
//!
//! ```
//! use calvin_core::action::{Action, ActionError, ActionInput};
//! use calvin_core::ActorContext;
//! use serde_json::Value;
//!
//! struct Doubler;
//!
//! fn double(_: &mut Doubler, _: &mut ActorContext<'_>, input: ActionInput) -> Result<Vec<Value>, ActionError> {
//!     let n = input.value("in")?.as_i64().unwrap_or(0);
//!     Ok(vec![Value::from(n * 2)])
//! }
//!
//! let action = Action::new("double", double).input("in").output("out");
//! assert_eq!(action.inputs, vec!["in"]);
//! ```

use crate::actor::ActorContext;
use crate::capability::CapabilityError;
use crate::token::Token;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Guard predicate: pure, evaluated before any queue is touched
pub type Guard<B> = fn(&B, &ActorContext<'_>) -> bool;

/// Action body: consumes one token per input, returns one value per output
pub type Body<B> = fn(&mut B, &mut ActorContext<'_>, ActionInput) -> Result<Vec<Value>, ActionError>;

/// One guarded transition of an actor type
pub struct Action<B> {
    pub name: &'static str,
    /// Input port names, one token consumed from each
    pub inputs: Vec<&'static str>,
    /// Output port names, one token produced on each
    pub outputs: Vec<&'static str>,
    pub guard: Option<Guard<B>>,
    pub body: Body<B>,
    /// Pass token metadata through to the body
    pub metadata: bool,
}

impl<B> Action<B> {
    pub fn new(name: &'static str, body: Body<B>) -> Self {
        Self {
            name,
            inputs: Vec::new(),
            outputs: Vec::new(),
            guard: None,
            body,
            metadata: false,
        }
    }

    pub fn input(mut self, port: &'static str) -> Self {
        self.inputs.push(port);
        self
    }

    pub fn output(mut self, port: &'static str) -> Self {
        self.outputs.push(port);
        self
    }

    pub fn guard(mut self, guard: Guard<B>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Deliver tokens to the body with their metadata intact
    pub fn with_metadata(mut self) -> Self {
        self.metadata = true;
        self
    }

    /// Evaluate the guard; actions without one are always allowed
    pub fn allowed(&self, state: &B, ctx: &ActorContext<'_>) -> bool {
        self.guard.map(|g| g(state, ctx)).unwrap_or(true)
    }
}

impl<B> fmt::Debug for Action<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("guarded", &self.guard.is_some())
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Tokens peeked for one firing, keyed by input port name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionInput {
    tokens: Vec<(String, Token)>,
}

impl ActionInput {
    pub fn new(tokens: Vec<(String, Token)>) -> Self {
        Self { tokens }
    }

    pub fn token(&self, port: &str) -> Result<&Token, ActionError> {
        self.tokens
            .iter()
            .find(|(name, _)| name == port)
            .map(|(_, token)| token)
            .ok_or_else(|| ActionError::MissingInput(port.to_string()))
    }

    pub fn value(&self, port: &str) -> Result<&Value, ActionError> {
        self.token(port).map(|t| &t.value)
    }

    /// Move a token out of the input set
    pub fn take(&mut self, port: &str) -> Result<Token, ActionError> {
        let idx = self
            .tokens
            .iter()
            .position(|(name, _)| name == port)
            .ok_or_else(|| ActionError::MissingInput(port.to_string()))?;
        Ok(self.tokens.remove(idx).1)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Failure raised by an action body or actor initializer
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("no input on port {0}")]
    MissingInput(String),

    #[error("invalid argument {name}: {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error("{0}")]
    Failed(String),
}

impl ActionError {
    pub fn failed(reason: impl Into<String>) -> Self {
        ActionError::Failed(reason.into())
    }

    pub fn invalid_argument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ActionError::InvalidArgument {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Result of one `fire()` call that did not fault
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FireOutcome {
    pub fired: bool,
    pub action: Option<String>,
}

impl FireOutcome {
    pub fn fired(action: &str) -> Self {
        Self {
            fired: true,
            action: Some(action.to_string()),
        }
    }

    pub fn idle() -> Self {
        Self::default()
    }
}

/// Failures of a firing; inputs are always rolled back before these surface
#[derive(Debug, Error)]
pub enum FireError {
    /// The body raised
    #[error("action {action} faulted: {error}")]
    Fault { action: String, error: ActionError },

    /// Wrong output arity, or a queue refused an operation its check allowed
    #[error("action {action} violated its contract: {reason}")]
    ContractViolation { action: String, reason: String },
}

impl FireError {
    pub fn action(&self) -> &str {
        match self {
            FireError::Fault { action, .. } | FireError::ContractViolation { action, .. } => action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_lookup() {
        let mut input = ActionInput::new(vec![
            ("a".into(), Token::new(1)),
            ("b".into(), Token::new(2)),
        ]);
        assert_eq!(input.value("b").unwrap(), &json!(2));
        assert!(matches!(input.value("c"), Err(ActionError::MissingInput(_))));

        let a = input.take("a").unwrap();
        assert_eq!(a.value, json!(1));
        assert_eq!(input.len(), 1);
        assert!(input.take("a").is_err());
    }

    #[test]
    fn test_fire_error_names_action() {
        let err = FireError::ContractViolation {
            action: "emit".into(),
            reason: "expected 1 output, got 0".into(),
        };
        assert_eq!(err.action(), "emit");
        assert!(err.to_string().contains("emit"));
    }
}
