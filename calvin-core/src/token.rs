//! Tokens: the unit of data flowing over port connections

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata key carrying the sender tag on tokens read from tagged fan-in queues
pub const PORT_TAG: &str = "port_tag";

/// A value plus a string-keyed metadata envelope
///
/// Tokens are immutable once written to a queue; readers receive clones.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Token {
    /// Payload carried by the token
    pub value: Value,
    /// Free-form metadata (e.g. `port_tag`)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Token {
    /// Create a token without metadata
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            metadata: Map::new(),
        }
    }

    /// Return a copy of this token with one metadata entry set
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The sender tag attached by a tagged collection, if any
    pub fn port_tag(&self) -> Option<&Value> {
        self.metadata.get(PORT_TAG)
    }

    /// Drop all metadata, keeping only the value
    pub fn strip_metadata(mut self) -> Self {
        self.metadata.clear();
        self
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

impl From<Value> for Token {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_is_skipped_when_empty() {
        let tok = Token::new(json!(1));
        assert_eq!(serde_json::to_value(&tok).unwrap(), json!({"value": 1}));

        let tagged = tok.with_meta(PORT_TAG, "a");
        assert_eq!(tagged.port_tag(), Some(&json!("a")));
        assert!(tagged.strip_metadata().port_tag().is_none());
    }
}
