//! Core identity types for the Calvin kernel
//!
//! Actors and ports are addressed by opaque string ids. Fresh ids are
//! UUID v4 strings, which keeps them unique across runtime instances so
//! an actor keeps its identity when it migrates.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Actor identifier
///
/// Stable for the actor's whole life, including across migrations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl ActorId {
    /// Create an actor ID from an existing string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, globally unique actor ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Port identifier
///
/// Port ids double as writer ids (out-ports writing into a peer queue)
/// and reader ids (in-ports draining an out-port queue).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortId(pub String);

impl PortId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, globally unique port ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a port relative to its owning actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
        }
    }
}

/// Reference to an open capability object
///
/// References have the form `<actor-id>#<index>`; indices increase per
/// actor and are never reused while the actor lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CapabilityRef(pub String);

impl CapabilityRef {
    /// Build the reference for the `index`-th object opened by `actor`
    pub fn new(actor: &ActorId, index: u64) -> Self {
        Self(format!("{}#{}", actor, index))
    }

    /// The index part of the reference, if well formed
    pub fn index(&self) -> Option<u64> {
        self.0.rsplit_once('#').and_then(|(_, idx)| idx.parse().ok())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CapabilityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(ActorId::generate(), ActorId::generate());
        assert_ne!(PortId::generate(), PortId::generate());
    }

    #[test]
    fn test_capability_ref_index() {
        let actor = ActorId::new("a1");
        let r = CapabilityRef::new(&actor, 3);
        assert_eq!(r.as_str(), "a1#3");
        assert_eq!(r.index(), Some(3));
        assert_eq!(CapabilityRef("garbage".into()).index(), None);
    }

    #[test]
    fn test_direction_serde() {
        let json = serde_json::to_string(&Direction::In).unwrap();
        assert_eq!(json, "\"in\"");
    }
}
