//! Ports and endpoints
//!
//! A [`Port`] is a named, directed endpoint owned by an actor. It owns
//! its [`PortQueue`] and refers to its peers only by id, through
//! [`Endpoint`]s, so there are no ownership cycles between actors.
//!
//! Queue roles depend on direction:
//!
//! | port | writers | readers |
//! |------|---------|---------|
//! | out  | the port itself | every connected peer in-port |
//! | in   | every connected peer out-port | the owning actor |

use crate::queue::{PortQueue, QueueKind};
use crate::types::{ActorId, Direction, PortId};
use serde::{Deserialize, Serialize};

/// Non-owning reference to a peer port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub peer_actor: ActorId,
    pub peer_port: PortId,
}

/// Connection-time settings of a port
///
/// `routing` uses the names accepted by [`QueueKind`]'s `FromStr`;
/// `order` is only read for `collect-ordered`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_length: Option<usize>,

    /// Writer tag this out-port registers in peer in-ports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl PortProperties {
    /// Resolve the queue policy, falling back to `default` when no routing is set
    pub fn queue_kind(&self, default: &QueueKind) -> Result<QueueKind, String> {
        let mut kind = match &self.routing {
            Some(routing) => routing.parse::<QueueKind>()?,
            None => default.clone(),
        };
        if let QueueKind::CollectOrdered { order } = &mut kind {
            if !self.order.is_empty() {
                *order = self.order.clone();
            }
        }
        Ok(kind)
    }

    /// Overlay `other` on top of these properties
    pub fn merged(&self, other: &PortProperties) -> PortProperties {
        PortProperties {
            routing: other.routing.clone().or_else(|| self.routing.clone()),
            order: if other.order.is_empty() {
                self.order.clone()
            } else {
                other.order.clone()
            },
            queue_length: other.queue_length.or(self.queue_length),
            tag: other.tag.clone().or_else(|| self.tag.clone()),
        }
    }
}

/// Port owned by an actor
#[derive(Debug, Clone)]
pub struct Port {
    pub id: PortId,
    pub name: String,
    pub direction: Direction,
    pub owner: ActorId,
    pub queue: PortQueue,
    pub endpoints: Vec<Endpoint>,
    pub properties: PortProperties,
}

impl Port {
    /// Create a port and register its fixed queue role
    pub fn new(
        owner: &ActorId,
        name: impl Into<String>,
        direction: Direction,
        kind: QueueKind,
        queue_length: usize,
        properties: PortProperties,
    ) -> Self {
        let id = PortId::generate();
        let mut queue = PortQueue::new(kind, queue_length);
        match direction {
            Direction::Out => queue.add_writer(id.as_str(), None),
            Direction::In => queue.add_reader(owner.as_str()),
        }
        Self {
            id,
            name: name.into(),
            direction,
            owner: owner.clone(),
            queue,
            endpoints: Vec::new(),
            properties,
        }
    }

    /// Tag this port registers as a writer in peer in-ports
    pub fn writer_tag(&self) -> String {
        self.properties
            .tag
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }

    /// The queue id this port uses on its own queue: reader for in-ports, writer for out-ports
    pub fn queue_role(&self) -> &str {
        match self.direction {
            Direction::In => self.owner.as_str(),
            Direction::Out => self.id.as_str(),
        }
    }

    pub fn is_connected_to(&self, peer_port: &PortId) -> bool {
        self.endpoints.iter().any(|e| &e.peer_port == peer_port)
    }

    /// Record a peer and register it in the queue
    pub fn attach(&mut self, endpoint: Endpoint, peer_tag: Option<String>) {
        if self.is_connected_to(&endpoint.peer_port) {
            return;
        }
        match self.direction {
            Direction::Out => self.queue.add_reader(endpoint.peer_port.as_str()),
            Direction::In => self
                .queue
                .add_writer(endpoint.peer_port.as_str(), peer_tag),
        }
        self.endpoints.push(endpoint);
    }

    /// Forget a peer; its queue registration goes with it
    pub fn detach(&mut self, peer_port: &PortId) -> bool {
        let before = self.endpoints.len();
        self.endpoints.retain(|e| &e.peer_port != peer_port);
        if self.endpoints.len() == before {
            return false;
        }
        match self.direction {
            Direction::Out => self.queue.remove_reader(peer_port.as_str()),
            Direction::In => self.queue.remove_writer(peer_port.as_str()),
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Token;

    #[test]
    fn test_queue_roles() {
        let owner = ActorId::new("a");
        let mut out = Port::new(
            &owner,
            "out",
            Direction::Out,
            QueueKind::Fanout,
            4,
            PortProperties::default(),
        );
        assert_eq!(out.queue.writers(), &[out.id.to_string()]);
        assert!(out.queue.readers().is_empty());

        let peer = Endpoint {
            peer_actor: ActorId::new("b"),
            peer_port: PortId::new("b-in"),
        };
        out.attach(peer.clone(), None);
        out.attach(peer, None);
        assert_eq!(out.queue.readers(), &["b-in".to_string()]);
        assert_eq!(out.endpoints.len(), 1);

        let mut inp = Port::new(
            &owner,
            "in",
            Direction::In,
            QueueKind::CollectTagged,
            4,
            PortProperties::default(),
        );
        inp.attach(
            Endpoint {
                peer_actor: ActorId::new("b"),
                peer_port: PortId::new("b-out"),
            },
            Some("left".into()),
        );
        assert_eq!(inp.queue.readers(), &["a".to_string()]);
        assert_eq!(inp.queue.tag("b-out"), Some("left"));

        inp.queue.write(Token::new(1), "b-out").unwrap();
        assert!(inp.detach(&PortId::new("b-out")));
        assert!(!inp.queue.tokens_available(1, "a"));
        assert!(!inp.detach(&PortId::new("b-out")));
    }

    #[test]
    fn test_properties_resolve_kind() {
        let props = PortProperties {
            routing: Some("collect-ordered".into()),
            order: vec!["x".into(), "y".into()],
            ..Default::default()
        };
        assert_eq!(
            props.queue_kind(&QueueKind::Fanout).unwrap(),
            QueueKind::CollectOrdered {
                order: vec!["x".into(), "y".into()]
            }
        );
        assert_eq!(
            PortProperties::default()
                .queue_kind(&QueueKind::CollectAllTagged)
                .unwrap(),
            QueueKind::CollectAllTagged
        );
        let bad = PortProperties {
            routing: Some("broadcast".into()),
            ..Default::default()
        };
        assert!(bad.queue_kind(&QueueKind::Fanout).is_err());
    }

    #[test]
    fn test_merged_prefers_override() {
        let declared = PortProperties {
            routing: Some("collect-tagged".into()),
            queue_length: Some(2),
            ..Default::default()
        };
        let deployed = PortProperties {
            queue_length: Some(8),
            tag: Some("t".into()),
            ..Default::default()
        };
        let merged = declared.merged(&deployed);
        assert_eq!(merged.routing.as_deref(), Some("collect-tagged"));
        assert_eq!(merged.queue_length, Some(8));
        assert_eq!(merged.tag.as_deref(), Some("t"));
    }
}
