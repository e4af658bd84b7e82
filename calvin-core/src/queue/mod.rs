//! Port queues
//!
//! Every port owns one [`PortQueue`]. A queue holds one token stream per
//! writer and tracks read positions per reader, so the same structure
//! serves both topologies:
//!
//! - **fan-out**: an out-port queue has a single writer (the port itself)
//!   and one reader per connected peer; every reader sees every token.
//! - **fan-in**: an in-port queue has one writer per connected peer and a
//!   single reader (the owning actor); a [`QueueKind`] decides the order
//!   in which writer streams are drained.
//!
//! Reads are tentative: `peek` advances a reader's tentative position
//! without releasing capacity, `commit` makes the reads permanent and
//! frees slots, `cancel` rolls every tentative read back.

mod port_queue;
mod snapshot;
mod stream;

pub use port_queue::PortQueue;
pub use snapshot::{QueueSnapshot, WriterSnapshot};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default per-writer capacity
pub const DEFAULT_QUEUE_LENGTH: usize = 4;

/// Errors raised by queue operations
///
/// `Empty` and `Full` are expected conditions (no data yet, backpressure);
/// the firing engine resolves them without surfacing a fault.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// No unread token is available to this reader under the queue's policy
    #[error("queue empty for reader {reader}")]
    Empty { reader: String },

    /// The writer's stream has no free slot relative to the slowest reader
    #[error("queue full for writer {writer}")]
    Full { writer: String },

    /// The reader was never registered with this queue
    #[error("unknown reader {0}")]
    UnknownReader(String),

    /// The writer was never registered with this queue
    #[error("unknown writer {0}")]
    UnknownWriter(String),
}

/// Fan-in ordering policy of a queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "routing", rename_all = "kebab-case")]
pub enum QueueKind {
    /// Plain FIFO; with more than one writer it drains round robin
    #[default]
    Fanout,
    /// Round robin over writer streams
    CollectUnordered,
    /// Round robin, each token annotated with its writer's `port_tag`
    CollectTagged,
    /// Writers drained in a fixed, caller-supplied sequence of tags or writer ids
    CollectOrdered {
        #[serde(default)]
        order: Vec<String>,
    },
    /// One token from every writer at once, as a list tagged with all writer tags
    CollectAllTagged,
}

impl QueueKind {
    /// Routing name as used in port properties
    pub fn routing_name(&self) -> &'static str {
        match self {
            QueueKind::Fanout => "fanout",
            QueueKind::CollectUnordered => "collect-unordered",
            QueueKind::CollectTagged => "collect-tagged",
            QueueKind::CollectOrdered { .. } => "collect-ordered",
            QueueKind::CollectAllTagged => "collect-all-tagged",
        }
    }

    /// Does a peek attach `port_tag` metadata?
    pub fn is_tagged(&self) -> bool {
        matches!(self, QueueKind::CollectTagged | QueueKind::CollectAllTagged)
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.routing_name())
    }
}

impl FromStr for QueueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" | "fanout" | "fanout-fifo" => Ok(QueueKind::Fanout),
            "collect-unordered" | "collect-any" => Ok(QueueKind::CollectUnordered),
            "collect-tagged" | "collect-any-tagged" => Ok(QueueKind::CollectTagged),
            "collect-ordered" => Ok(QueueKind::CollectOrdered { order: Vec::new() }),
            "collect-all-tagged" => Ok(QueueKind::CollectAllTagged),
            other => Err(format!("unknown routing '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_names_roundtrip() {
        for kind in [
            QueueKind::Fanout,
            QueueKind::CollectUnordered,
            QueueKind::CollectTagged,
            QueueKind::CollectOrdered { order: vec![] },
            QueueKind::CollectAllTagged,
        ] {
            let parsed: QueueKind = kind.routing_name().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("broadcast".parse::<QueueKind>().is_err());
    }

    #[test]
    fn test_kind_yaml_form() {
        let kind: QueueKind =
            serde_yaml::from_str("routing: collect-ordered\norder: [a, b]\n").unwrap();
        assert_eq!(
            kind,
            QueueKind::CollectOrdered {
                order: vec!["a".into(), "b".into()]
            }
        );
    }
}
