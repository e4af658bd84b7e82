//! Serializable queue state for migration
//!
//! Only the committed region is captured: tentative reads must be
//! canceled before a snapshot is taken, so every reader resumes at its
//! committed position after restore.

use super::port_queue::{Cursor, PortQueue};
use super::stream::WriterStream;
use super::QueueKind;
use crate::token::Token;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Full state of a [`PortQueue`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub kind: QueueKind,
    pub capacity: usize,
    pub readers: Vec<String>,
    pub writers: Vec<WriterSnapshot>,
    /// Drain cursor per reader
    #[serde(default)]
    pub cursors: BTreeMap<String, usize>,
}

/// One writer stream inside a [`QueueSnapshot`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriterSnapshot {
    pub id: String,
    pub tag: String,
    /// Sequence number of `tokens[0]`
    pub base_pos: u64,
    pub tokens: Vec<Token>,
    /// Committed read position per reader
    pub read_pos: BTreeMap<String, u64>,
}

impl PortQueue {
    /// Capture the committed state of the queue
    pub fn snapshot(&self) -> QueueSnapshot {
        let writers = self
            .writers
            .iter()
            .filter_map(|id| {
                let stream = self.streams.get(id)?;
                Some(WriterSnapshot {
                    id: id.clone(),
                    tag: self.tag(id).unwrap_or(id).to_string(),
                    base_pos: stream.base_pos,
                    tokens: stream.fifo.iter().cloned().collect(),
                    read_pos: stream
                        .committed
                        .iter()
                        .map(|(r, p)| (r.clone(), *p))
                        .collect(),
                })
            })
            .collect();

        let cursors = self
            .cursors
            .iter()
            .map(|(r, c)| (r.clone(), c.peek_turn_pos.unwrap_or(c.turn_pos)))
            .collect();

        QueueSnapshot {
            kind: self.kind.clone(),
            capacity: self.capacity,
            readers: self.readers.clone(),
            writers,
            cursors,
        }
    }

    /// Rebuild a queue from a snapshot; tentative positions start at the committed ones
    pub fn from_snapshot(snapshot: QueueSnapshot) -> Self {
        let mut queue = PortQueue::new(snapshot.kind, snapshot.capacity);
        for reader in &snapshot.readers {
            queue.readers.push(reader.clone());
            queue.cursors.insert(
                reader.clone(),
                Cursor {
                    turn_pos: snapshot.cursors.get(reader).copied().unwrap_or(0),
                    peek_turn_pos: None,
                },
            );
        }

        for w in snapshot.writers {
            let write_pos = w.base_pos + w.tokens.len() as u64;
            let mut committed: HashMap<String, u64> = HashMap::new();
            for reader in &snapshot.readers {
                let pos = w
                    .read_pos
                    .get(reader)
                    .copied()
                    .unwrap_or(w.base_pos)
                    .clamp(w.base_pos, write_pos);
                committed.insert(reader.clone(), pos);
            }
            let stream = WriterStream {
                fifo: w.tokens.into_iter().collect(),
                base_pos: w.base_pos,
                write_pos,
                tentative: committed.clone(),
                committed,
            };
            queue.tags.insert(w.id.clone(), w.tag);
            queue.streams.insert(w.id.clone(), stream);
            queue.writers.push(w.id);
        }
        queue
    }
}
