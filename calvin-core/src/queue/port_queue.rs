//! The port queue: writer streams, reader positions and fan-in policies

use super::stream::WriterStream;
use super::{QueueError, QueueKind};
use crate::token::{Token, PORT_TAG};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Round-robin / drain-order cursor of one reader
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct Cursor {
    pub(super) turn_pos: usize,
    /// Cursor value before the first uncommitted peek, restored by `cancel`
    pub(super) peek_turn_pos: Option<usize>,
}

/// Buffer behind a port
///
/// Capacity is `capacity` tokens per writer stream, counted from the
/// slowest reader's committed position. All operations are synchronous
/// and never block.
///
/// # Example
///
/// ```
/// use calvin_core::queue::{PortQueue, QueueKind};
/// use calvin_core::Token;
///
/// let mut q = PortQueue::new(QueueKind::Fanout, 4);
/// q.add_writer("src", None);
/// q.add_reader("dst");
///
/// q.write(Token::new(1), "src").unwrap();
/// assert!(q.tokens_available(1, "dst"));
///
/// let tok = q.peek("dst").unwrap();
/// assert_eq!(tok.value, 1);
/// q.cancel("dst").unwrap();
/// assert!(q.tokens_available(1, "dst"));
/// ```
#[derive(Debug, Clone)]
pub struct PortQueue {
    pub(super) kind: QueueKind,
    pub(super) capacity: usize,
    /// Writer ids in registration order
    pub(super) writers: Vec<String>,
    pub(super) tags: HashMap<String, String>,
    pub(super) streams: HashMap<String, WriterStream>,
    /// Reader ids in registration order
    pub(super) readers: Vec<String>,
    pub(super) cursors: HashMap<String, Cursor>,
}

impl PortQueue {
    /// Create an empty queue with the given policy and per-writer capacity
    pub fn new(kind: QueueKind, capacity: usize) -> Self {
        Self {
            kind,
            capacity: capacity.max(1),
            writers: Vec::new(),
            tags: HashMap::new(),
            streams: HashMap::new(),
            readers: Vec::new(),
            cursors: HashMap::new(),
        }
    }

    pub fn kind(&self) -> &QueueKind {
        &self.kind
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register a writer stream; `tag` defaults to the writer id
    ///
    /// Re-registering an existing writer only updates its tag.
    pub fn add_writer(&mut self, writer: impl Into<String>, tag: Option<String>) {
        let writer = writer.into();
        let tag = tag.unwrap_or_else(|| writer.clone());
        if !self.streams.contains_key(&writer) {
            self.streams
                .insert(writer.clone(), WriterStream::new(self.readers.iter()));
            self.writers.push(writer.clone());
        }
        self.tags.insert(writer, tag);
    }

    /// Unregister a writer, dropping its unread tokens
    pub fn remove_writer(&mut self, writer: &str) -> bool {
        if self.streams.remove(writer).is_none() {
            return false;
        }
        self.tags.remove(writer);
        self.writers.retain(|w| w != writer);
        // ordered cursors index the drain order, which does not change
        if !matches!(self.kind, QueueKind::CollectOrdered { .. }) {
            let n = self.writers.len().max(1);
            for cursor in self.cursors.values_mut() {
                cursor.turn_pos %= n;
                cursor.peek_turn_pos = cursor.peek_turn_pos.map(|p| p % n);
            }
        }
        true
    }

    /// Register a logical consumer; it starts at the oldest retained token
    pub fn add_reader(&mut self, reader: impl Into<String>) {
        let reader = reader.into();
        if self.has_reader(&reader) {
            return;
        }
        for stream in self.streams.values_mut() {
            stream.add_reader(&reader);
        }
        self.cursors.insert(reader.clone(), Cursor::default());
        self.readers.push(reader);
    }

    /// Unregister a consumer, releasing any capacity it was holding
    pub fn remove_reader(&mut self, reader: &str) -> bool {
        if !self.has_reader(reader) {
            return false;
        }
        for stream in self.streams.values_mut() {
            stream.remove_reader(reader);
        }
        self.cursors.remove(reader);
        self.readers.retain(|r| r != reader);
        true
    }

    pub fn has_reader(&self, reader: &str) -> bool {
        self.readers.iter().any(|r| r == reader)
    }

    pub fn has_writer(&self, writer: &str) -> bool {
        self.streams.contains_key(writer)
    }

    pub fn readers(&self) -> &[String] {
        &self.readers
    }

    pub fn writers(&self) -> &[String] {
        &self.writers
    }

    /// Tag registered for a writer
    pub fn tag(&self, writer: &str) -> Option<&str> {
        self.tags.get(writer).map(String::as_str)
    }

    /// Append a token to `writer`'s stream
    pub fn write(&mut self, token: Token, writer: &str) -> Result<(), QueueError> {
        let capacity = self.capacity as u64;
        let stream = self
            .streams
            .get_mut(writer)
            .ok_or_else(|| QueueError::UnknownWriter(writer.to_string()))?;
        if stream.used() >= capacity {
            return Err(QueueError::Full {
                writer: writer.to_string(),
            });
        }
        stream.push(token);
        Ok(())
    }

    /// True iff `n` consecutive writes by `writer` would succeed
    pub fn slots_available(&self, n: usize, writer: &str) -> bool {
        self.streams
            .get(writer)
            .map(|s| (self.capacity as u64).saturating_sub(s.used()) >= n as u64)
            .unwrap_or(false)
    }

    /// Writes `writer` could make right now
    pub fn free_slots(&self, writer: &str) -> usize {
        self.streams
            .get(writer)
            .map(|s| (self.capacity as u64).saturating_sub(s.used()) as usize)
            .unwrap_or(0)
    }

    /// Tentatively read the next token for `reader`
    pub fn peek(&mut self, reader: &str) -> Result<Token, QueueError> {
        if !self.has_reader(reader) {
            return Err(QueueError::UnknownReader(reader.to_string()));
        }
        let token = match self.kind.clone() {
            QueueKind::Fanout | QueueKind::CollectUnordered => self.peek_round_robin(reader, false),
            QueueKind::CollectTagged => self.peek_round_robin(reader, true),
            QueueKind::CollectOrdered { order } => self.peek_ordered(reader, &order),
            QueueKind::CollectAllTagged => self.peek_all(reader),
        };
        token.ok_or_else(|| QueueError::Empty {
            reader: reader.to_string(),
        })
    }

    /// Make all tentative reads by `reader` permanent, releasing their slots
    pub fn commit(&mut self, reader: &str) -> Result<(), QueueError> {
        let cursor = self
            .cursors
            .get_mut(reader)
            .ok_or_else(|| QueueError::UnknownReader(reader.to_string()))?;
        cursor.peek_turn_pos = None;
        for stream in self.streams.values_mut() {
            stream.commit(reader);
        }
        Ok(())
    }

    /// Roll back every tentative read by `reader`
    pub fn cancel(&mut self, reader: &str) -> Result<(), QueueError> {
        let cursor = self
            .cursors
            .get_mut(reader)
            .ok_or_else(|| QueueError::UnknownReader(reader.to_string()))?;
        if let Some(pos) = cursor.peek_turn_pos.take() {
            cursor.turn_pos = pos;
        }
        for stream in self.streams.values_mut() {
            stream.cancel(reader);
        }
        Ok(())
    }

    /// Roll back tentative reads of every reader
    pub fn cancel_all(&mut self) {
        for reader in self.readers.clone() {
            // reader is registered, cannot fail
            let _ = self.cancel(&reader);
        }
    }

    /// True iff `n` consecutive peeks by `reader` would succeed
    pub fn tokens_available(&self, n: usize, reader: &str) -> bool {
        if !self.has_reader(reader) {
            return false;
        }
        if n == 0 {
            return true;
        }
        match &self.kind {
            QueueKind::Fanout | QueueKind::CollectUnordered | QueueKind::CollectTagged => {
                self.unread(reader) >= n
            }
            QueueKind::CollectOrdered { order } => self.ordered_available(n, reader, order),
            QueueKind::CollectAllTagged => {
                !self.writers.is_empty()
                    && self
                        .streams
                        .values()
                        .all(|s| s.unread(reader) >= n as u64)
            }
        }
    }

    /// Tokens not yet read (tentatively or otherwise) by `reader`, over all writers
    pub fn unread(&self, reader: &str) -> usize {
        self.streams.values().map(|s| s.unread(reader) as usize).sum()
    }

    /// Does `reader` hold tentative reads that are neither committed nor canceled?
    pub fn has_tentative(&self, reader: &str) -> bool {
        self.streams.values().any(|s| s.has_tentative(reader))
            || self
                .cursors
                .get(reader)
                .map(|c| c.peek_turn_pos.is_some())
                .unwrap_or(false)
    }

    /// True when `reader` holds no tentative state (safe to snapshot)
    pub fn is_idle_for(&self, reader: &str) -> bool {
        !self.has_tentative(reader)
    }

    fn peek_round_robin(&mut self, reader: &str, tagged: bool) -> Option<Token> {
        let n = self.writers.len();
        let start = self.cursors.get(reader)?.turn_pos;
        for i in start..start + n {
            let writer = self.writers[i % n].clone();
            let Some(token) = self.streams.get_mut(&writer).and_then(|s| s.take(reader)) else {
                continue;
            };
            self.advance_cursor(reader, start, (i + 1) % n);
            if tagged {
                let tag = self.tag(&writer).unwrap_or(&writer).to_string();
                return Some(token.with_meta(PORT_TAG, tag));
            }
            return Some(token);
        }
        None
    }

    fn peek_ordered(&mut self, reader: &str, order: &[String]) -> Option<Token> {
        if order.is_empty() {
            return None;
        }
        let start = self.cursors.get(reader)?.turn_pos;
        let writer = self.resolve_writer(&order[start % order.len()])?;
        let token = self.streams.get_mut(&writer)?.take(reader)?;
        self.advance_cursor(reader, start, (start + 1) % order.len());
        Some(token)
    }

    fn peek_all(&mut self, reader: &str) -> Option<Token> {
        if !self.tokens_available(1, reader) {
            return None;
        }
        let mut values = Vec::with_capacity(self.writers.len());
        let mut tags = Vec::with_capacity(self.writers.len());
        for writer in &self.writers {
            let token = self.streams.get_mut(writer)?.take(reader)?;
            values.push(token.value);
            tags.push(Value::String(
                self.tags.get(writer).cloned().unwrap_or_else(|| writer.clone()),
            ));
        }
        let mut metadata = Map::new();
        metadata.insert(PORT_TAG.to_string(), Value::Array(tags));
        Some(Token {
            value: Value::Array(values),
            metadata,
        })
    }

    fn advance_cursor(&mut self, reader: &str, start: usize, next: usize) {
        if let Some(cursor) = self.cursors.get_mut(reader) {
            if cursor.peek_turn_pos.is_none() {
                cursor.peek_turn_pos = Some(start);
            }
            cursor.turn_pos = next;
        }
    }

    /// Map a drain-order entry (writer id or tag) to a writer id
    fn resolve_writer(&self, key: &str) -> Option<String> {
        if self.streams.contains_key(key) {
            return Some(key.to_string());
        }
        self.writers
            .iter()
            .find(|w| self.tags.get(*w).map(String::as_str) == Some(key))
            .cloned()
    }

    fn ordered_available(&self, n: usize, reader: &str, order: &[String]) -> bool {
        if order.is_empty() {
            return false;
        }
        let Some(cursor) = self.cursors.get(reader) else {
            return false;
        };
        let mut remaining: HashMap<String, u64> = HashMap::new();
        let mut pos = cursor.turn_pos;
        for _ in 0..n {
            let Some(writer) = self.resolve_writer(&order[pos % order.len()]) else {
                return false;
            };
            let left = remaining
                .entry(writer.clone())
                .or_insert_with(|| self.streams.get(&writer).map_or(0, |s| s.unread(reader)));
            if *left == 0 {
                return false;
            }
            *left -= 1;
            pos += 1;
        }
        true
    }
}
