//! Per-writer token stream with per-reader read positions

use crate::token::Token;
use std::collections::{HashMap, VecDeque};

/// Tokens written by one writer, plus the read positions of every reader
///
/// Positions are absolute sequence numbers. `fifo[0]` holds the token at
/// `base_pos`; tokens below the slowest committed reader are dropped.
#[derive(Debug, Clone, Default)]
pub(crate) struct WriterStream {
    pub(crate) fifo: VecDeque<Token>,
    pub(crate) base_pos: u64,
    pub(crate) write_pos: u64,
    pub(crate) tentative: HashMap<String, u64>,
    pub(crate) committed: HashMap<String, u64>,
}

impl WriterStream {
    pub(crate) fn new<'a>(readers: impl Iterator<Item = &'a String>) -> Self {
        let mut stream = Self::default();
        for reader in readers {
            stream.add_reader(reader);
        }
        stream
    }

    /// Start a reader at the oldest retained token
    pub(crate) fn add_reader(&mut self, reader: &str) {
        self.tentative.insert(reader.to_string(), self.base_pos);
        self.committed.insert(reader.to_string(), self.base_pos);
    }

    pub(crate) fn remove_reader(&mut self, reader: &str) {
        self.tentative.remove(reader);
        self.committed.remove(reader);
        self.trim();
    }

    /// Tokens not yet tentatively read by `reader`
    pub(crate) fn unread(&self, reader: &str) -> u64 {
        self.tentative
            .get(reader)
            .map(|pos| self.write_pos - pos)
            .unwrap_or(0)
    }

    /// Slots held by the slowest reader (or by retained tokens when there are no readers)
    pub(crate) fn used(&self) -> u64 {
        self.write_pos - self.low_water()
    }

    pub(crate) fn push(&mut self, token: Token) {
        self.fifo.push_back(token);
        self.write_pos += 1;
    }

    /// Take the next token for `reader` tentatively
    pub(crate) fn take(&mut self, reader: &str) -> Option<Token> {
        let pos = *self.tentative.get(reader)?;
        if pos >= self.write_pos {
            return None;
        }
        let token = self.fifo.get((pos - self.base_pos) as usize)?.clone();
        self.tentative.insert(reader.to_string(), pos + 1);
        Some(token)
    }

    pub(crate) fn commit(&mut self, reader: &str) {
        if let Some(pos) = self.tentative.get(reader).copied() {
            self.committed.insert(reader.to_string(), pos);
            self.trim();
        }
    }

    pub(crate) fn cancel(&mut self, reader: &str) {
        if let Some(pos) = self.committed.get(reader).copied() {
            self.tentative.insert(reader.to_string(), pos);
        }
    }

    /// True if `reader` holds tentative reads on this stream
    pub(crate) fn has_tentative(&self, reader: &str) -> bool {
        self.tentative.get(reader) != self.committed.get(reader)
    }

    fn low_water(&self) -> u64 {
        self.committed
            .values()
            .copied()
            .min()
            .unwrap_or(self.base_pos)
    }

    /// Drop tokens every reader has committed past
    fn trim(&mut self) {
        let low = self.low_water();
        while self.base_pos < low {
            self.fifo.pop_front();
            self.base_pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trim_follows_slowest_reader() {
        let readers = vec!["r1".to_string(), "r2".to_string()];
        let mut stream = WriterStream::new(readers.iter());
        stream.push(Token::new(json!(1)));
        stream.push(Token::new(json!(2)));

        stream.take("r1");
        stream.take("r1");
        stream.commit("r1");
        assert_eq!(stream.used(), 2);

        stream.take("r2");
        stream.commit("r2");
        assert_eq!(stream.used(), 1);
        assert_eq!(stream.fifo.len(), 1);
        assert_eq!(stream.base_pos, 1);
    }

    #[test]
    fn test_remove_reader_releases_slots() {
        let readers = vec!["r1".to_string(), "r2".to_string()];
        let mut stream = WriterStream::new(readers.iter());
        stream.push(Token::new(json!(1)));
        stream.take("r1");
        stream.commit("r1");
        assert_eq!(stream.used(), 1);

        stream.remove_reader("r2");
        assert_eq!(stream.used(), 0);
    }
}
