//! Property tests for port queues

use calvin_core::queue::{PortQueue, QueueKind};
use calvin_core::Token;
use proptest::prelude::*;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
enum Op {
    Write,
    Peek,
    Commit,
    Cancel,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Write),
        3 => Just(Op::Peek),
        1 => Just(Op::Commit),
        1 => Just(Op::Cancel),
    ]
}

proptest! {
    /// Tokens come out in write order and exactly once once committed,
    /// however peeks, commits and cancels are interleaved.
    #[test]
    fn prop_single_writer_is_fifo(capacity in 1usize..6, ops in prop::collection::vec(op(), 0..80)) {
        let mut q = PortQueue::new(QueueKind::Fanout, capacity);
        q.add_writer("w", None);
        q.add_reader("r");

        let mut next = 0i64;
        let mut committed: Vec<i64> = Vec::new();
        let mut tentative: Vec<i64> = Vec::new();
        for op in ops {
            match op {
                Op::Write => {
                    if q.slots_available(1, "w") {
                        q.write(Token::new(next), "w").unwrap();
                        next += 1;
                    } else {
                        prop_assert!(q.write(Token::new(-1), "w").is_err());
                    }
                }
                Op::Peek => {
                    let available = q.tokens_available(1, "r");
                    match q.peek("r") {
                        Ok(t) => {
                            prop_assert!(available);
                            tentative.push(t.value.as_i64().unwrap());
                        }
                        Err(_) => prop_assert!(!available),
                    }
                }
                Op::Commit => {
                    q.commit("r").unwrap();
                    committed.append(&mut tentative);
                }
                Op::Cancel => {
                    q.cancel("r").unwrap();
                    tentative.clear();
                }
            }
        }
        q.cancel("r").unwrap();
        while let Ok(t) = q.peek("r") {
            committed.push(t.value.as_i64().unwrap());
        }
        let expected: Vec<i64> = (0..next).collect();
        prop_assert_eq!(committed, expected);
    }

    /// Every reader of a fan-out queue sees every token, and the slowest
    /// reader bounds what the writer may add.
    #[test]
    fn prop_fanout_readers_are_independent(capacity in 1usize..5, reads_a in 0usize..8, reads_b in 0usize..8) {
        let mut q = PortQueue::new(QueueKind::Fanout, capacity);
        q.add_writer("w", None);
        q.add_reader("a");
        q.add_reader("b");

        let mut written = 0;
        while q.slots_available(1, "w") {
            q.write(Token::new(written), "w").unwrap();
            written += 1;
        }
        prop_assert_eq!(written, capacity);

        for _ in 0..reads_a.min(capacity) {
            q.peek("a").unwrap();
        }
        q.commit("a").unwrap();
        for _ in 0..reads_b.min(capacity) {
            q.peek("b").unwrap();
        }
        q.commit("b").unwrap();

        let slowest = reads_a.min(reads_b).min(capacity);
        prop_assert_eq!(q.free_slots("w"), slowest);
        prop_assert_eq!(q.unread("a"), capacity - reads_a.min(capacity));
        prop_assert_eq!(q.unread("b"), capacity - reads_b.min(capacity));
    }

    /// Round robin never serves a writer twice while another writer has data
    #[test]
    fn prop_round_robin_is_fair(counts in prop::collection::vec(0usize..4, 1..5)) {
        let mut q = PortQueue::new(QueueKind::CollectUnordered, 4);
        let writers: Vec<String> = (0..counts.len()).map(|i| format!("w{}", i)).collect();
        for w in &writers {
            q.add_writer(w.as_str(), None);
        }
        q.add_reader("r");
        for (w, &n) in writers.iter().zip(&counts) {
            for i in 0..n {
                q.write(Token::new(json!([w, i])), w).unwrap();
            }
        }

        let mut seen: Vec<Value> = Vec::new();
        while let Ok(t) = q.peek("r") {
            seen.push(t.value);
        }
        prop_assert_eq!(seen.len(), counts.iter().sum::<usize>());

        // the k-th token of any writer comes after the (k-1)-th token of every writer that has one
        let rounds: Vec<u64> = seen.iter().map(|v| v[1].as_u64().unwrap()).collect();
        let mut sorted = rounds.clone();
        sorted.sort_unstable();
        prop_assert_eq!(rounds, sorted);
    }

    /// Cancel restores exactly what was available before the peeks, drain cursor included
    #[test]
    fn prop_cancel_restores(kind_idx in 0usize..5, tokens in 1usize..4, peeks in 0usize..6, skew in 0usize..2) {
        let kind = [
            QueueKind::Fanout,
            QueueKind::CollectUnordered,
            QueueKind::CollectTagged,
            QueueKind::CollectOrdered { order: vec!["ta".into(), "tb".into()] },
            QueueKind::CollectAllTagged,
        ][kind_idx].clone();
        let mut q = PortQueue::new(kind, 4);
        q.add_writer("a", Some("ta".into()));
        q.add_writer("b", Some("tb".into()));
        q.add_reader("r");
        for i in 0..tokens {
            q.write(Token::new(i), "a").unwrap();
            q.write(Token::new(i), "b").unwrap();
        }
        // move the drain cursor off its start before the measured peeks
        for _ in 0..skew {
            if q.peek("r").is_ok() {
                q.commit("r").unwrap();
            }
        }
        let available: Vec<bool> = (1..=2 * tokens).map(|n| q.tokens_available(n, "r")).collect();

        let before: Vec<Token> = {
            let mut out = Vec::new();
            while let Ok(t) = q.peek("r") {
                out.push(t);
            }
            q.cancel("r").unwrap();
            out
        };

        for _ in 0..peeks {
            let _ = q.peek("r");
        }
        q.cancel("r").unwrap();
        prop_assert!(!q.has_tentative("r"));
        let restored: Vec<bool> = (1..=2 * tokens).map(|n| q.tokens_available(n, "r")).collect();
        prop_assert_eq!(&available, &restored);

        let mut after = Vec::new();
        while let Ok(t) = q.peek("r") {
            after.push(t);
        }
        prop_assert_eq!(before, after);
    }
}
