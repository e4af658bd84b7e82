//! Work set of possibly fireable actors
//!
//! The scheduler itself never fires anything; the runtime pops ids from
//! it and runs one pass per id. Ids enter the work set when an actor is
//! created or restored, when tokens arrive or slots free up, and when a
//! capability posts a wakeup through a [`WakeupHandle`].

use crate::capability::WakeupHandle;
use crate::types::ActorId;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use tokio::sync::mpsc::UnboundedReceiver;

/// Counters for one or more scheduler passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Fire calls that fired an action
    pub fires: usize,
    /// Fire calls that found nothing to do
    pub idle_checks: usize,
    /// Fire calls that ended in a fault or contract violation
    pub faults: usize,
}

impl RunStats {
    /// Total fire attempts
    pub fn attempts(&self) -> usize {
        self.fires + self.idle_checks + self.faults
    }

    pub fn absorb(&mut self, other: RunStats) {
        self.fires += other.fires;
        self.idle_checks += other.idle_checks;
        self.faults += other.faults;
    }
}

/// FIFO of actor ids without duplicates, fed by direct wakes and a wakeup channel
#[derive(Debug)]
pub struct Scheduler {
    queue: VecDeque<ActorId>,
    members: HashSet<ActorId>,
    handle: WakeupHandle,
    wakeups: UnboundedReceiver<ActorId>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (handle, wakeups) = WakeupHandle::channel();
        Self {
            queue: VecDeque::new(),
            members: HashSet::new(),
            handle,
            wakeups,
        }
    }

    /// Handle for posting wakeups from capabilities and other threads
    pub fn handle(&self) -> WakeupHandle {
        self.handle.clone()
    }

    /// Add an actor to the work set; no-op if it is already queued
    pub fn wake(&mut self, actor: &ActorId) {
        if self.members.insert(actor.clone()) {
            self.queue.push_back(actor.clone());
        }
    }

    /// Move posted wakeups into the work set, returning how many arrived
    pub fn drain_wakeups(&mut self) -> usize {
        let mut count = 0;
        while let Ok(actor) = self.wakeups.try_recv() {
            self.wake(&actor);
            count += 1;
        }
        count
    }

    /// Pop the next actor to try
    pub fn pop(&mut self) -> Option<ActorId> {
        let actor = self.queue.pop_front()?;
        self.members.remove(&actor);
        Some(actor)
    }

    /// Drop an actor from the work set (destroyed or migrated away)
    pub fn forget(&mut self, actor: &ActorId) {
        if self.members.remove(actor) {
            self.queue.retain(|a| a != actor);
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn contains(&self, actor: &ActorId) -> bool {
        self.members.contains(actor)
    }

    /// Wait for the next posted wakeup and add it to the work set
    pub async fn wait_for_wakeup(&mut self) {
        // the scheduler holds a sender itself, so the channel never closes
        if let Some(actor) = self.wakeups.recv().await {
            self.wake(&actor);
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_duplicates_in_work_set() {
        let mut s = Scheduler::new();
        let a = ActorId::new("a");
        let b = ActorId::new("b");
        s.wake(&a);
        s.wake(&b);
        s.wake(&a);
        assert_eq!(s.len(), 2);

        assert_eq!(s.pop(), Some(a.clone()));
        s.wake(&a);
        assert_eq!(s.pop(), Some(b));
        assert_eq!(s.pop(), Some(a));
        assert_eq!(s.pop(), None);
    }

    #[test]
    fn test_channel_wakeups() {
        let mut s = Scheduler::new();
        let handle = s.handle();
        let a = ActorId::new("a");
        handle.wake(&a);
        handle.wake(&a);
        assert!(s.is_empty());

        assert_eq!(s.drain_wakeups(), 2);
        assert_eq!(s.len(), 1);
        assert!(s.contains(&a));
    }

    #[test]
    fn test_forget() {
        let mut s = Scheduler::new();
        let a = ActorId::new("a");
        s.wake(&a);
        s.forget(&a);
        assert!(s.is_empty());
        assert!(!s.contains(&a));
    }

    #[tokio::test]
    async fn test_wait_for_wakeup_from_task() {
        let mut s = Scheduler::new();
        let handle = s.handle();
        tokio::spawn(async move {
            handle.wake(&ActorId::new("late"));
        });
        s.wait_for_wakeup().await;
        assert_eq!(s.pop(), Some(ActorId::new("late")));
    }

    #[test]
    fn test_stats_absorb() {
        let mut total = RunStats::default();
        total.absorb(RunStats {
            fires: 2,
            idle_checks: 1,
            faults: 0,
        });
        total.absorb(RunStats {
            fires: 1,
            idle_checks: 0,
            faults: 1,
        });
        assert_eq!(total.attempts(), 5);
    }
}
