//! Scheduler wakeups posted from outside the firing loop

use crate::types::ActorId;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Cloneable handle for posting `scheduler_wakeup(actor_id)`
///
/// Safe to use from any thread or tokio task. Posting to a runtime that
/// has shut down is a no-op.
#[derive(Debug, Clone)]
pub struct WakeupHandle {
    tx: UnboundedSender<ActorId>,
}

impl WakeupHandle {
    /// Create a handle and the receiving end the scheduler drains
    pub fn channel() -> (Self, UnboundedReceiver<ActorId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Ask the scheduler to try `actor` again
    pub fn wake(&self, actor: &ActorId) {
        if self.tx.send(actor.clone()).is_err() {
            tracing::trace!(actor = %actor, "wakeup dropped, scheduler gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wakeups_arrive_in_order() {
        let (handle, mut rx) = WakeupHandle::channel();
        let other = handle.clone();
        handle.wake(&ActorId::new("a"));
        other.wake(&ActorId::new("b"));

        assert_eq!(rx.try_recv().unwrap(), ActorId::new("a"));
        assert_eq!(rx.try_recv().unwrap(), ActorId::new("b"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_wake_after_close_is_silent() {
        let (handle, rx) = WakeupHandle::channel();
        drop(rx);
        handle.wake(&ActorId::new("a"));
    }
}
