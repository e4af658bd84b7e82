use calvin_core::capability::{Capability, CapabilityFactory, OpenContext};
use calvin_core::CapabilityError;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const TIMER_REPEATING: &str = "sys.timer.repeating";

/// Opens repeating timers
///
/// Arguments: `period` in seconds (fractions allowed, at least a
/// nanosecond). Each period adds a pending tick and posts a wakeup for the
/// opening actor; a read consumes one tick. Opening requires a tokio
/// runtime on the calling thread. Restoring a migrated timer keeps its
/// pending ticks and its count of consumed ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimerFactory;

impl TimerFactory {
    fn start(
        &self,
        ctx: OpenContext,
        args: &Map<String, Value>,
        pending: u64,
        fired: u64,
    ) -> Result<RepeatingTimer, CapabilityError> {
        let period = args
            .get("period")
            .and_then(Value::as_f64)
            .filter(|s| *s > 0.0)
            .ok_or_else(|| failed("period must be a positive number of seconds".into()))?;
        let period = Duration::try_from_secs_f64(period)
            .map_err(|e| failed(format!("invalid period {}: {}", period, e)))?;
        if period.is_zero() {
            return Err(failed("period is shorter than a nanosecond".into()));
        }
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| failed(format!("no async runtime: {}", e)))?;

        let pending = Arc::new(AtomicU64::new(pending));
        if pending.load(Ordering::SeqCst) > 0 {
            ctx.wake();
        }
        let task = handle.spawn({
            let pending = pending.clone();
            async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // the first tick completes immediately
                interval.tick().await;
                loop {
                    interval.tick().await;
                    pending.fetch_add(1, Ordering::SeqCst);
                    ctx.wake();
                }
            }
        });
        tracing::debug!(period_ms = period.as_millis() as u64, "timer started");
        Ok(RepeatingTimer {
            period,
            pending,
            fired,
            task,
        })
    }
}

fn failed(reason: String) -> CapabilityError {
    CapabilityError::Failed {
        name: TIMER_REPEATING.to_string(),
        reason,
    }
}

impl CapabilityFactory for TimerFactory {
    fn name(&self) -> &str {
        TIMER_REPEATING
    }

    fn open(
        &self,
        ctx: OpenContext,
        args: &Map<String, Value>,
    ) -> Result<Box<dyn Capability>, CapabilityError> {
        Ok(Box::new(self.start(ctx, args, 0, 0)?))
    }

    fn restore(
        &self,
        ctx: OpenContext,
        state: &Value,
        args: &Map<String, Value>,
    ) -> Result<Box<dyn Capability>, CapabilityError> {
        let count = |key: &str| state.get(key).and_then(Value::as_u64).unwrap_or(0);
        Ok(Box::new(self.start(ctx, args, count("pending"), count("fired"))?))
    }
}

struct RepeatingTimer {
    period: Duration,
    pending: Arc<AtomicU64>,
    fired: u64,
    task: JoinHandle<()>,
}

impl Capability for RepeatingTimer {
    fn can_read(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }

    /// Consume one tick, returning how many ticks were consumed so far
    fn read(&mut self) -> Result<Value, CapabilityError> {
        self.pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map_err(|_| failed("no pending tick".into()))?;
        self.fired += 1;
        Ok(json!(self.fired))
    }

    fn close(&mut self) {
        self.task.abort();
    }

    fn serialize(&self) -> Value {
        json!({
            "period": self.period.as_secs_f64(),
            "pending": self.pending.load(Ordering::SeqCst),
            "fired": self.fired,
        })
    }
}

impl Drop for RepeatingTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calvin_core::{ActorId, WakeupHandle};

    fn period(seconds: f64) -> Map<String, Value> {
        let mut args = Map::new();
        args.insert("period".into(), json!(seconds));
        args
    }

    #[tokio::test]
    async fn test_ticks_post_wakeups() {
        let (wakeup, mut rx) = WakeupHandle::channel();
        let ctx = OpenContext {
            actor: ActorId::new("trigger"),
            wakeup,
        };
        let mut timer = TimerFactory.open(ctx, &period(0.01)).unwrap();
        assert!(!timer.can_read());

        let woken = rx.recv().await.unwrap();
        assert_eq!(woken, ActorId::new("trigger"));
        assert!(timer.can_read());
        assert_eq!(timer.read().unwrap(), json!(1));
        timer.close();
    }

    #[test]
    fn test_needs_async_runtime() {
        let (wakeup, _rx) = WakeupHandle::channel();
        let ctx = OpenContext {
            actor: ActorId::new("trigger"),
            wakeup,
        };
        assert!(matches!(
            TimerFactory.open(ctx, &period(1.0)),
            Err(CapabilityError::Failed { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_bad_period() {
        let (wakeup, _rx) = WakeupHandle::channel();
        let ctx = OpenContext {
            actor: ActorId::new("trigger"),
            wakeup,
        };
        for seconds in [0.0, -1.0, 1e-12, 1e30, f64::INFINITY] {
            assert!(
                matches!(
                    TimerFactory.open(ctx.clone(), &period(seconds)),
                    Err(CapabilityError::Failed { .. })
                ),
                "period {} accepted",
                seconds
            );
        }
    }

    #[tokio::test]
    async fn test_restore_keeps_tick_counts() {
        let (wakeup, mut rx) = WakeupHandle::channel();
        let ctx = OpenContext {
            actor: ActorId::new("trigger"),
            wakeup,
        };
        let state = json!({ "period": 60.0, "pending": 1, "fired": 3 });
        let mut timer = TimerFactory.restore(ctx, &state, &period(60.0)).unwrap();

        assert_eq!(rx.recv().await.unwrap(), ActorId::new("trigger"));
        assert!(timer.can_read());
        assert_eq!(timer.read().unwrap(), json!(4));
        assert!(!timer.can_read());
        assert_eq!(timer.serialize()["fired"], json!(4));
        timer.close();
    }
}
