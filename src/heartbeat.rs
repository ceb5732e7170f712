//! Heartbeat monitor.
//!
//! The port agent sends a `HEARTBEAT` packet every `heartbeat_interval`
//! seconds. The monitor runs one long-lived periodic timer; every tick without
//! an intervening heartbeat costs one from the missed-heartbeat budget, and a
//! heartbeat refills the budget and re-arms the same timer. When the budget
//! reaches zero the connection is escalated as dead.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::PortAgentError;
use crate::event::Escalator;
use crate::listener::ListenerControl;

/// Missed-heartbeat counter with a resettable timer.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    period: Duration,
    max_missed: u32,
    remaining: AtomicU32,
    reset: Notify,
}

impl HeartbeatMonitor {
    pub fn new(period: Duration, max_missed: u32) -> Self {
        Self {
            period,
            max_missed,
            remaining: AtomicU32::new(max_missed),
            reset: Notify::new(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Heartbeats that may still be missed before the connection is failed.
    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::Acquire)
    }

    /// Record a received heartbeat: refill the budget and re-arm the timer.
    pub fn beat(&self) {
        self.remaining.store(self.max_missed, Ordering::Release);
        self.reset.notify_one();
    }

    /// Record a timer expiry, returning the budget left.
    fn miss(&self) -> u32 {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    pub(crate) fn spawn(
        self: Arc<Self>,
        escalator: Arc<Escalator>,
        control: Arc<ListenerControl>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(escalator, control))
    }

    async fn run(self: Arc<Self>, escalator: Arc<Escalator>, control: Arc<ListenerControl>) {
        let mut timer = interval_at(Instant::now() + self.period, self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // A heartbeat that lands with a tick must refill before the tick counts.
                biased;
                _ = self.reset.notified() => {
                    tracing::debug!("Heartbeat timer re-armed");
                    timer.reset();
                }
                _ = timer.tick() => {
                    if !control.is_running() {
                        break;
                    }
                    let left = self.miss();
                    if left == 0 {
                        tracing::error!(
                            "Maximum allowable port agent heartbeats ({}) missed",
                            self.max_missed
                        );
                        escalator.escalate(PortAgentError::HeartbeatTimeout {
                            missed: self.max_missed,
                        });
                        break;
                    }
                    tracing::warn!(remaining = left, "Heartbeat timeout");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ClientEvent, EventSink};
    use crate::listener::ListenerState;

    #[test]
    fn test_beat_resets_budget() {
        let monitor = HeartbeatMonitor::new(Duration::from_secs(11), 5);
        assert_eq!(monitor.miss(), 4);
        assert_eq!(monitor.miss(), 3);

        monitor.beat();
        assert_eq!(monitor.remaining(), 5);
    }

    #[test]
    fn test_miss_saturates_at_zero() {
        let monitor = HeartbeatMonitor::new(Duration::from_secs(1), 1);
        assert_eq!(monitor.miss(), 0);
        assert_eq!(monitor.miss(), 0);
        assert_eq!(monitor.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_escalates_once() {
        let (sink, mut rx) = EventSink::channel();
        let control = Arc::new(ListenerControl::new());
        let escalator = Arc::new(Escalator::new(sink, control.clone()));
        let monitor = Arc::new(HeartbeatMonitor::new(Duration::from_secs(2), 3));

        let started = Instant::now();
        let task = monitor.clone().spawn(escalator, control.clone());
        task.await.unwrap();

        // Three periods of 2s each.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(7));
        assert_eq!(control.state(), ListenerState::Stopping);
        assert!(matches!(
            rx.try_recv().unwrap(),
            ClientEvent::Fatal(PortAgentError::HeartbeatTimeout { missed: 3 })
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_beat_on_tick_boundary_keeps_full_budget() {
        let (sink, _rx) = EventSink::channel();
        let control = Arc::new(ListenerControl::new());
        let escalator = Arc::new(Escalator::new(sink, control.clone()));
        let monitor = Arc::new(HeartbeatMonitor::new(Duration::from_secs(2), 3));
        let task = monitor.clone().spawn(escalator, control.clone());

        // Land the heartbeat on the same instant as the first tick.
        tokio::time::sleep(Duration::from_secs(2)).await;
        monitor.beat();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(monitor.remaining(), 3);
        control.request_stop();
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_beats_keep_connection_alive() {
        let (sink, mut rx) = EventSink::channel();
        let control = Arc::new(ListenerControl::new());
        let escalator = Arc::new(Escalator::new(sink, control.clone()));
        let monitor = Arc::new(HeartbeatMonitor::new(Duration::from_secs(2), 2));
        let task = monitor.clone().spawn(escalator, control.clone());

        // Beat every 1.5s for well past the 4s budget.
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            monitor.beat();
        }

        assert!(control.is_running());
        assert!(rx.try_recv().is_err());

        control.request_stop();
        task.abort();
    }
}
